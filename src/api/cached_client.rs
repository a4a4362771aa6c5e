//! Gateway client with transparent caching, optimistic moderation and
//! session handling.

use color_eyre::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::{CacheResult, CacheSource, Cacheable, ReadMode, RetryPolicy};
use crate::config::Config;
use crate::services::{
  google, properties, AuthService, GoogleReviewsService, PropertiesService, RegisterData,
  ReviewsService,
};
use crate::session::SessionStore;
use crate::storage::{
  LocalStatus, LocalStore, MemoryStore, ModerationLog, ReviewArchive, SqliteStore,
};

use super::cache::{apply_moderation, keys, ApiCache, ApiKey, CachedValue, AUTH, REVIEWS};
use super::client::{ApiClient, Transport};
use super::envelope::Acknowledgement;
use super::error::{log_error, ApiError};
use super::http::HttpTransport;
use super::types::{
  BulkUpdateResult, DashboardStats, GooglePlace, GooglePlaceSearchParams, Manager, Paginated,
  Property, PropertyQueryParams, PropertyStats, Review, ReviewApproval, ReviewQueryParams,
  ReviewStatus,
};

/// Ids with a moderation call outstanding.
type PendingIds = Arc<Mutex<HashSet<u64>>>;

/// Releases claimed review ids when the mutation finishes.
struct PendingGuard {
  ids: Vec<u64>,
  pending: PendingIds,
}

impl Drop for PendingGuard {
  fn drop(&mut self) {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    for id in &self.ids {
      pending.remove(id);
    }
  }
}

/// Review gateway client with transparent caching support.
///
/// This wraps the domain services and provides the same operations, but
/// reads go through the shared query cache and moderation is applied to the
/// cache before the server confirms it.
#[derive(Clone)]
pub struct CachedApiClient {
  reviews: ReviewsService,
  properties: PropertiesService,
  auth: AuthService,
  google: GoogleReviewsService,
  cache: ApiCache,
  session: SessionStore,
  moderation: ModerationLog,
  archive: ReviewArchive,
  mode: ReadMode,
  mutation_retry: RetryPolicy,
  pending: PendingIds,
}

impl CachedApiClient {
  /// Create a client for the configured gateway, with persisted state in
  /// SQLite unless the configuration asks for an ephemeral store.
  pub fn new(config: &Config) -> Result<Self> {
    let transport = HttpTransport::with_timeout(&config.api.url, config.api.timeout())?;
    let store: Arc<dyn LocalStore> = if config.storage.ephemeral {
      Arc::new(MemoryStore::new())
    } else {
      match &config.storage.path {
        Some(path) => Arc::new(SqliteStore::open_at(path)?),
        None => Arc::new(SqliteStore::open()?),
      }
    };

    tracing::info!(url = %transport.base_url(), ephemeral = config.storage.ephemeral, "client ready");
    let client = ApiClient::new(Arc::new(transport), store.clone()).with_timeout(config.api.timeout());
    Ok(Self::from_client(client, store))
  }

  /// Assemble a client over any transport and store.
  pub fn with_parts(transport: Arc<dyn Transport>, store: Arc<dyn LocalStore>) -> Self {
    Self::from_client(ApiClient::new(transport, store.clone()), store)
  }

  fn from_client(client: ApiClient, store: Arc<dyn LocalStore>) -> Self {
    Self {
      reviews: ReviewsService::new(client.clone()),
      properties: PropertiesService::new(client.clone()),
      auth: AuthService::new(client.clone()),
      google: GoogleReviewsService::new(client),
      cache: ApiCache::new(),
      session: SessionStore::hydrated(store.clone()),
      moderation: ModerationLog::new(store.clone()),
      archive: ReviewArchive::new(store),
      mode: ReadMode::default(),
      mutation_retry: RetryPolicy::mutations(),
      pending: Arc::new(Mutex::new(HashSet::new())),
    }
  }

  /// A handle sharing this client's cache whose reads never serve values
  /// past their freshness window.
  pub fn strict(&self) -> Self {
    Self {
      mode: ReadMode::Strict,
      ..self.clone()
    }
  }

  pub fn cache(&self) -> &ApiCache {
    &self.cache
  }

  pub fn session(&self) -> &SessionStore {
    &self.session
  }

  pub fn moderation(&self) -> &ModerationLog {
    &self.moderation
  }

  /// The last review list fetched from the gateway, readable offline.
  pub fn archive(&self) -> &ReviewArchive {
    &self.archive
  }

  /// Every read reports where its data came from; a value served because
  /// the gateway was unreachable comes back as [`CacheSource::Offline`].
  ///
  /// [`CacheSource::Offline`]: crate::cache::CacheSource::Offline
  async fn read<T, F, Fut>(&self, key: ApiKey, fetcher: F) -> Result<CacheResult<T>, ApiError>
  where
    T: Cacheable<CachedValue>,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    self.cache.fetch(key, self.mode, fetcher).await
  }

  // ==========================================================================
  // Reviews
  // ==========================================================================

  /// Get reviews with optional filtering, with caching. Every list that
  /// comes from the network replaces the review archive.
  pub async fn reviews(
    &self,
    params: &ReviewQueryParams,
  ) -> Result<CacheResult<Vec<Review>>, ApiError> {
    let service = self.reviews.clone();
    let params = params.clone();
    let result = self
      .read(keys::reviews(&params), move || {
        let service = service.clone();
        let params = params.clone();
        async move { service.list(&params).await?.into_data() }
      })
      .await?;

    if result.source == CacheSource::Network {
      if let Err(e) = self.archive.save(&result.data) {
        tracing::warn!(error = %e, "could not update review archive");
      }
    }
    Ok(result)
  }

  pub async fn reviews_page(
    &self,
    params: &ReviewQueryParams,
  ) -> Result<CacheResult<Paginated<Review>>, ApiError> {
    let service = self.reviews.clone();
    let params = params.clone();
    self
      .read(keys::review_page(&params), move || {
        let service = service.clone();
        let params = params.clone();
        async move { service.list_paginated(&params).await?.into_data() }
      })
      .await
  }

  pub async fn approved_reviews(
    &self,
    property_id: Option<&str>,
  ) -> Result<CacheResult<Vec<Review>>, ApiError> {
    let service = self.reviews.clone();
    let property_id = property_id.map(String::from);
    self
      .read(keys::approved(property_id.as_deref()), move || {
        let service = service.clone();
        let property_id = property_id.clone();
        async move {
          service
            .list_approved(property_id.as_deref())
            .await?
            .into_data()
        }
      })
      .await
  }

  pub async fn pending_reviews(&self) -> Result<CacheResult<Vec<Review>>, ApiError> {
    let service = self.reviews.clone();
    self
      .read(keys::pending(), move || {
        let service = service.clone();
        async move { service.list_pending().await?.into_data() }
      })
      .await
  }

  pub async fn review(&self, review_id: u64) -> Result<CacheResult<Review>, ApiError> {
    let service = self.reviews.clone();
    self
      .read(keys::review(review_id), move || {
        let service = service.clone();
        async move { service.get(review_id).await?.into_data() }
      })
      .await
  }

  pub async fn property_reviews(
    &self,
    property_id: &str,
    params: &ReviewQueryParams,
  ) -> Result<CacheResult<Vec<Review>>, ApiError> {
    let service = self.reviews.clone();
    let property_id = property_id.to_string();
    let params = params.clone();
    self
      .read(keys::property_reviews(&property_id, &params), move || {
        let service = service.clone();
        let property_id = property_id.clone();
        let params = params.clone();
        async move {
          service
            .list_for_property(&property_id, &params)
            .await?
            .into_data()
        }
      })
      .await
  }

  pub async fn dashboard_stats(&self) -> Result<CacheResult<DashboardStats>, ApiError> {
    let service = self.reviews.clone();
    self
      .read(keys::dashboard_stats(), move || {
        let service = service.clone();
        async move { service.dashboard_stats().await?.into_data() }
      })
      .await
  }

  // ==========================================================================
  // Moderation
  // ==========================================================================

  /// Approve a review. Every cached copy shows it approved before the server
  /// answers; a failure puts the cache back and is returned.
  pub async fn approve(
    &self,
    review_id: u64,
    reason: Option<&str>,
  ) -> Result<Acknowledgement, ApiError> {
    self
      .moderate(review_id, ReviewStatus::Published, reason)
      .await
  }

  /// Reject a review, with the same optimistic handling as [`Self::approve`].
  pub async fn reject(
    &self,
    review_id: u64,
    reason: Option<&str>,
  ) -> Result<Acknowledgement, ApiError> {
    self.moderate(review_id, ReviewStatus::Rejected, reason).await
  }

  async fn moderate(
    &self,
    review_id: u64,
    status: ReviewStatus,
    reason: Option<&str>,
  ) -> Result<Acknowledgement, ApiError> {
    let _guard = self.claim(&[review_id])?;

    let update = apply_moderation(&self.cache, review_id, status);
    self.record(review_id, local_status(status));

    let service = self.reviews.clone();
    let reason = reason.map(String::from);
    let context = format!("{} review {}", status.as_str(), review_id);
    let result = self
      .mutation_retry
      .run(&context, || {
        let service = service.clone();
        let reason = reason.clone();
        async move {
          let response = match status {
            ReviewStatus::Published => service.approve(review_id, reason.as_deref()).await?,
            _ => service.reject(review_id, reason.as_deref()).await?,
          };
          response.into_ack()
        }
      })
      .await;

    match result {
      Ok(ack) => {
        self.cache.invalidate_resource(REVIEWS);
        Ok(ack)
      }
      Err(err) => {
        let restored = update.rollback(&self.cache);
        tracing::warn!(review_id, restored, "moderation failed, cache rolled back");
        if let Err(e) = self.moderation.forget(review_id) {
          tracing::warn!(review_id, error = %e, "could not update moderation record");
        }
        Err(err)
      }
    }
  }

  /// Approve or reject several reviews in one call. The cache is not
  /// rewritten ahead of the response; on success every review entry is
  /// invalidated.
  pub async fn bulk_update(
    &self,
    updates: &[ReviewApproval],
  ) -> Result<BulkUpdateResult, ApiError> {
    if updates.is_empty() {
      return Err(ApiError::validation("EMPTY_BULK_UPDATE", "No reviews selected"));
    }
    let ids: Vec<u64> = updates.iter().map(|u| u.review_id).collect();
    let _guard = self.claim(&ids)?;

    let service = self.reviews.clone();
    let body = updates.to_vec();
    let result = self
      .mutation_retry
      .run("bulk update reviews", || {
        let service = service.clone();
        let body = body.clone();
        async move { service.bulk_update(&body).await?.into_ack() }
      })
      .await?;

    self.cache.invalidate_resource(REVIEWS);
    for update in updates {
      let status = if update.approved {
        LocalStatus::Approved
      } else {
        LocalStatus::Rejected
      };
      self.record(update.review_id, status);
    }
    Ok(result)
  }

  /// Claim `ids` for a mutation, refusing if any is already claimed.
  fn claim(&self, ids: &[u64]) -> Result<PendingGuard, ApiError> {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(busy) = ids.iter().find(|id| pending.contains(id)) {
      return Err(ApiError::validation(
        "MODERATION_IN_PROGRESS",
        format!("Review {} already has a moderation in progress", busy),
      ));
    }
    pending.extend(ids.iter().copied());
    Ok(PendingGuard {
      ids: ids.to_vec(),
      pending: self.pending.clone(),
    })
  }

  fn record(&self, review_id: u64, status: LocalStatus) {
    if let Err(e) = self.moderation.record(review_id, status) {
      tracing::warn!(review_id, error = %e, "could not update moderation record");
    }
  }

  // ==========================================================================
  // Properties
  // ==========================================================================

  pub async fn properties(
    &self,
    params: &PropertyQueryParams,
  ) -> Result<CacheResult<Vec<Property>>, ApiError> {
    let service = self.properties.clone();
    let params = params.clone();
    self
      .read(keys::properties(&params), move || {
        let service = service.clone();
        let params = params.clone();
        async move { service.list(&params).await?.into_data() }
      })
      .await
  }

  /// One property, looked up in the unfiltered property list.
  pub async fn property(&self, property_id: &str) -> Result<CacheResult<Property>, ApiError> {
    let service = self.properties.clone();
    let property_id = property_id.to_string();
    self
      .read(keys::property(&property_id), move || {
        let service = service.clone();
        let property_id = property_id.clone();
        async move {
          let all = service
            .list(&PropertyQueryParams::default())
            .await?
            .into_data()?;
          properties::find(&all, &property_id)
        }
      })
      .await
  }

  pub async fn property_stats(
    &self,
    property_id: &str,
  ) -> Result<CacheResult<PropertyStats>, ApiError> {
    let service = self.properties.clone();
    let property_id = property_id.to_string();
    self
      .read(keys::property_stats(&property_id), move || {
        let service = service.clone();
        let property_id = property_id.clone();
        async move {
          let all = service
            .list(&PropertyQueryParams::default())
            .await?
            .into_data()?;
          properties::stats_for(&all, &property_id)
        }
      })
      .await
  }

  // ==========================================================================
  // Google reviews
  // ==========================================================================

  /// Search Google Places. A blank query is refused without a call.
  pub async fn google_places(
    &self,
    params: &GooglePlaceSearchParams,
  ) -> Result<CacheResult<Vec<GooglePlace>>, ApiError> {
    google::require("query", &params.query)?;
    let service = self.google.clone();
    let params = params.clone();
    self
      .read(keys::google_place_search(&params), move || {
        let service = service.clone();
        let params = params.clone();
        async move { service.search_places(&params).await?.into_data_or_default() }
      })
      .await
  }

  pub async fn google_place(&self, place_id: &str) -> Result<CacheResult<GooglePlace>, ApiError> {
    google::require("placeId", place_id)?;
    let service = self.google.clone();
    let place_id = place_id.to_string();
    self
      .read(keys::google_place(&place_id), move || {
        let service = service.clone();
        let place_id = place_id.clone();
        async move { service.place_details(&place_id).await?.into_data() }
      })
      .await
  }

  pub async fn google_place_reviews(
    &self,
    place_id: &str,
  ) -> Result<CacheResult<Vec<Review>>, ApiError> {
    google::require("placeId", place_id)?;
    let service = self.google.clone();
    let place_id = place_id.to_string();
    self
      .read(keys::google_place_reviews(&place_id), move || {
        let service = service.clone();
        let place_id = place_id.clone();
        async move { service.place_reviews(&place_id).await?.into_data_or_default() }
      })
      .await
  }

  /// Google reviews of a property, looked up by name.
  pub async fn google_property_reviews(
    &self,
    property_name: &str,
    location: Option<&str>,
  ) -> Result<CacheResult<Vec<Review>>, ApiError> {
    google::require("propertyName", property_name)?;
    let service = self.google.clone();
    let property_name = property_name.to_string();
    let location = location.map(String::from);
    self
      .read(
        keys::google_property_search(&property_name, location.as_deref()),
        move || {
          let service = service.clone();
          let property_name = property_name.clone();
          let location = location.clone();
          async move {
            service
              .search_by_property(&property_name, location.as_deref())
              .await?
              .into_data_or_default()
          }
        },
      )
      .await
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  pub fn is_authenticated(&self) -> bool {
    self.session.is_authenticated()
  }

  pub fn current_user(&self) -> Option<Manager> {
    self.session.user()
  }

  /// Exchange credentials for a session and make it current.
  pub async fn login(&self, email: &str, password: &str) -> Result<Manager, ApiError> {
    let service = self.auth.clone();
    let email = email.to_string();
    let password = password.to_string();
    let auth = self
      .mutation_retry
      .run("login", || {
        let service = service.clone();
        let email = email.clone();
        let password = password.clone();
        async move { service.login(&email, &password).await?.into_data() }
      })
      .await?;

    self.start_session(auth.user, auth.token)
  }

  pub async fn register(&self, data: &RegisterData) -> Result<Manager, ApiError> {
    let service = self.auth.clone();
    let data = data.clone();
    let auth = self
      .mutation_retry
      .run("register", || {
        let service = service.clone();
        let data = data.clone();
        async move { service.register(&data).await?.into_data() }
      })
      .await?;

    self.start_session(auth.user, auth.token)
  }

  fn start_session(&self, user: Manager, token: String) -> Result<Manager, ApiError> {
    self
      .session
      .login(user.clone(), token)
      .map_err(|e| ApiError::unknown(format!("Failed to store session: {}", e)))?;
    self.cache.invalidate_resource(AUTH);
    Ok(user)
  }

  /// Current principal from the gateway, with caching.
  pub async fn profile(&self) -> Result<CacheResult<Manager>, ApiError> {
    let service = self.auth.clone();
    self
      .read(keys::profile(), move || {
        let service = service.clone();
        async move { service.profile().await?.into_data() }
      })
      .await
  }

  /// Rotate the session token. A failed refresh ends the local session.
  pub async fn refresh(&self) -> Result<(), ApiError> {
    let result = self
      .auth
      .refresh_token()
      .await
      .and_then(|response| response.into_data());

    match result {
      Ok(rotated) => self
        .session
        .set_token(rotated.token)
        .map_err(|e| ApiError::unknown(format!("Failed to store session: {}", e))),
      Err(err) => {
        log_error("refresh token", &err);
        self.end_session();
        Err(err)
      }
    }
  }

  /// End the session. The server is told best-effort; local session state
  /// and every cache entry are cleared regardless.
  pub async fn logout(&self) {
    if self.session.is_authenticated() {
      if let Err(err) = self
        .auth
        .logout()
        .await
        .and_then(|response| response.into_ack())
      {
        log_error("logout", &err);
      }
    }
    self.end_session();
  }

  fn end_session(&self) {
    if let Err(e) = self.session.logout() {
      tracing::warn!(error = %e, "could not clear persisted session");
    }
    self.cache.clear();
  }
}

fn local_status(status: ReviewStatus) -> LocalStatus {
  match status {
    ReviewStatus::Published => LocalStatus::Approved,
    ReviewStatus::Rejected => LocalStatus::Rejected,
    ReviewStatus::Pending => LocalStatus::Pending,
  }
}
