//! Caching bindings for gateway types.

use std::time::Duration;

use crate::cache::{Cacheable, Params, QueryCache, QueryKey, QueryKind, Rewrite};

use super::types::{
  DashboardStats, GooglePlace, GooglePlaceSearchParams, Manager, Paginated, Property,
  PropertyQueryParams, PropertyStats, Review, ReviewQueryParams, ReviewStatus,
};

pub const REVIEWS: &str = "reviews";
pub const PROPERTIES: &str = "properties";
pub const AUTH: &str = "auth";
pub const GOOGLE_REVIEWS: &str = "google-reviews";

// ============================================================================
// Query kinds
// ============================================================================

/// Query kinds for gateway reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiQuery {
  /// Filtered review list
  ReviewList,
  /// One page of reviews
  ReviewPage,
  /// Approved reviews, optionally scoped to a property
  ApprovedReviews,
  PendingReviews,
  ReviewDetail,
  /// Reviews of one property
  PropertyReviews,
  DashboardStats,
  PropertyList,
  PropertyDetail,
  PropertyStats,
  Profile,
  GooglePlaceSearch,
  GooglePlaceDetails,
  GooglePlaceReviews,
  /// Google reviews found by property name
  GooglePropertySearch,
}

impl QueryKind for ApiQuery {
  fn resource(&self) -> &'static str {
    match self {
      Self::ReviewList
      | Self::ReviewPage
      | Self::ApprovedReviews
      | Self::PendingReviews
      | Self::ReviewDetail
      | Self::PropertyReviews
      | Self::DashboardStats => REVIEWS,
      Self::PropertyList | Self::PropertyDetail | Self::PropertyStats => PROPERTIES,
      Self::Profile => AUTH,
      Self::GooglePlaceSearch
      | Self::GooglePlaceDetails
      | Self::GooglePlaceReviews
      | Self::GooglePropertySearch => GOOGLE_REVIEWS,
    }
  }

  fn stale_time(&self) -> Duration {
    let minutes = match self {
      Self::PendingReviews => 1,
      Self::ReviewList | Self::ReviewPage | Self::PropertyReviews => 2,
      Self::ApprovedReviews
      | Self::ReviewDetail
      | Self::DashboardStats
      | Self::PropertyStats
      | Self::Profile
      | Self::GooglePlaceSearch
      | Self::GooglePlaceDetails
      | Self::GooglePlaceReviews
      | Self::GooglePropertySearch => 5,
      Self::PropertyList | Self::PropertyDetail => 10,
    };
    Duration::from_secs(minutes * 60)
  }
}

pub type ApiKey = QueryKey<ApiQuery>;
pub type ApiCache = QueryCache<ApiQuery, CachedValue>;

/// Key constructors, one per read.
pub mod keys {
  use super::*;

  pub fn reviews(params: &ReviewQueryParams) -> ApiKey {
    QueryKey::new(ApiQuery::ReviewList, Params::from_serialize(params))
  }

  pub fn review_page(params: &ReviewQueryParams) -> ApiKey {
    QueryKey::new(ApiQuery::ReviewPage, Params::from_serialize(params))
  }

  pub fn approved(property_id: Option<&str>) -> ApiKey {
    let params = match property_id {
      Some(id) => Params::new().with("propertyId", id),
      None => Params::new(),
    };
    QueryKey::new(ApiQuery::ApprovedReviews, params)
  }

  pub fn pending() -> ApiKey {
    QueryKey::new(ApiQuery::PendingReviews, Params::new())
  }

  pub fn review(review_id: u64) -> ApiKey {
    QueryKey::new(
      ApiQuery::ReviewDetail,
      Params::new().with("id", review_id.to_string()),
    )
  }

  pub fn property_reviews(property_id: &str, params: &ReviewQueryParams) -> ApiKey {
    let params = Params::from_serialize(params).with("propertyId", property_id);
    QueryKey::new(ApiQuery::PropertyReviews, params)
  }

  pub fn dashboard_stats() -> ApiKey {
    QueryKey::new(ApiQuery::DashboardStats, Params::new())
  }

  pub fn properties(params: &PropertyQueryParams) -> ApiKey {
    QueryKey::new(ApiQuery::PropertyList, Params::from_serialize(params))
  }

  pub fn property(property_id: &str) -> ApiKey {
    QueryKey::new(ApiQuery::PropertyDetail, Params::new().with("id", property_id))
  }

  pub fn property_stats(property_id: &str) -> ApiKey {
    QueryKey::new(ApiQuery::PropertyStats, Params::new().with("id", property_id))
  }

  pub fn profile() -> ApiKey {
    QueryKey::new(ApiQuery::Profile, Params::new())
  }

  pub fn google_place_search(params: &GooglePlaceSearchParams) -> ApiKey {
    QueryKey::new(ApiQuery::GooglePlaceSearch, Params::from_serialize(params))
  }

  pub fn google_place(place_id: &str) -> ApiKey {
    QueryKey::new(ApiQuery::GooglePlaceDetails, Params::new().with("id", place_id))
  }

  pub fn google_place_reviews(place_id: &str) -> ApiKey {
    QueryKey::new(ApiQuery::GooglePlaceReviews, Params::new().with("id", place_id))
  }

  /// Keyed by the location as given, so an omitted location and an explicit
  /// default are separate entries.
  pub fn google_property_search(property_name: &str, location: Option<&str>) -> ApiKey {
    let params = Params::new().with("propertyName", property_name);
    let params = match location {
      Some(location) => params.with("location", location),
      None => params,
    };
    QueryKey::new(ApiQuery::GooglePropertySearch, params)
  }
}

// ============================================================================
// Cached values
// ============================================================================

/// Every value the gateway cache holds.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
  Reviews(Vec<Review>),
  ReviewPage(Paginated<Review>),
  Review(Review),
  Stats(DashboardStats),
  Properties(Vec<Property>),
  Property(Property),
  PropertyStats(PropertyStats),
  Manager(Manager),
  Places(Vec<GooglePlace>),
  Place(GooglePlace),
}

impl CachedValue {
  /// Reviews held by this value, wherever they sit in it.
  pub fn reviews(&self) -> &[Review] {
    match self {
      Self::Reviews(reviews) => reviews,
      Self::ReviewPage(page) => &page.data,
      Self::Review(review) => std::slice::from_ref(review),
      Self::Stats(stats) => &stats.recent_reviews,
      _ => &[],
    }
  }

  pub fn reviews_mut(&mut self) -> &mut [Review] {
    match self {
      Self::Reviews(reviews) => reviews,
      Self::ReviewPage(page) => &mut page.data,
      Self::Review(review) => std::slice::from_mut(review),
      Self::Stats(stats) => &mut stats.recent_reviews,
      _ => &mut [],
    }
  }

  pub fn contains_review(&self, review_id: u64) -> bool {
    self.reviews().iter().any(|r| r.id == review_id)
  }
}

macro_rules! cacheable {
  ($ty:ty, $variant:ident) => {
    impl Cacheable<CachedValue> for $ty {
      fn into_cached(self) -> CachedValue {
        CachedValue::$variant(self)
      }

      fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
          CachedValue::$variant(inner) => Some(inner.clone()),
          _ => None,
        }
      }
    }
  };
}

cacheable!(Vec<Review>, Reviews);
cacheable!(Paginated<Review>, ReviewPage);
cacheable!(Review, Review);
cacheable!(DashboardStats, Stats);
cacheable!(Vec<Property>, Properties);
cacheable!(Property, Property);
cacheable!(PropertyStats, PropertyStats);
cacheable!(Manager, Manager);
cacheable!(Vec<GooglePlace>, Places);
cacheable!(GooglePlace, Place);

// ============================================================================
// Optimistic moderation
// ============================================================================

/// What an optimistic moderation did to one cache entry.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ModerationChange {
  /// The review's status was rewritten from this
  Status {
    status: ReviewStatus,
    is_approved: bool,
  },
  /// A copy of the review was appended to an approved list
  Appended,
}

/// Everything an optimistic moderation touched, for rolling it back.
#[derive(Debug, Clone)]
pub struct OptimisticUpdate {
  review_id: u64,
  epoch: u64,
  rewrites: Vec<Rewrite<ApiQuery, ModerationChange>>,
}

impl OptimisticUpdate {
  /// Number of cache entries rewritten.
  pub fn touched(&self) -> usize {
    self.rewrites.len()
  }

  /// Undo this moderation's own rewrites: the review gets its previous
  /// status back and any copy appended to an approved list is removed.
  /// Entries that have received server data since are skipped, and other
  /// moderations applied to the same entries stay in place. Returns how many
  /// entries were reverted.
  pub fn rollback(self, cache: &ApiCache) -> usize {
    let review_id = self.review_id;
    cache.undo(self.epoch, self.rewrites, |value, change| match change {
      ModerationChange::Status {
        status,
        is_approved,
      } => {
        for review in value.reviews_mut() {
          if review.id == review_id {
            review.status = status;
            review.is_approved = is_approved;
          }
        }
      }
      ModerationChange::Appended => {
        if let CachedValue::Reviews(list) = value {
          list.retain(|r| r.id != review_id);
        }
      }
    })
  }
}

/// First full copy of a review anywhere in `values`.
///
/// Walks every cached review once, so the cost is O(total cached reviews).
pub fn find_review<'a>(
  values: impl IntoIterator<Item = &'a CachedValue>,
  review_id: u64,
) -> Option<&'a Review> {
  values
    .into_iter()
    .flat_map(|value| value.reviews().iter())
    .find(|r| r.id == review_id)
}

/// Whether an approved-list key may hold `review`.
fn approved_scope_admits(key: &ApiKey, review: &Review) -> bool {
  key
    .params
    .get("propertyId")
    .map_or(true, |id| id == review.property_id)
}

/// Rewrite every cached copy of a review to `status` before the server has
/// answered.
///
/// When approving, a copy of the review is also appended to each cached
/// approved list that lacks it and whose property scope admits it. The copy
/// comes from whichever cached entry holds the review; if none does, the
/// approved lists are left for the next fetch.
///
/// All rewrites happen under a single lock of the cache.
pub fn apply_moderation(cache: &ApiCache, review_id: u64, status: ReviewStatus) -> OptimisticUpdate {
  cache.with_values(|epoch, mut slots| {
    let copy = if status == ReviewStatus::Published {
      find_review(slots.iter().map(|slot| &*slot.value), review_id)
        .map(|review| review.clone().with_status(status))
    } else {
      None
    };

    let mut rewrites = Vec::new();
    for slot in slots.iter_mut() {
      let previous = slot
        .value
        .reviews()
        .iter()
        .find(|r| r.id == review_id)
        .map(|r| ModerationChange::Status {
          status: r.status,
          is_approved: r.is_approved,
        });

      let change = match (previous, &copy, &mut *slot.value) {
        (Some(change), _, value) => {
          for review in value.reviews_mut() {
            if review.id == review_id {
              review.set_status(status);
            }
          }
          change
        }
        (None, Some(review), CachedValue::Reviews(list))
          if slot.key.kind == ApiQuery::ApprovedReviews
            && approved_scope_admits(slot.key, review) =>
        {
          list.push(review.clone());
          ModerationChange::Appended
        }
        _ => continue,
      };

      rewrites.push(Rewrite {
        key: slot.key.clone(),
        version: slot.version,
        change,
      });
    }

    tracing::debug!(review_id, status = status.as_str(), touched = rewrites.len(), "optimistic moderation");
    OptimisticUpdate {
      review_id,
      epoch,
      rewrites,
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fixtures::review;
  use crate::cache::EntryState;

  fn all_consistent(cache: &ApiCache) -> bool {
    cache.with_values(|_, slots| {
      slots
        .iter()
        .all(|slot| slot.value.reviews().iter().all(Review::is_consistent))
    })
  }

  #[test]
  fn test_key_equality_ignores_field_order() {
    let a = ReviewQueryParams {
      rating: Some(4.0),
      channel: Some(crate::api::types::Channel::Airbnb),
      ..Default::default()
    };
    let b = ReviewQueryParams {
      channel: Some(crate::api::types::Channel::Airbnb),
      rating: Some(4.0),
      ..Default::default()
    };
    assert_eq!(keys::reviews(&a), keys::reviews(&b));
    assert_ne!(keys::reviews(&a), keys::review_page(&a));
  }

  #[test]
  fn test_resources_and_windows() {
    assert_eq!(ApiQuery::DashboardStats.resource(), REVIEWS);
    assert_eq!(ApiQuery::PropertyStats.resource(), PROPERTIES);
    assert_eq!(ApiQuery::Profile.resource(), AUTH);
    assert_eq!(ApiQuery::PendingReviews.stale_time(), Duration::from_secs(60));
    assert_eq!(ApiQuery::ReviewList.stale_time(), Duration::from_secs(120));
    assert_eq!(ApiQuery::ApprovedReviews.stale_time(), Duration::from_secs(300));
    assert_eq!(ApiQuery::PropertyList.stale_time(), Duration::from_secs(600));
    assert_eq!(ApiQuery::GooglePlaceReviews.resource(), GOOGLE_REVIEWS);
    assert_eq!(ApiQuery::GooglePropertySearch.stale_time(), Duration::from_secs(300));
  }

  #[tokio::test(start_paused = true)]
  async fn test_approve_propagates_to_every_entry() {
    let cache = ApiCache::new();
    cache.set(
      keys::pending(),
      vec![
        review(41, "p1", ReviewStatus::Pending),
        review(42, "p1", ReviewStatus::Pending),
      ],
    );
    cache.set(keys::approved(None), Vec::<Review>::new());
    cache.set(keys::review(42), review(42, "p1", ReviewStatus::Pending));

    let update = apply_moderation(&cache, 42, ReviewStatus::Published);
    assert_eq!(update.touched(), 3);

    let pending: Vec<Review> = cache.peek(&keys::pending()).unwrap();
    assert!(pending[1].is_approved);
    assert_eq!(pending[1].status, ReviewStatus::Published);
    assert_eq!(pending[0].status, ReviewStatus::Pending);

    let approved: Vec<Review> = cache.peek(&keys::approved(None)).unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, 42);
    assert!(approved[0].is_approved);
    assert_eq!(approved[0].status, ReviewStatus::Published);

    let detail: Review = cache.peek(&keys::review(42)).unwrap();
    assert!(detail.is_approved);
    assert!(all_consistent(&cache));
  }

  #[tokio::test(start_paused = true)]
  async fn test_approve_respects_property_scope() {
    let cache = ApiCache::new();
    cache.set(keys::pending(), vec![review(42, "p1", ReviewStatus::Pending)]);
    cache.set(keys::approved(Some("p1")), Vec::<Review>::new());
    cache.set(keys::approved(Some("p2")), Vec::<Review>::new());

    apply_moderation(&cache, 42, ReviewStatus::Published);

    let p1: Vec<Review> = cache.peek(&keys::approved(Some("p1"))).unwrap();
    let p2: Vec<Review> = cache.peek(&keys::approved(Some("p2"))).unwrap();
    assert_eq!(p1.len(), 1);
    assert!(p2.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_approve_without_cached_copy_leaves_lists_alone() {
    let cache = ApiCache::new();
    cache.set(keys::approved(None), Vec::<Review>::new());

    let update = apply_moderation(&cache, 42, ReviewStatus::Published);

    assert_eq!(update.touched(), 0);
    let approved: Vec<Review> = cache.peek(&keys::approved(None)).unwrap();
    assert!(approved.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_reject_rewrites_stats_and_pages() {
    let cache = ApiCache::new();
    let page = Paginated {
      data: vec![review(7, "p1", ReviewStatus::Published)],
      meta: crate::api::types::PageMeta {
        total: 1,
        page: 1,
        limit: 10,
        total_pages: 1,
      },
    };
    cache.set(keys::review_page(&ReviewQueryParams::default()), page);
    let stats: DashboardStats = serde_json::from_value(crate::api::fixtures::stats_json(vec![
      crate::api::fixtures::review_json(7, "p1", ReviewStatus::Published),
    ]))
    .unwrap();
    cache.set(keys::dashboard_stats(), stats);
    cache.set(keys::approved(None), vec![review(7, "p1", ReviewStatus::Published)]);

    let update = apply_moderation(&cache, 7, ReviewStatus::Rejected);
    assert_eq!(update.touched(), 3);

    let stats: DashboardStats = cache.peek(&keys::dashboard_stats()).unwrap();
    assert_eq!(stats.recent_reviews[0].status, ReviewStatus::Rejected);
    assert!(!stats.recent_reviews[0].is_approved);
    let approved: Vec<Review> = cache.peek(&keys::approved(None)).unwrap();
    assert_eq!(approved.len(), 1);
    assert!(all_consistent(&cache));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rollback_restores_pre_mutation_values() {
    let cache = ApiCache::new();
    cache.set(keys::pending(), vec![review(42, "p1", ReviewStatus::Pending)]);
    cache.set(keys::approved(None), Vec::<Review>::new());

    let update = apply_moderation(&cache, 42, ReviewStatus::Published);
    assert_eq!(update.rollback(&cache), 2);

    let pending: Vec<Review> = cache.peek(&keys::pending()).unwrap();
    assert_eq!(pending[0].status, ReviewStatus::Pending);
    let approved: Vec<Review> = cache.peek(&keys::approved(None)).unwrap();
    assert!(approved.is_empty());
    assert_eq!(cache.state(&keys::pending()), EntryState::Fresh);
  }

  #[tokio::test(start_paused = true)]
  async fn test_overlapping_rollbacks_undo_only_their_own_review() {
    let cache = ApiCache::new();
    cache.set(
      keys::pending(),
      vec![
        review(41, "p1", ReviewStatus::Pending),
        review(42, "p1", ReviewStatus::Pending),
      ],
    );
    cache.set(keys::approved(None), Vec::<Review>::new());

    let first = apply_moderation(&cache, 41, ReviewStatus::Published);
    let second = apply_moderation(&cache, 42, ReviewStatus::Published);

    assert_eq!(first.rollback(&cache), 2);
    let pending: Vec<Review> = cache.peek(&keys::pending()).unwrap();
    assert_eq!(pending[0].status, ReviewStatus::Pending);
    assert_eq!(pending[1].status, ReviewStatus::Published);
    let approved: Vec<Review> = cache.peek(&keys::approved(None)).unwrap();
    assert_eq!(approved.iter().map(|r| r.id).collect::<Vec<_>>(), vec![42]);

    assert_eq!(second.rollback(&cache), 2);
    let pending: Vec<Review> = cache.peek(&keys::pending()).unwrap();
    assert!(pending
      .iter()
      .all(|r| r.status == ReviewStatus::Pending && !r.is_approved));
    let approved: Vec<Review> = cache.peek(&keys::approved(None)).unwrap();
    assert!(approved.is_empty());
    assert!(all_consistent(&cache));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rollback_after_clear_is_a_no_op() {
    let cache = ApiCache::new();
    cache.set(keys::pending(), vec![review(42, "p1", ReviewStatus::Pending)]);

    let update = apply_moderation(&cache, 42, ReviewStatus::Published);
    cache.clear();
    cache.set(keys::pending(), vec![review(42, "p1", ReviewStatus::Published)]);

    assert_eq!(update.rollback(&cache), 0);
    let pending: Vec<Review> = cache.peek(&keys::pending()).unwrap();
    assert!(pending[0].is_approved);
  }
}
