//! Process-wide principal state, persisted as a session blob.
//!
//! The blob is stored under `auth-storage` as
//! `{"state": {"user": .., "token": .., "isAuthenticated": ..}, "version": 0}`.
//! The transport reads `state.token` from it before every call.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::api::types::Manager;
use crate::storage::LocalStore;

pub const SESSION_KEY: &str = "auth-storage";

/// An authenticated principal and its bearer token
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
  pub user: Manager,
  pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
  user: Option<Manager>,
  token: Option<String>,
  #[serde(default)]
  is_authenticated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedBlob {
  state: PersistedState,
  #[serde(default)]
  version: u32,
}

/// Read the bearer token from the persisted blob.
///
/// A missing, unreadable or malformed blob yields `None`; the call then goes
/// out unauthenticated.
pub fn persisted_token(store: &dyn LocalStore) -> Option<String> {
  let raw = match store.get(SESSION_KEY) {
    Ok(raw) => raw?,
    Err(e) => {
      tracing::warn!(error = %e, "could not read session storage");
      return None;
    }
  };
  match serde_json::from_str::<serde_json::Value>(&raw) {
    Ok(value) => value
      .get("state")
      .and_then(|state| state.get("token"))
      .and_then(|token| token.as_str())
      .filter(|token| !token.is_empty())
      .map(String::from),
    Err(e) => {
      tracing::warn!(error = %e, "error parsing auth token");
      None
    }
  }
}

/// Session state with an explicit lifecycle: empty at start, hydrated from
/// storage, set on login, cleared on logout.
#[derive(Clone)]
pub struct SessionStore {
  current: Arc<RwLock<Option<Session>>>,
  store: Arc<dyn LocalStore>,
}

impl SessionStore {
  pub fn new(store: Arc<dyn LocalStore>) -> Self {
    Self {
      current: Arc::new(RwLock::new(None)),
      store,
    }
  }

  /// Create a store and load any valid persisted session.
  pub fn hydrated(store: Arc<dyn LocalStore>) -> Self {
    let session = Self::new(store);
    if let Err(e) = session.hydrate() {
      tracing::warn!(error = %e, "ignoring unreadable session");
    }
    session
  }

  /// Load the persisted session, if a complete one exists.
  pub fn hydrate(&self) -> Result<bool> {
    let Some(raw) = self.store.get(SESSION_KEY)? else {
      return Ok(false);
    };
    let blob: PersistedBlob =
      serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse session: {}", e))?;

    let restored = match (blob.state.user, blob.state.token) {
      (Some(user), Some(token)) if blob.state.is_authenticated && !token.is_empty() => {
        Some(Session { user, token })
      }
      _ => None,
    };
    let found = restored.is_some();
    self.replace(restored);
    Ok(found)
  }

  pub fn current(&self) -> Option<Session> {
    self
      .current
      .read()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .clone()
  }

  pub fn is_authenticated(&self) -> bool {
    self.current().is_some()
  }

  pub fn user(&self) -> Option<Manager> {
    self.current().map(|s| s.user)
  }

  pub fn token(&self) -> Option<String> {
    self.current().map(|s| s.token)
  }

  /// Set the principal and persist it.
  pub fn login(&self, user: Manager, token: String) -> Result<()> {
    let session = Session { user, token };
    self.persist(&session)?;
    tracing::info!(user = %session.user.email, "session started");
    self.replace(Some(session));
    Ok(())
  }

  /// Swap in a rotated token for the current principal.
  pub fn set_token(&self, token: String) -> Result<()> {
    let Some(mut session) = self.current() else {
      return Err(eyre!("No active session to update"));
    };
    session.token = token;
    self.persist(&session)?;
    self.replace(Some(session));
    Ok(())
  }

  /// Drop the principal and its persisted blob.
  pub fn logout(&self) -> Result<()> {
    self.replace(None);
    self.store.remove(SESSION_KEY)?;
    tracing::info!("session cleared");
    Ok(())
  }

  fn replace(&self, session: Option<Session>) {
    *self
      .current
      .write()
      .unwrap_or_else(std::sync::PoisonError::into_inner) = session;
  }

  fn persist(&self, session: &Session) -> Result<()> {
    let blob = PersistedBlob {
      state: PersistedState {
        user: Some(session.user.clone()),
        token: Some(session.token.clone()),
        is_authenticated: true,
      },
      version: 0,
    };
    let data =
      serde_json::to_string(&blob).map_err(|e| eyre!("Failed to serialize session: {}", e))?;
    self.store.set(SESSION_KEY, &data)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Role;
  use crate::storage::MemoryStore;

  fn manager() -> Manager {
    Manager {
      id: "m1".to_string(),
      email: "admin@flexliving.com".to_string(),
      name: "Admin".to_string(),
      role: Role::Admin,
      created_at: None,
    }
  }

  #[test]
  fn test_starts_empty() {
    let session = SessionStore::new(Arc::new(MemoryStore::new()));
    assert!(!session.is_authenticated());
    assert_eq!(session.token(), None);
  }

  #[test]
  fn test_login_persists_token() {
    let store = Arc::new(MemoryStore::new());
    let session = SessionStore::new(store.clone());

    session.login(manager(), "tok-1".to_string()).unwrap();

    assert!(session.is_authenticated());
    assert_eq!(persisted_token(store.as_ref()).as_deref(), Some("tok-1"));
  }

  #[test]
  fn test_hydrate_restores_session() {
    let store = Arc::new(MemoryStore::new());
    SessionStore::new(store.clone())
      .login(manager(), "tok-1".to_string())
      .unwrap();

    let restored = SessionStore::hydrated(store);
    assert_eq!(restored.user().map(|u| u.email), Some("admin@flexliving.com".to_string()));
    assert_eq!(restored.token().as_deref(), Some("tok-1"));
  }

  #[test]
  fn test_hydrate_ignores_incomplete_blob() {
    let store = Arc::new(MemoryStore::new());
    store
      .set(SESSION_KEY, r#"{"state": {"user": null, "token": null, "isAuthenticated": false}}"#)
      .unwrap();

    let session = SessionStore::hydrated(store.clone());
    assert!(!session.is_authenticated());

    store.set(SESSION_KEY, "not json").unwrap();
    let session = SessionStore::hydrated(store);
    assert!(!session.is_authenticated());
  }

  #[test]
  fn test_logout_clears_storage() {
    let store = Arc::new(MemoryStore::new());
    let session = SessionStore::new(store.clone());
    session.login(manager(), "tok-1".to_string()).unwrap();

    session.logout().unwrap();

    assert!(!session.is_authenticated());
    assert_eq!(store.get(SESSION_KEY).unwrap(), None);
    assert_eq!(persisted_token(store.as_ref()), None);
  }

  #[test]
  fn test_set_token_rotates() {
    let store = Arc::new(MemoryStore::new());
    let session = SessionStore::new(store.clone());
    assert!(session.set_token("x".to_string()).is_err());

    session.login(manager(), "tok-1".to_string()).unwrap();
    session.set_token("tok-2".to_string()).unwrap();
    assert_eq!(persisted_token(store.as_ref()).as_deref(), Some("tok-2"));
  }

  #[test]
  fn test_persisted_token_tolerates_garbage() {
    let store = MemoryStore::new();
    assert_eq!(persisted_token(&store), None);
    store.set(SESSION_KEY, "{broken").unwrap();
    assert_eq!(persisted_token(&store), None);
    store.set(SESSION_KEY, r#"{"state": {"token": "abc"}}"#).unwrap();
    assert_eq!(persisted_token(&store).as_deref(), Some("abc"));
  }
}
