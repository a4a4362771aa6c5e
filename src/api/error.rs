//! Uniform error shape for every call that crosses the gateway boundary.

use thiserror::Error;

/// Generic code used when nothing more specific is known.
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// Classification of a failure, decided once at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Network failure, timeout, refused connection, undecodable response
  Transport,
  /// 4xx responses
  ClientError,
  /// 5xx responses
  ServerError,
  /// Business/validation failure carried in the response envelope
  Validation,
}

impl ErrorKind {
  /// Classify an HTTP status. Status 0 means no response was received; any
  /// other non-2xx status outside 4xx counts as a server error.
  pub fn from_status(status: u16) -> Self {
    match status {
      0 => ErrorKind::Transport,
      400..=499 => ErrorKind::ClientError,
      _ => ErrorKind::ServerError,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (status {status}, {code})")]
pub struct ApiError {
  pub kind: ErrorKind,
  pub message: String,
  pub status: u16,
  pub code: String,
  pub details: Option<String>,
}

impl ApiError {
  /// Error for a non-2xx HTTP response.
  pub fn http(status: u16, message: impl Into<String>, details: Option<String>) -> Self {
    let kind = ErrorKind::from_status(status);
    let code = match kind {
      ErrorKind::ClientError => "ERR_BAD_REQUEST",
      ErrorKind::ServerError => "ERR_BAD_RESPONSE",
      _ => UNKNOWN_ERROR,
    };
    Self {
      kind,
      message: message.into(),
      status,
      code: code.to_string(),
      details,
    }
  }

  /// Error for a request that never produced a response.
  pub fn transport(code: &str, message: impl Into<String>) -> Self {
    Self {
      kind: ErrorKind::Transport,
      message: message.into(),
      status: 0,
      code: code.to_string(),
      details: None,
    }
  }

  pub fn timeout(after: std::time::Duration) -> Self {
    Self::transport(
      "ECONNABORTED",
      format!("timeout of {}ms exceeded", after.as_millis()),
    )
  }

  pub fn network(message: impl Into<String>) -> Self {
    Self::transport("ERR_NETWORK", message)
  }

  pub fn unknown(message: impl Into<String>) -> Self {
    Self::transport(UNKNOWN_ERROR, message)
  }

  /// Business failure reported by the gateway inside a 2xx envelope, or
  /// refused locally before reaching the gateway.
  pub fn validation(code: &str, message: impl Into<String>) -> Self {
    Self {
      kind: ErrorKind::Validation,
      message: message.into(),
      status: 0,
      code: code.to_string(),
      details: None,
    }
  }

  /// Whether repeating the same request could possibly succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self.kind, ErrorKind::Transport | ErrorKind::ServerError)
  }

  /// Copy suitable for showing to a person, by error category.
  pub fn user_message(&self) -> String {
    match self.status {
      401 => "You are not authorized to access this resource.".to_string(),
      403 => "You do not have permission to perform this action.".to_string(),
      404 => "The requested resource was not found.".to_string(),
      s if s >= 500 => "Server error. Please try again later.".to_string(),
      _ if self.message.is_empty() => "An unexpected error occurred.".to_string(),
      _ => self.message.clone(),
    }
  }
}

/// Log an error that has been accepted as terminal.
pub fn log_error(context: &str, error: &ApiError) {
  tracing::error!(
    context,
    message = %error.message,
    status = error.status,
    code = %error.code,
    details = error.details.as_deref().unwrap_or(""),
    "request failed"
  );
}
