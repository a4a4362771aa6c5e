//! The `{success, data?, message?, meta?}` wrapper every gateway call returns.

use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::types::BulkUpdateResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
  pub total: Option<u64>,
  pub page: Option<u64>,
  pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
  pub success: bool,
  pub data: Option<T>,
  pub message: Option<String>,
  pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
  pub fn ok(data: T) -> Self {
    Self {
      success: true,
      data: Some(data),
      message: None,
      meta: None,
    }
  }

  /// Unwrap the payload, turning an unsuccessful or empty envelope into a
  /// validation error that carries the gateway's message verbatim.
  pub fn into_data(self) -> Result<T, ApiError> {
    match (self.success, self.data) {
      (true, Some(data)) => Ok(data),
      (success, _) => {
        let message = self.message.unwrap_or_else(|| {
          if success {
            "Response contained no data".to_string()
          } else {
            "Request was not successful".to_string()
          }
        });
        Err(ApiError::validation("REQUEST_UNSUCCESSFUL", message))
      }
    }
  }
}

/// Payloads an acknowledgement endpoint may leave out of a successful
/// response.
pub trait AckPayload: Default {
  fn message_mut(&mut self) -> &mut String;
}

impl<T: Default> ApiResponse<T> {
  /// Like [`Self::into_data`], but `success: true` without `data` yields
  /// the empty value.
  pub fn into_data_or_default(self) -> Result<T, ApiError> {
    if self.success && self.data.is_none() {
      return Ok(T::default());
    }
    self.into_data()
  }
}

impl<T: AckPayload> ApiResponse<T> {
  /// Unwrap an acknowledgement. Unlike [`Self::into_data`], `success: true`
  /// without `data` is accepted and the envelope `message` fills in.
  pub fn into_ack(self) -> Result<T, ApiError> {
    if !self.success {
      return self.into_data();
    }
    let mut ack = self.data.unwrap_or_default();
    if let Some(message) = self.message {
      let slot = ack.message_mut();
      if slot.is_empty() {
        *slot = message;
      }
    }
    Ok(ack)
  }
}

/// Payload of endpoints that only acknowledge an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
  #[serde(default)]
  pub message: String,
}

impl AckPayload for Acknowledgement {
  fn message_mut(&mut self) -> &mut String {
    &mut self.message
  }
}

impl AckPayload for BulkUpdateResult {
  fn message_mut(&mut self) -> &mut String {
    &mut self.message
  }
}
