pub mod cache;
pub mod cached_client;
pub mod client;
pub mod envelope;
pub mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;

pub use cached_client::CachedApiClient;
pub use client::{ApiClient, ApiRequest, Transport};
pub use error::{log_error, ApiError, ErrorKind};
