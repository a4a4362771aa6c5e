//! Typed wrappers over the gateway endpoints, one per resource.
//!
//! Services only shape parameters; every call returns the raw envelope and
//! propagates errors unchanged.

pub mod auth;
pub mod google;
pub mod properties;
pub mod reviews;

pub use auth::{AuthService, RegisterData};
pub use google::GoogleReviewsService;
pub use properties::PropertiesService;
pub use reviews::ReviewsService;
