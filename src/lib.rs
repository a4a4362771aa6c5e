//! Client for the Flex Living review gateway: typed services, a query cache
//! with optimistic moderation, and session state.

pub mod api;
pub mod cache;
pub mod commands;
pub mod config;
pub mod logging;
pub mod search;
pub mod services;
pub mod session;
pub mod storage;
