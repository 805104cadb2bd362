//! Paymo API access: the client contract, the HTTP implementation and the
//! caching wrapper.

pub mod api;
pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod types;

pub use api::{ApiResult, PaymoApi};
pub use cached_client::CachedPaymoClient;
pub use client::PaymoClient;
pub use error::{ApiError, ErrorCode};
