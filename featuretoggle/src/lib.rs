//! Feature toggles served from a local snapshot of a Redis hash.
//!
//! Every flag of a service lives in one hash named after the service. A flag
//! `Name` is accompanied by `Name.type`, which declares how the value is
//! parsed: `boolean`, `string` or `number`. The client fetches the whole hash
//! at startup, then rebuilds its snapshot whenever a keyspace notification
//! reports a change to it.
//!
//! ```ignore
//! let config = Config::new("localhost", 6379, 0, "checkout");
//! let toggles = FeatureToggle::init(&config).await?;
//!
//! if toggles.is_enabled("NewCheckout", false) {
//!     // ...
//! }
//! ```

pub mod accessor;
pub mod cache;
mod client;
pub mod config;
pub mod decode;
pub mod direct;
pub mod listener;
pub mod metrics_defs;
pub mod percentage;
pub mod redis_store;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testutils;

pub use accessor::{AccessError, TypeTag};
pub use cache::FetchError;
pub use client::{FeatureToggle, InitError};
pub use config::Config;
pub use decode::{Decode, Json};
pub use direct::DirectFlags;
pub use store::{Notification, StoreConnector, StoreError};
