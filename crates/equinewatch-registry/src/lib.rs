//! Two-tier cross-chunk identity registry (§4.3).
//!
//! - `hot_store` — Redis-backed, TTL'd cache keyed `horse:<stream>:<track>:state`
//! - `client`/`types` — Firestore REST client for the durable warm tier
//! - `identity_repo` — the `LoadBarn`/`SaveBarn`/`ExpireHot`/`Cleanup` operations
//!   that stitch the two tiers together with the hot-shadows-warm ordering rule
//! - `retry`/`metrics` — production-grade retry and observability for the
//!   warm tier's HTTP calls

pub mod client;
pub mod error;
pub mod hot_store;
pub mod identity_repo;
pub mod metrics;
pub mod retry;
pub mod types;

pub use client::{RegistryClient, RegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use hot_store::{HotConfig, HotStore};
pub use identity_repo::{blend_and_normalize, IdentityRegistry, WARM_BLEND_OLD_WEIGHT};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
