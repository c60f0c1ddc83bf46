//! # sp-cache
//!
//! Shared, concurrently accessed state of the SAML service provider.
//!
//! Message processing is otherwise request-scoped; the only state shared
//! between requests lives behind the traits in this crate:
//!
//! - [`ArtifactStore`] - artifact string to pending signed document, short TTL,
//!   consumed exactly once by artifact resolution
//! - [`ReplayCache`] - assertion IDs already accepted, kept until the
//!   assertion would have expired anyway
//!
//! Both come with `DashMap`-backed in-memory implementations that are safe for
//! concurrent inserts from many handlers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod artifact;
pub mod error;
pub mod replay;

pub use artifact::{ArtifactStore, InMemoryArtifactStore};
pub use error::{CacheError, CacheResult};
pub use replay::{InMemoryReplayCache, ReplayCache};
