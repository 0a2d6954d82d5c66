//! Domain model for the proxy pool.
//!
//! A single entity — the [`Proxy`] — plus the enums that refine its raw
//! text columns and the [`ProxyCandidate`] shape emitted by sources.

mod proxy;

pub use proxy::*;
