//! # Delivery Core (Quiver)
//!
//! Picks one piece of content per request from a pool of candidates. Each
//! candidate carries a priority and a set of flag conditions; the pool keeps
//! candidates ordered, optionally shards them by the values of chosen symbol
//! flags, and fires the best eligible candidate through a firing hook.
//!
//! ## Core Components
//!
//! - **candidate**: Candidates, their priority modes and busy policies, and bundles
//! - **pool**: Ordered buckets, the partition index, the bundle ledger and the
//!   `DeliveryPool` selection engine
//! - **dispatch**: The firing layer that hands candidates to a sink and keeps a
//!   backlog while the sink is busy
//!
//! ## Design Philosophy
//!
//! - **Condition-Driven**: Eligibility is decided by flag state supplied per request
//! - **Deterministic when seeded**: Every random choice draws from an injected RNG
//! - **Single-threaded**: Every operation runs to completion; nothing blocks

pub mod candidate;
pub mod dispatch;
pub mod error;
pub mod pool;

pub use candidate::*;
pub use dispatch::*;
pub use error::*;
pub use pool::*;
