//! redlock is a Rust implementation of the Redlock algorithm for distributed
//! lock management over a set of independent Redis-compatible servers.
//!
//! A [`Coordinator`] owns a set of per-server [`Instance`] adapters and
//! implements the quorum acquisition/renewal/release protocol: a lock is
//! only granted when a strict majority of servers agree, and only for the
//! portion of the requested TTL not already consumed by acquisition
//! latency and clock drift.
//!
//! ```no_run
//! use std::time::Duration;
//! use redlock::{Coordinator, Instance, LockOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let instances = vec![
//!     Instance::connect("redis://127.0.0.1:6379", Duration::from_millis(100))?,
//!     Instance::connect("redis://127.0.0.1:6380", Duration::from_millis(100))?,
//!     Instance::connect("redis://127.0.0.1:6381", Duration::from_millis(100))?,
//! ];
//! let coordinator = Coordinator::new(instances)?;
//!
//! let descriptor = coordinator.lock("my-resource", Duration::from_millis(1000), LockOptions::new())?;
//! coordinator.unlock(&descriptor);
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod descriptor;
mod error;
mod instance;
mod options;
mod script;

pub use config::{CoordinatorConfig, CoordinatorConfigBuilder, RetryDelay, default_redis_urls};
pub use coordinator::Coordinator;
pub use descriptor::LockDescriptor;
pub use error::{RedlockError, RedlockResult};
pub use instance::{ConnectionPool, Instance};
pub use options::{suppress_deprecation_warnings, LockOptions};
