//! Access control for evaluated rows.
//!
//! An [`AccessOracle`] answers whether the caller may view an instance. The
//! [`AccessFilter`] applies it to an executed query once, memoizing every
//! decision, and fails closed when the oracle errors.

pub mod capability;
pub mod error;
pub mod filter;
pub mod oracle;

pub use capability::{Capability, CapabilitySet, TypeScope};
pub use error::{AccessError, AccessResult};
pub use filter::{AccessFilter, AccessView};
pub use oracle::{AccessDecisions, AccessOracle, AllowAll, DenyList, FailingOracle};
