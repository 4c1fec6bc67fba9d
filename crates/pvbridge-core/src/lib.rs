//! pvbridge core - shared types for the process variable bridge
//!
//! This crate provides the domain types shared between the wire protocol
//! (`pvbridge-protocol`) and the daemon (`pvbridged`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod ids;
pub mod metadata;
pub mod update;
pub mod value;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use ids::{SubscriberId, VariableName};
pub use metadata::{Alarm, Control, Display, TimeStamp, ValueAlarm};
pub use update::RawUpdate;
pub use value::PvValue;
