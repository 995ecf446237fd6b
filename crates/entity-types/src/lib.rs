//! # entity-types
//!
//! Shared domain types for the entity index.
//!
//! This crate defines the data structures the index and its callers agree on:
//! - Groups: `InternalGroup` keyed by a `GroupUuid`
//! - Accounts: `AccountId` for group membership
//! - Settings: layered `IndexSettings` configuration
//!
//! ## Usage
//!
//! ```rust
//! use entity_types::{GroupUuid, InternalGroup};
//!
//! let uuid = GroupUuid::new("a1b2c3").unwrap();
//! let group = InternalGroup::new(1, uuid, "Administrators");
//! assert_eq!(group.name, "Administrators");
//! ```

pub mod config;
pub mod error;
pub mod group;

pub use config::{IndexSettings, ReloadMode};
pub use error::TypesError;
pub use group::{AccountId, GroupUuid, InternalGroup};
