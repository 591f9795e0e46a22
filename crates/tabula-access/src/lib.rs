//! Tabula Access - profile-scoped dataset visibility
//!
//! Decides whether a user may see a dataset based on hierarchical profile
//! codes (`company` / `business unit` / `team`, `"000"` = any):
//! - [`can_access`] is a total, pure predicate that fails closed
//! - [`explain_access`] returns the rule that decided
//! - [`filter_accessible`] applies the predicate to store rows
//! - [`list_accessible_datasets`] fetches from a [`DatasetStore`] and filters
//!
//! # Example
//!
//! ```rust
//! use tabula_access::{can_access, DatasetAccessRecord};
//! use tabula_core::{ProfileCode, UnassignedPolicy, UserIdentity};
//!
//! let user = UserIdentity::new("ana@example.com", Some(ProfileCode::new("abc123000")));
//! let dataset = DatasetAccessRecord::new("ds-1", "bob@example.com", Some(ProfileCode::new("abc000000")));
//! assert!(can_access(&user, &dataset, UnassignedPolicy::OwnerOnly));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod evaluator;
pub mod pipeline;
pub mod store;

pub use evaluator::{can_access, explain_access, AccessDecision, DatasetAccessRecord};
pub use pipeline::{
    filter_accessible, list_accessible_datasets, list_owned_datasets, resolve_identity,
};
pub use store::{Dataset, DatasetStore, ProfileAssignment, UserProfileRecord};
