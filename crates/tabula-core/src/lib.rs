//! Tabula Core - shared foundations
//!
//! Everything the access evaluator, the report controller and the boundary
//! adapters agree on:
//! - Identity types (profile codes, users, dataset references)
//! - The error taxonomy surfaced to callers
//! - Layered configuration (TOML file + environment)
//! - The explicitly constructed session context
//! - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula_core::{Session, FileSessionStore, UserIdentity, ProfileCode};
//!
//! let store = FileSessionStore::new("/tmp/tabula-session.json");
//! let mut session = Session::new(store, chrono::Duration::hours(24));
//! let user = UserIdentity::new("ana@example.com", Some(ProfileCode::new("abc123000")));
//! session.login(user, chrono::Utc::now())?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod profile;
pub mod session;
pub mod telemetry;
pub mod types;

pub use config::{
    AccessConfig, GatewayConfig, PollingConfig, SessionConfig, TabulaConfig, UnassignedPolicy,
};
pub use error::{ConfigError, RequestFailure, SessionError, ValidationError};
pub use profile::{ProfileCode, ProfileSegments, ADMIN_PROFILE, WILDCARD_SEGMENT};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionContext, SessionStore};
pub use types::{DatasetId, DatasetRef, ReportId, UserIdentity};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
