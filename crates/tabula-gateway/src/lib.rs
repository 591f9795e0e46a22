//! Tabula Gateway - HTTP adapters
//!
//! - [`WorkflowClient`]: plan generation, submission and progress
//! - [`ProxyClient`]: datasets, profile assignments, users, conversations
//!
//! Both are configured from [`tabula_core::GatewayConfig`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod http;
pub mod proxy;
pub mod workflow;

pub use proxy::ProxyClient;
pub use workflow::WorkflowClient;
