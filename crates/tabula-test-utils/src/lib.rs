//! Testing utilities for the Tabula workspace
//!
//! Scripted collaborators, an in-memory dataset store and fixtures.

#![allow(missing_docs)]

pub mod fixtures;
pub mod scripted;
pub mod store;

pub use fixtures::{dataset_refs, progress, sample_plan, submission, ControllerHarness};
pub use scripted::{RecordingConversationStore, ScriptedExecutor, ScriptedPlanner};
pub use store::InMemoryDatasetStore;
