//! Dataset/user store contract
//!
//! Implemented over HTTP by `tabula-gateway` and in memory by
//! `tabula-test-utils`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabula_core::{DatasetId, ProfileCode, RequestFailure};

/// Dataset row as returned by the data proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: DatasetId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "owner_email")]
    pub owner_email: String,
    #[serde(default, alias = "row_count")]
    pub row_count: Option<u64>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
}

impl Dataset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner_email: impl Into<String>,
    ) -> Self {
        Self {
            id: DatasetId::new(id),
            name: name.into(),
            owner_email: owner_email.into(),
            row_count: None,
            created_at: None,
        }
    }
}

/// Profile code attached to a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAssignment {
    #[serde(alias = "dataset_id")]
    pub dataset_id: DatasetId,
    #[serde(default, alias = "profile_code")]
    pub profile_code: Option<ProfileCode>,
}

impl ProfileAssignment {
    pub fn new(dataset_id: impl Into<String>, profile_code: &str) -> Self {
        Self {
            dataset_id: DatasetId::new(dataset_id),
            profile_code: ProfileCode::from_optional(Some(profile_code)),
        }
    }
}

/// User row with org assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileRecord {
    pub email: String,
    #[serde(default, alias = "profile_code")]
    pub profile: Option<ProfileCode>,
    #[serde(default, alias = "template_id")]
    pub template_id: Option<String>,
}

/// Read access to datasets, assignments and user profiles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Datasets uploaded by `email`
    async fn datasets_for_user(&self, email: &str) -> Result<Vec<Dataset>, RequestFailure>;

    /// Every dataset in the system
    async fn all_datasets(&self) -> Result<Vec<Dataset>, RequestFailure>;

    /// All dataset → profile code assignments
    async fn profile_assignments(&self) -> Result<Vec<ProfileAssignment>, RequestFailure>;

    /// Profile row for `email`, `None` for unknown users
    async fn user_profile(&self, email: &str) -> Result<Option<UserProfileRecord>, RequestFailure>;
}
