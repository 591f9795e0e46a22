use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tabula_access::{Dataset, DatasetStore, ProfileAssignment, UserProfileRecord};
use tabula_core::{ProfileCode, RequestFailure};

/// `DatasetStore` over in-memory rows
#[derive(Default)]
pub struct InMemoryDatasetStore {
    datasets: RwLock<Vec<Dataset>>,
    assignments: RwLock<Vec<ProfileAssignment>>,
    users: RwLock<HashMap<String, UserProfileRecord>>,
}

impl InMemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dataset(self, dataset: Dataset) -> Self {
        self.datasets.write().push(dataset);
        self
    }

    #[must_use]
    pub fn with_assignment(self, dataset_id: &str, profile_code: &str) -> Self {
        self.assignments
            .write()
            .push(ProfileAssignment::new(dataset_id, profile_code));
        self
    }

    #[must_use]
    pub fn with_user(self, email: &str, profile: Option<&str>) -> Self {
        self.users.write().insert(
            email.to_ascii_lowercase(),
            UserProfileRecord {
                email: email.to_string(),
                profile: ProfileCode::from_optional(profile),
                template_id: None,
            },
        );
        self
    }
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    async fn datasets_for_user(&self, email: &str) -> Result<Vec<Dataset>, RequestFailure> {
        Ok(self
            .datasets
            .read()
            .iter()
            .filter(|d| d.owner_email.trim().eq_ignore_ascii_case(email.trim()))
            .cloned()
            .collect())
    }

    async fn all_datasets(&self) -> Result<Vec<Dataset>, RequestFailure> {
        Ok(self.datasets.read().clone())
    }

    async fn profile_assignments(&self) -> Result<Vec<ProfileAssignment>, RequestFailure> {
        Ok(self.assignments.read().clone())
    }

    async fn user_profile(&self, email: &str) -> Result<Option<UserProfileRecord>, RequestFailure> {
        Ok(self
            .users
            .read()
            .get(&email.trim().to_ascii_lowercase())
            .cloned())
    }
}
