//! Dataset listing pipeline
//!
//! Fetch, join, filter. The filter step is pure and depends only on the two
//! collections passed in.

use crate::evaluator::{explain_access, AccessDecision, DatasetAccessRecord};
use crate::store::{Dataset, DatasetStore, ProfileAssignment};
use std::collections::HashMap;
use tabula_core::{DatasetId, ProfileCode, RequestFailure, UnassignedPolicy, UserIdentity};

/// Keep the datasets `user` may access, in input order
///
/// A dataset with several assignments is visible when any of them grants
/// access; a dataset with no (non-blank) assignment follows `policy`.
#[must_use]
pub fn filter_accessible(
    user: &UserIdentity,
    datasets: &[Dataset],
    assignments: &[ProfileAssignment],
    policy: UnassignedPolicy,
) -> Vec<Dataset> {
    let mut codes_by_dataset: HashMap<&DatasetId, Vec<&ProfileCode>> = HashMap::new();
    for assignment in assignments {
        if let Some(code) = assignment.profile_code.as_ref().filter(|c| !c.is_blank()) {
            codes_by_dataset
                .entry(&assignment.dataset_id)
                .or_default()
                .push(code);
        }
    }

    datasets
        .iter()
        .filter(|dataset| {
            let decision = decide(user, dataset, codes_by_dataset.get(&dataset.id), policy);
            tracing::trace!(
                dataset_id = %dataset.id,
                decision = %decision,
                "access evaluated"
            );
            decision.is_granted()
        })
        .cloned()
        .collect()
}

fn decide(
    user: &UserIdentity,
    dataset: &Dataset,
    codes: Option<&Vec<&ProfileCode>>,
    policy: UnassignedPolicy,
) -> AccessDecision {
    let record = |code: Option<ProfileCode>| DatasetAccessRecord {
        dataset_id: dataset.id.clone(),
        owner_email: dataset.owner_email.clone(),
        profile_code: code,
    };

    match codes {
        None => explain_access(user, &record(None), policy),
        Some(codes) => {
            let mut last = AccessDecision::MalformedCode;
            for code in codes {
                last = explain_access(user, &record(Some((*code).clone())), policy);
                if last.is_granted() {
                    break;
                }
            }
            last
        }
    }
}

/// Fetch every dataset and assignment, then filter for `user`
pub async fn list_accessible_datasets<S>(
    store: &S,
    user: &UserIdentity,
    policy: UnassignedPolicy,
) -> Result<Vec<Dataset>, RequestFailure>
where
    S: DatasetStore + ?Sized,
{
    let datasets = store.all_datasets().await?;
    let assignments = store.profile_assignments().await?;
    let visible = filter_accessible(user, &datasets, &assignments, policy);

    tracing::debug!(
        email = %user.email,
        total = datasets.len(),
        visible = visible.len(),
        "filtered datasets"
    );
    Ok(visible)
}

/// Datasets the user uploaded
pub async fn list_owned_datasets<S>(store: &S, email: &str) -> Result<Vec<Dataset>, RequestFailure>
where
    S: DatasetStore + ?Sized,
{
    store.datasets_for_user(email).await
}

/// Build a `UserIdentity` from the user's profile row
///
/// Unknown users get no profile rather than an error.
pub async fn resolve_identity<S>(store: &S, email: &str) -> Result<UserIdentity, RequestFailure>
where
    S: DatasetStore + ?Sized,
{
    let profile = store
        .user_profile(email)
        .await?
        .and_then(|record| record.profile);
    Ok(UserIdentity::new(email, profile))
}
