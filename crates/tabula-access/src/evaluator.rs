//! Access Control Evaluator
//!
//! Pure decision procedure. Order of checks:
//! 1. admin sentinel wins unconditionally
//! 2. unassigned datasets follow the [`UnassignedPolicy`]
//! 3. assigned dataset + unassigned user is denied
//! 4. company must match exactly, BU and team match exactly or via `"000"`
//!
//! Malformed codes never match.

use serde::{Deserialize, Serialize};
use tabula_core::{DatasetId, ProfileCode, ProfileSegments, UnassignedPolicy, UserIdentity};

/// The subset of a dataset row the evaluator looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAccessRecord {
    pub dataset_id: DatasetId,
    pub owner_email: String,
    #[serde(default)]
    pub profile_code: Option<ProfileCode>,
}

impl DatasetAccessRecord {
    pub fn new(
        dataset_id: impl Into<String>,
        owner_email: impl Into<String>,
        profile_code: Option<ProfileCode>,
    ) -> Self {
        Self {
            dataset_id: DatasetId::new(dataset_id),
            owner_email: owner_email.into(),
            profile_code,
        }
    }

    /// Assigned code, treating blank as unassigned
    #[inline]
    #[must_use]
    pub fn assigned_code(&self) -> Option<&ProfileCode> {
        self.profile_code.as_ref().filter(|code| !code.is_blank())
    }
}

/// Which rule decided an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessDecision {
    /// User carries the admin sentinel profile
    AdminOverride,
    /// Unassigned dataset, requester is the owner
    OwnerMatch,
    /// Unassigned dataset, policy makes it public
    UnassignedVisible,
    /// All three segments matched
    ProfileMatch,
    /// Unassigned dataset, requester is not the owner
    NotOwner,
    /// Dataset is assigned but the user has no profile
    UserUnassigned,
    /// One of the codes could not be parsed
    MalformedCode,
    CompanyMismatch,
    BusinessUnitMismatch,
    TeamMismatch,
}

impl AccessDecision {
    #[inline]
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(
            self,
            Self::AdminOverride | Self::OwnerMatch | Self::UnassignedVisible | Self::ProfileMatch
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdminOverride => "admin-override",
            Self::OwnerMatch => "owner-match",
            Self::UnassignedVisible => "unassigned-visible",
            Self::ProfileMatch => "profile-match",
            Self::NotOwner => "not-owner",
            Self::UserUnassigned => "user-unassigned",
            Self::MalformedCode => "malformed-code",
            Self::CompanyMismatch => "company-mismatch",
            Self::BusinessUnitMismatch => "business-unit-mismatch",
            Self::TeamMismatch => "team-mismatch",
        }
    }
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `user` may access `dataset`
#[inline]
#[must_use]
pub fn can_access(
    user: &UserIdentity,
    dataset: &DatasetAccessRecord,
    policy: UnassignedPolicy,
) -> bool {
    explain_access(user, dataset, policy).is_granted()
}

/// Evaluate access and report the deciding rule
#[must_use]
pub fn explain_access(
    user: &UserIdentity,
    dataset: &DatasetAccessRecord,
    policy: UnassignedPolicy,
) -> AccessDecision {
    if user.is_admin() {
        return AccessDecision::AdminOverride;
    }

    let Some(dataset_code) = dataset.assigned_code() else {
        return match policy {
            UnassignedPolicy::VisibleToAll => AccessDecision::UnassignedVisible,
            UnassignedPolicy::OwnerOnly => {
                let owner = dataset.owner_email.trim();
                if !owner.is_empty() && user.has_email(owner) {
                    AccessDecision::OwnerMatch
                } else {
                    AccessDecision::NotOwner
                }
            }
        };
    };

    let Some(user_code) = user.profile.as_ref() else {
        return AccessDecision::UserUnassigned;
    };

    let (Some(required), Some(held)) = (dataset_code.segments(), user_code.segments()) else {
        return AccessDecision::MalformedCode;
    };

    compare_segments(&required, &held)
}

fn compare_segments(required: &ProfileSegments, held: &ProfileSegments) -> AccessDecision {
    if required.company != held.company {
        return AccessDecision::CompanyMismatch;
    }
    if !segment_matches(&required.business_unit, &held.business_unit) {
        return AccessDecision::BusinessUnitMismatch;
    }
    if !segment_matches(&required.team, &held.team) {
        return AccessDecision::TeamMismatch;
    }
    AccessDecision::ProfileMatch
}

/// Wildcards only count on the dataset side
#[inline]
fn segment_matches(required: &str, held: &str) -> bool {
    ProfileSegments::is_wildcard(required) || required == held
}
