//! Core types for Tabula
//!
//! Identifiers and the user identity shared by the access evaluator and the
//! report controller.

use crate::profile::ProfileCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dataset identifier assigned by the data proxy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub String);

impl DatasetId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Report identifier assigned by the external executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl ReportId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReportId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Dataset picked by the user for a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRef {
    pub id: DatasetId,
    pub name: String,
}

impl DatasetRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: DatasetId::new(id),
            name: name.into(),
        }
    }
}

/// Authenticated user with an optional org assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub email: String,
    /// `None` when the user has no org assignment
    #[serde(default)]
    pub profile: Option<ProfileCode>,
}

impl UserIdentity {
    pub fn new(email: impl Into<String>, profile: Option<ProfileCode>) -> Self {
        Self {
            email: email.into(),
            profile: profile.filter(|code| !code.is_blank()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(ProfileCode::is_admin)
    }

    /// Case-insensitive, whitespace-tolerant email comparison
    #[must_use]
    pub fn has_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_profile_is_unassigned() {
        let user = UserIdentity::new("a@x.io", Some(ProfileCode::new("  ")));
        assert!(user.profile.is_none());
        assert!(!user.is_admin());
    }

    #[test]
    fn email_comparison_ignores_case() {
        let user = UserIdentity::new("Ana@Example.com", None);
        assert!(user.has_email(" ana@example.com"));
        assert!(!user.has_email("bob@example.com"));
    }

    #[test]
    fn identity_serializes_camel_case() {
        let user = UserIdentity::new("a@x.io", Some(ProfileCode::new("abc000000")));
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["profile"], "abc000000");
        assert_eq!(json["email"], "a@x.io");
    }
}
