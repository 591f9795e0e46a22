//! Hierarchical profile codes
//!
//! A profile code is 9 characters: three fixed-width segments for company,
//! business unit and team. `"000"` in the BU or team position is a wildcard.
//! Codes are minted elsewhere; this module only parses them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard value for the business-unit and team segments
pub const WILDCARD_SEGMENT: &str = "000";

/// Profile carried by super-admins; bypasses every access check
pub const ADMIN_PROFILE: &str = "adm000000";

const SEGMENT_WIDTH: usize = 3;
const CODE_WIDTH: usize = SEGMENT_WIDTH * 3;

/// Raw profile code as stored; may be padded or malformed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileCode(String);

impl ProfileCode {
    #[inline]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Admin sentinel profile
    #[must_use]
    pub fn admin() -> Self {
        Self(ADMIN_PROFILE.to_string())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank codes are treated as "no profile"
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0.trim() == ADMIN_PROFILE
    }

    /// Split into trimmed segments, `None` when malformed
    ///
    /// The raw code is cut at offsets 0/3/6 and each segment is trimmed, so
    /// stored padding inside a segment is tolerated. Trailing whitespace
    /// beyond the ninth character is ignored. Malformed means: not exactly 9
    /// characters, an empty segment after trimming, or a wildcard company.
    #[must_use]
    pub fn segments(&self) -> Option<ProfileSegments> {
        let mut chars: Vec<char> = self.0.chars().collect();
        while chars.len() > CODE_WIDTH && chars.last().is_some_and(|c| c.is_whitespace()) {
            chars.pop();
        }
        if chars.len() != CODE_WIDTH {
            return None;
        }

        let mut parts = chars.chunks(SEGMENT_WIDTH).map(|chunk| {
            let segment: String = chunk.iter().collect();
            segment.trim().to_string()
        });
        let company = parts.next()?;
        let business_unit = parts.next()?;
        let team = parts.next()?;

        if company.is_empty() || business_unit.is_empty() || team.is_empty() {
            return None;
        }
        if company == WILDCARD_SEGMENT {
            return None;
        }

        Some(ProfileSegments {
            company,
            business_unit,
            team,
        })
    }

    /// Wrap an optional stored value; blank becomes `None`, padding is kept
    #[must_use]
    pub fn from_optional(raw: Option<&str>) -> Option<Self> {
        raw.filter(|code| !code.trim().is_empty()).map(Self::new)
    }
}

impl fmt::Display for ProfileCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Parsed company / business unit / team triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileSegments {
    pub company: String,
    pub business_unit: String,
    pub team: String,
}

impl ProfileSegments {
    #[inline]
    #[must_use]
    pub fn is_wildcard(segment: &str) -> bool {
        segment == WILDCARD_SEGMENT
    }
}
