//! Temporary access grant resolution.
//!
//! Roles and specific privileges share one grant shape: a permanent/temporary
//! flag plus an optional mode, range and start time. [`resolve`] turns the
//! user-declared values into what the API expects, and [`require_permanent`]
//! enforces that a membership keeps at least one permanent role.
//!
//! The end of a temporary grant is never computed here; the API owns expiry
//! math and reports `temporaryAccessEndTime` back after a successful call.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ProviderError;

/// Mode used for temporary grants that do not declare one.
pub const DEFAULT_TEMPORARY_MODE: &str = "relative";

/// Range used for temporary grants that do not declare one.
pub const DEFAULT_TEMPORARY_RANGE: &str = "1h";

/// Error reported when every grant of a membership is temporary.
pub const MISSING_PERMANENT_ROLE: &str = "Must have at least one permanent role";

/// A grant as declared in configuration. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemporaryGrant {
    /// Whether the grant expires.
    pub is_temporary: bool,
    /// Temporary mode, e.g. `relative`.
    pub temporary_mode: Option<String>,
    /// Duration of the grant, e.g. `1h` or `7d`.
    pub temporary_range: Option<String>,
    /// RFC 3339 timestamp at which the grant starts.
    pub temporary_access_start_time: Option<String>,
}

/// The effective grant sent to the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedGrant {
    /// Never expires; every temporary field is null.
    Permanent,
    /// Expires `range` after `start_time`.
    Temporary {
        /// Effective temporary mode.
        mode: String,
        /// Effective range.
        range: String,
        /// Effective start time.
        start_time: DateTime<Utc>,
    },
}

impl ResolvedGrant {
    /// Whether the grant expires.
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    /// Effective mode, `None` for permanent grants.
    pub fn mode(&self) -> Option<&str> {
        match self {
            Self::Permanent => None,
            Self::Temporary { mode, .. } => Some(mode),
        }
    }

    /// Effective range, `None` for permanent grants.
    pub fn range(&self) -> Option<&str> {
        match self {
            Self::Permanent => None,
            Self::Temporary { range, .. } => Some(range),
        }
    }

    /// Effective start time as an RFC 3339 string, `None` for permanent grants.
    pub fn start_time(&self) -> Option<String> {
        match self {
            Self::Permanent => None,
            Self::Temporary { start_time, .. } => Some(format_timestamp(*start_time)),
        }
    }
}

/// Resolve a declared grant into its effective form.
///
/// `label` names the role or privilege in error messages. `now` is the start
/// time used when a temporary grant does not declare one.
pub fn resolve(
    label: &str,
    grant: &TemporaryGrant,
    now: DateTime<Utc>,
) -> Result<ResolvedGrant, ProviderError> {
    if !grant.is_temporary {
        return Ok(ResolvedGrant::Permanent);
    }

    let start_time = match non_empty(&grant.temporary_access_start_time) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|err| {
                ProviderError::Validation(format!(
                    "Unable to parse temporary_access_start_time of '{}': '{}' is not a valid RFC 3339 timestamp ({})",
                    label, raw, err
                ))
            })?,
        None => now,
    };

    Ok(ResolvedGrant::Temporary {
        mode: non_empty(&grant.temporary_mode)
            .unwrap_or(DEFAULT_TEMPORARY_MODE)
            .to_string(),
        range: non_empty(&grant.temporary_range)
            .unwrap_or(DEFAULT_TEMPORARY_RANGE)
            .to_string(),
        start_time,
    })
}

/// Fail unless at least one of the given `is_temporary` flags is `false`.
pub fn require_permanent<I>(is_temporary_flags: I) -> Result<(), ProviderError>
where
    I: IntoIterator<Item = bool>,
{
    if is_temporary_flags.into_iter().any(|temporary| !temporary) {
        Ok(())
    } else {
        Err(ProviderError::Validation(MISSING_PERMANENT_ROLE.to_string()))
    }
}

/// Render a timestamp the way the API and Terraform state expect it.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
