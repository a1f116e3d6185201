// SPDX-License-Identifier: MIT

//! Shared helpers for date/time formatting.

use chrono::{SecondsFormat, Utc};

/// Current UTC time as RFC3339 with microsecond precision and a `Z` suffix.
///
/// Microsecond precision keeps lexicographic order on stored timestamps
/// consistent with chronological order for rapidly-created records.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
