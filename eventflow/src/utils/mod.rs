//! Identifier and timestamp helpers.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Returns the current UTC time as an RFC 3339 string with microseconds.
///
/// ```
/// let ts = eventflow::utils::iso_timestamp();
/// assert!(ts.ends_with('Z'));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Generates a random identifier for runs and contexts.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_v4() {
        assert_eq!(generate_uuid().get_version_num(), 4);
        assert_ne!(generate_uuid(), generate_uuid());
    }

    #[test]
    fn test_iso_timestamp_parses_back() {
        let ts = iso_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
