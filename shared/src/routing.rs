//! Date-partitioned index routing.

use crate::errors::IngestError;

/// Computes the destination index partition for one record.
///
/// The partition is `{base}-{YYYY-MM-DD}` where the date is the calendar
/// date portion of the record's own event time, so records in one object may
/// fan out across partitions. Pure function.
pub fn partition_index(base: &str, event_time: &str) -> Result<String, IngestError> {
    let (date, _) = event_time.split_once('T').ok_or_else(|| {
        IngestError::MalformedRecord(format!("event time is not ISO-8601: {:?}", event_time))
    })?;
    Ok(format!("{}-{}", base, date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_calendar_date() {
        assert_eq!(
            partition_index("cloudtrail", "2023-04-01T10:00:00Z").unwrap(),
            "cloudtrail-2023-04-01"
        );
    }

    #[test]
    fn is_deterministic_across_times_on_the_same_date() {
        let a = partition_index("cloudtrail", "2023-04-01T00:00:01Z").unwrap();
        let b = partition_index("cloudtrail", "2023-04-01T23:59:59Z").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_separator_is_malformed() {
        let err = partition_index("cloudtrail", "2023-04-01 10:00:00").unwrap_err();
        assert!(matches!(err, IngestError::MalformedRecord(_)));
    }
}
