//! Per-record field transforms and filter predicates.

use std::collections::HashSet;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::errors::IngestError;

const VERSION_MARKER_FIELD: &str = "apiVersion";
const EVENT_SOURCE_FIELD: &str = "eventSource";
const EVENT_NAME_FIELD: &str = "eventName";
const TIMESTAMP_FIELD: &str = "@timestamp";
pub const EVENT_TIME_FIELD: &str = "eventTime";

/// Event sources and event names excluded from indexing.
///
/// Sources are matched against the truncated value, so filtering `dynamodb`
/// drops records whose original source was `dynamodb.amazonaws.com`.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    sources: HashSet<String>,
    names: HashSet<String>,
}

impl FilterPolicy {
    pub fn new<I, J, S, T>(sources: I, names: J) -> FilterPolicy
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        FilterPolicy {
            sources: sources.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn excludes(&self, source: &str, name: Option<&str>) -> bool {
        self.sources.contains(source) || name.map_or(false, |n| self.names.contains(n))
    }
}

/// A record ready for routing and delivery, or the marker that the filter
/// policy dropped it.
#[derive(Debug)]
pub enum Normalized {
    Record(Map<String, Value>),
    Dropped,
}

/// Applies the per-record transforms, then the filter policy.
///
/// In order: remove the api version marker, copy the event time under the
/// standard timestamp key, truncate the event source to its leading segment
/// (`lambda.amazonaws.com` becomes `lambda`), then evaluate the filter
/// against the truncated source and the event name. Consumes the record and
/// returns a new one; the input is never shared.
pub fn normalize_record(record: Value, policy: &FilterPolicy) -> Result<Normalized> {
    let mut fields = match record {
        Value::Object(fields) => fields,
        other => {
            return Err(
                IngestError::MalformedRecord(format!("expected an object, got: {}", other)).into(),
            )
        }
    };

    fields.remove(VERSION_MARKER_FIELD);

    let event_time = field_str(&fields, EVENT_TIME_FIELD)?.to_string();
    fields.insert(TIMESTAMP_FIELD.to_string(), Value::String(event_time));

    let truncated = field_str(&fields, EVENT_SOURCE_FIELD)?
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string();
    fields.insert(
        EVENT_SOURCE_FIELD.to_string(),
        Value::String(truncated.clone()),
    );

    let name = fields.get(EVENT_NAME_FIELD).and_then(Value::as_str);
    if policy.excludes(&truncated, name) {
        return Ok(Normalized::Dropped);
    }

    Ok(Normalized::Record(fields))
}

fn field_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a str, IngestError> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::MalformedRecord(format!("missing required field: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unwrap_record(normalized: Normalized) -> Map<String, Value> {
        match normalized {
            Normalized::Record(fields) => fields,
            Normalized::Dropped => panic!("record was dropped"),
        }
    }

    #[test]
    fn applies_all_transforms() {
        let record = json!({
            "eventTime": "2023-04-01T10:00:00Z",
            "eventSource": "lambda.aws.amazon.com",
            "eventName": "Invoke",
            "apiVersion": "2015",
        });
        let fields = unwrap_record(normalize_record(record, &FilterPolicy::default()).unwrap());

        assert_eq!(fields["eventTime"], "2023-04-01T10:00:00Z");
        assert_eq!(fields["@timestamp"], "2023-04-01T10:00:00Z");
        assert_eq!(fields["eventSource"], "lambda");
        assert_eq!(fields["eventName"], "Invoke");
        assert!(!fields.contains_key("apiVersion"));
    }

    #[test]
    fn is_idempotent_on_normalized_input() {
        let record = json!({
            "eventTime": "2023-04-01T10:00:00Z",
            "eventSource": "lambda",
            "eventName": "Invoke",
            "@timestamp": "2023-04-01T10:00:00Z",
        });
        let fields =
            unwrap_record(normalize_record(record.clone(), &FilterPolicy::default()).unwrap());
        assert_eq!(Value::Object(fields), record);
    }

    #[test]
    fn drops_filtered_source_after_truncation() {
        let policy = FilterPolicy::new(["sns"], Vec::<String>::new());
        let record = json!({
            "eventTime": "2023-04-01T10:00:00Z",
            "eventSource": "sns.amazonaws.com",
            "eventName": "Publish",
        });
        assert!(matches!(
            normalize_record(record, &policy).unwrap(),
            Normalized::Dropped
        ));
    }

    #[test]
    fn drops_filtered_event_name() {
        let policy = FilterPolicy::new(Vec::<String>::new(), ["DescribeInstanceHealth"]);
        let record = json!({
            "eventTime": "2023-04-01T10:00:00Z",
            "eventSource": "elasticloadbalancing.amazonaws.com",
            "eventName": "DescribeInstanceHealth",
        });
        assert!(matches!(
            normalize_record(record, &policy).unwrap(),
            Normalized::Dropped
        ));
    }

    #[test]
    fn missing_event_source_is_malformed() {
        let record = json!({"eventTime": "2023-04-01T10:00:00Z", "eventName": "Invoke"});
        let err = normalize_record(record, &FilterPolicy::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::MalformedRecord(_))
        ));
    }

    #[test]
    fn missing_event_time_is_malformed() {
        let record = json!({"eventSource": "s3.amazonaws.com", "eventName": "PutObject"});
        let err = normalize_record(record, &FilterPolicy::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::MalformedRecord(_))
        ));
    }

    #[test]
    fn non_object_record_is_malformed() {
        let err = normalize_record(json!("just a string"), &FilterPolicy::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::MalformedRecord(_))
        ));
    }

    #[test]
    fn record_without_event_name_is_never_name_filtered() {
        let policy = FilterPolicy::new(Vec::<String>::new(), ["Invoke"]);
        let record = json!({
            "eventTime": "2023-04-01T10:00:00Z",
            "eventSource": "lambda.amazonaws.com",
        });
        assert!(matches!(
            normalize_record(record, &policy).unwrap(),
            Normalized::Record(_)
        ));
    }
}
