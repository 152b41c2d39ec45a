//! Per-object ingestion driver.
//!
//! One run per delivered object: download to a scoped temp file, decompress
//! and frame the envelope, then route every extracted record through
//! normalize, partition, deliver, strictly one record at a time and in order.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::IndexerConfig;
use crate::envelope::{self, Extraction};
use crate::es::{Authenticator, DeliveryOutcome, EsClient};
use crate::normalize::{self, Normalized, EVENT_TIME_FIELD};
use crate::routing;

/// Outcome of one pipeline run over a single object.
#[derive(Debug)]
pub enum ObjectOutcome {
    /// The object held the expected envelope and its records were processed.
    Processed(ObjectSummary),
    /// Well-formed object without a records envelope; nothing was done.
    NotApplicable,
}

/// Per-object counts, emitted as the summary log line.
#[derive(Debug, Default, Serialize)]
pub struct ObjectSummary {
    pub records: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub malformed: usize,
    pub exhausted: usize,
}

pub struct Pipeline {
    s3: aws_sdk_s3::Client,
    es: EsClient,
    config: IndexerConfig,
}

impl Pipeline {
    pub fn new(
        s3: aws_sdk_s3::Client,
        config: IndexerConfig,
        auth: Authenticator,
    ) -> Result<Pipeline> {
        let es = EsClient::new(&config.endpoint, auth)?;
        Ok(Pipeline { s3, es, config })
    }

    /// Runs the whole pipeline for one delivered object.
    ///
    /// Format failures abort just this object. Per-record faults are logged,
    /// counted, and skipped; one bad record never blocks its siblings.
    pub async fn process_object(&self, bucket: &str, key: &str) -> Result<ObjectOutcome> {
        debug!("downloading s3://{}/{}", bucket, key);
        let obj = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("Error downloading {} from S3: {}", key, e);
                e
            })?;

        // Spooled to a temp file owned by this run; deleted on drop on every
        // exit path.
        let spool = tempfile::NamedTempFile::new()?;
        let body = obj
            .body
            .collect()
            .await
            .context("failed reading object body")?;
        std::fs::write(spool.path(), body.into_bytes())?;

        let file = tokio::fs::File::open(spool.path()).await?;
        let doc = envelope::read_envelope(tokio::io::BufReader::new(file)).await?;

        let records = match envelope::extract_records(doc) {
            Extraction::Records(records) => records,
            Extraction::NotApplicable => {
                debug!("no records envelope in {}, skipping", key);
                return Ok(ObjectOutcome::NotApplicable);
            }
        };

        let summary = deliver_records(&self.es, &self.config, records).await;
        info!("{} events in {}", summary.records, key);
        let log = json!({
            "service": "cloudtrail_indexer",
            "key": key,
            "summary": summary,
        });
        info!("{}", serde_json::to_string(&log).unwrap_or_default());

        Ok(ObjectOutcome::Processed(summary))
    }
}

/// Routes extracted records through normalize, partition, deliver.
///
/// In dry-run mode every step runs except the network write itself.
pub async fn deliver_records(
    es: &EsClient,
    config: &IndexerConfig,
    records: Vec<Value>,
) -> ObjectSummary {
    let mut summary = ObjectSummary {
        records: records.len(),
        ..ObjectSummary::default()
    };

    for record in records {
        let fields = match normalize::normalize_record(record, &config.filter) {
            Ok(Normalized::Record(fields)) => fields,
            Ok(Normalized::Dropped) => {
                summary.dropped += 1;
                continue;
            }
            Err(err) => {
                warn!("skipping record: {}", err);
                summary.malformed += 1;
                continue;
            }
        };

        // Normalization guarantees the event time is present as a string.
        let event_time = fields
            .get(EVENT_TIME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let index = match routing::partition_index(&config.index_name, event_time) {
            Ok(index) => index,
            Err(err) => {
                warn!("skipping record: {}", err);
                summary.malformed += 1;
                continue;
            }
        };

        let payload = serde_json::to_vec(&Value::Object(fields)).unwrap();
        if config.dry_run {
            debug!("dry-run: would index one record into {}", index);
            continue;
        }

        match es.index_doc(&index, &payload).await {
            DeliveryOutcome::Delivered => summary.delivered += 1,
            DeliveryOutcome::Exhausted => summary.exhausted += 1,
        }
    }

    summary
}
