//! Process configuration.
//!
//! Built once at startup (from the environment in the Lambda, from CLI
//! arguments in the backfill driver) and passed into the pipeline and the
//! delivery client. Nothing reads configuration ambiently after startup.

use std::env;

use anyhow::{anyhow, Context, Result};

use crate::es::Authenticator;
use crate::normalize::FilterPolicy;
use crate::sigv4::SigningCredentials;

pub const DEFAULT_INDEX_NAME: &str = "cloudtrail";
pub const DEFAULT_KEY_PREFIX: &str = "AWSLogs/";

// Sources that are all chatter and no signal for most accounts. Overridden
// by FILTERED_EVENT_SOURCES; an explicitly empty value disables filtering.
const DEFAULT_FILTERED_SOURCES: &str = "athena,dynamodb,glue,sns";

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Search endpoint. A bare hostname is addressed over https.
    pub endpoint: String,
    /// Base index name; records land in `{index_name}-YYYY-MM-DD`.
    pub index_name: String,
    pub filter: FilterPolicy,
    /// Run every step except the network write.
    pub dry_run: bool,
}

impl IndexerConfig {
    /// Reads the Lambda environment. `ES_AUTH` selects the authentication
    /// mode explicitly (`basic` or `sigv4`, defaulting to `sigv4` since the
    /// Lambda runtime always carries session credentials); the mode is never
    /// inferred from which variables happen to be set.
    pub fn from_env() -> Result<(IndexerConfig, Authenticator)> {
        let endpoint = env::var("ES_HOST").context("ES_HOST is required")?;
        let index_name = env::var("ES_INDEX").unwrap_or_else(|_| DEFAULT_INDEX_NAME.to_string());

        let auth = match env::var("ES_AUTH").ok().as_deref() {
            Some("basic") => Authenticator::Basic {
                username: env::var("ES_USER").context("ES_USER is required for basic auth")?,
                password: env::var("ES_PASS").context("ES_PASS is required for basic auth")?,
            },
            Some("sigv4") | None => Authenticator::SigV4 {
                credentials: SigningCredentials {
                    access_key: env::var("AWS_ACCESS_KEY_ID")
                        .context("AWS_ACCESS_KEY_ID is required for request signing")?,
                    secret_key: env::var("AWS_SECRET_ACCESS_KEY")
                        .context("AWS_SECRET_ACCESS_KEY is required for request signing")?,
                    session_token: env::var("AWS_SESSION_TOKEN").ok(),
                },
                region: env::var("AWS_REGION").context("AWS_REGION is required for request signing")?,
            },
            Some(other) => return Err(anyhow!("unknown ES_AUTH mode: {}", other)),
        };

        let config = IndexerConfig {
            endpoint,
            index_name,
            filter: filter_from_env(),
            dry_run: false,
        };
        Ok((config, auth))
    }
}

/// Builds the filter policy from `FILTERED_EVENT_SOURCES` and
/// `FILTERED_EVENT_NAMES` (comma-separated). An unset sources variable falls
/// back to the built-in list.
pub fn filter_from_env() -> FilterPolicy {
    let sources = env::var("FILTERED_EVENT_SOURCES")
        .unwrap_or_else(|_| DEFAULT_FILTERED_SOURCES.to_string());
    let names = env::var("FILTERED_EVENT_NAMES").unwrap_or_default();
    FilterPolicy::new(split_list(&sources), split_list(&names))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
