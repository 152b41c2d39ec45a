use anyhow::{Context, Result};
use aws_credential_types::provider::ProvideCredentials;
use clap::Parser;
use futures::StreamExt;
use log::{info, warn};

use shared::config::{filter_from_env, IndexerConfig, DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX};
use shared::errors::IngestError;
use shared::es::Authenticator;
use shared::pipeline::{ObjectOutcome, Pipeline};
use shared::setup_logging;
use shared::sigv4::SigningCredentials;

/// Replays the reactive ingest pipeline over every object under a bucket
/// prefix.
#[derive(Debug, Parser)]
#[command(name = "backfill")]
struct Args {
    /// Credential profile used for S3 access and request signing.
    #[arg(long)]
    profile: Option<String>,

    /// Bucket containing the log objects.
    #[arg(long)]
    bucket: String,

    /// Key prefix to enumerate.
    #[arg(long, default_value = DEFAULT_KEY_PREFIX)]
    prefix: String,

    /// Stop after this many objects carried a records envelope. Objects
    /// without one are scanned but never counted against the limit.
    #[arg(long)]
    limit: Option<usize>,

    /// Parse and transform objects, but skip the write to the index.
    #[arg(long)]
    dryrun: bool,

    /// Search endpoint host.
    #[arg(long)]
    endpoint: String,

    /// AWS region used for request signing.
    #[arg(long)]
    region: Option<String>,

    /// Base index name; records land in `{indexname}-YYYY-MM-DD`.
    #[arg(long, default_value = DEFAULT_INDEX_NAME)]
    indexname: String,

    /// Basic-auth username; selects basic auth instead of request signing.
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Basic-auth password.
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let args = Args::parse();

    if let Some(profile) = &args.profile {
        std::env::set_var("AWS_PROFILE", profile);
    }
    let aws_config = aws_config::load_from_env().await;
    let s3 = aws_sdk_s3::Client::new(&aws_config);

    let auth = build_authenticator(&args, &aws_config).await?;

    if args.dryrun {
        info!("Dry Run");
    }

    let config = IndexerConfig {
        endpoint: args.endpoint.clone(),
        index_name: args.indexname.clone(),
        filter: filter_from_env(),
        dry_run: args.dryrun,
    };
    let pipeline = Pipeline::new(s3.clone(), config, auth)?;

    let mut matched = 0usize;
    let mut pages = Box::pin(
        s3.list_objects_v2()
            .bucket(&args.bucket)
            .prefix(&args.prefix)
            .into_paginator()
            .send(),
    );

    'pages: while let Some(page) = pages.next().await {
        let page = page.context("listing objects failed")?;
        for object in page.contents.unwrap_or_default() {
            let key = match object.key {
                Some(key) => key,
                None => continue,
            };

            match pipeline.process_object(&args.bucket, &key).await {
                Ok(ObjectOutcome::Processed(_)) => {
                    matched += 1;
                    if args.limit.map_or(false, |limit| matched >= limit) {
                        info!("Completed {} objects. Done.", matched);
                        break 'pages;
                    }
                }
                Ok(ObjectOutcome::NotApplicable) => {}
                Err(err) => {
                    // A malformed object aborts only itself; anything else
                    // (S3 down, endpoint unreachable at build time) fails the
                    // whole run loudly.
                    if err.downcast_ref::<IngestError>().is_some() {
                        warn!("skipping {}: {}", key, err);
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }

    info!(
        "Processed {} matching objects under s3://{}/{}",
        matched, args.bucket, args.prefix
    );
    Ok(())
}

/// Basic auth when a username is given, request signing from the session
/// credentials otherwise.
async fn build_authenticator(
    args: &Args,
    aws_config: &aws_config::SdkConfig,
) -> Result<Authenticator> {
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        return Ok(Authenticator::Basic {
            username: username.clone(),
            password: password.clone(),
        });
    }

    let region = args
        .region
        .clone()
        .or_else(|| aws_config.region().map(|r| r.to_string()))
        .context("--region is required for request signing")?;
    let provider = aws_config
        .credentials_provider()
        .context("no credentials available for request signing")?;
    let creds = provider.provide_credentials().await?;

    Ok(Authenticator::SigV4 {
        credentials: SigningCredentials {
            access_key: creds.access_key_id().to_string(),
            secret_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
        },
        region,
    })
}
