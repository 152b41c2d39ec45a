use anyhow::Result;
use async_once::AsyncOnce;
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use lazy_static::lazy_static;
use log::{debug, info};

use shared::config::IndexerConfig;
use shared::es::Authenticator;
use shared::pipeline::Pipeline;
use shared::setup_logging;

lazy_static! {
    static ref AWS_CONFIG: AsyncOnce<aws_config::SdkConfig> =
        AsyncOnce::new(async { aws_config::load_from_env().await });
    static ref S3_CLIENT: AsyncOnce<aws_sdk_s3::Client> =
        AsyncOnce::new(async { aws_sdk_s3::Client::new(AWS_CONFIG.get().await) });
    static ref INDEXER_CONFIG: (IndexerConfig, Authenticator) =
        IndexerConfig::from_env().expect("invalid indexer configuration");
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    setup_logging();

    let func = service_fn(handler);
    run(func).await?;

    Ok(())
}

async fn handler(event: LambdaEvent<S3Event>) -> Result<()> {
    debug!("{:?}", event);

    let record = match event.payload.records.into_iter().next() {
        Some(record) => record,
        None => {
            info!("Empty event, returning...");
            return Ok(());
        }
    };

    // todo: handle keys S3 urlencodes (spaces arrive as `+`)
    let (bucket, key) = match (record.s3.bucket.name, record.s3.object.key) {
        (Some(bucket), Some(key)) => (bucket, key),
        _ => {
            info!("Event without bucket or key, nothing to do");
            return Ok(());
        }
    };

    let s3 = S3_CLIENT.get().await;
    let (config, auth) = INDEXER_CONFIG.clone();
    let pipeline = Pipeline::new(s3.clone(), config, auth)?;
    pipeline.process_object(&bucket, &key).await?;

    Ok(())
}
