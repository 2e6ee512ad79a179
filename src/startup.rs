use crate::{
    aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config},
    backend::Backend,
    config::{BackendKind, Config},
    media::StorageDomain,
    repositories::{DynamoDbCommentRepository, DynamoDbLikeRepository, DynamoDbMemeRepository},
    storage::S3FileStorage,
};
use anyhow::Context;
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use backoff::{future::retry, ExponentialBackoffBuilder};
use std::{sync::Arc, time::Duration};

const TABLE_ACTIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates a table keyed by a single string hash key if it doesn't exist.
async fn create_dynamodb_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
    key_name: &str,
) -> anyhow::Result<()> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(key_name)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .context("Failed to build attribute definition")?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(key_name)
                .key_type(KeyType::Hash)
                .build()
                .context("Failed to build key schema")?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(DynamoSdkError::ServiceError(service_err)) if service_err.err().is_resource_in_use_exception() => {
            tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Startup: Error creating DynamoDB table '{}': {}", table_name, e);
            Err(anyhow::Error::new(e).context(format!("Startup: Failed to create DynamoDB table '{}'", table_name)))
        }
    }
}

/// Polls DescribeTable with exponential backoff until the table reports ACTIVE.
async fn wait_for_table_active(client: &DynamoDbClient, table_name: &str) -> anyhow::Result<()> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_elapsed_time(Some(TABLE_ACTIVE_TIMEOUT))
        .build();

    retry(policy, || async {
        let resp = client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow::Error::new(e)))?;
        match resp.table().and_then(|t| t.table_status()) {
            Some(TableStatus::Active) => Ok(()),
            status => {
                tracing::debug!(?status, "Startup: Waiting for table '{}'", table_name);
                Err(backoff::Error::transient(anyhow::anyhow!("table '{}' is not active yet", table_name)))
            }
        }
    })
    .await
    .context(format!("Startup: Table '{}' did not become active", table_name))
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> anyhow::Result<()> {
    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if region_str != "us-east-1" {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(S3SdkError::ServiceError(service_err))
            if service_err.err().is_bucket_already_owned_by_you() || service_err.err().is_bucket_already_exists() =>
        {
            tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Startup: Error creating S3 bucket '{}': {}", bucket_name, e);
            Err(anyhow::Error::new(e).context(format!("Startup: Failed to create S3 bucket '{}'", bucket_name)))
        }
    }
}

/// Initializes required AWS resources (three DynamoDB tables, S3 bucket).
pub async fn init_resources(db_client: &DynamoDbClient, s3_client: &S3Client, config: &Config) -> anyhow::Result<()> {
    tracing::info!("Startup: Initializing AWS resources...");
    let tables = [
        (config.memes_table.as_str(), "meme_id"),
        (config.comments_table.as_str(), "comment_id"),
        (config.likes_table.as_str(), "like_id"),
    ];
    for (table_name, key_name) in tables {
        create_dynamodb_table_if_not_exists(db_client, table_name, key_name).await?;
    }
    for (table_name, _) in tables {
        wait_for_table_active(db_client, table_name).await?;
    }
    ensure_s3_bucket_exists(s3_client, &config.meme_bucket_name, &config.aws_region).await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}

/// Builds the backend selected by `config.backend`.
pub async fn build_backend(config: &Config) -> anyhow::Result<Backend> {
    let storage_domain = StorageDomain::new(config.storage_domain.clone());

    match config.backend {
        BackendKind::Memory => {
            tracing::warn!("Startup: Using the in-memory backend, nothing survives a restart");
            let (backend, _, _) = Backend::memory(&config.storage_public_url, storage_domain);
            Ok(backend)
        }
        BackendKind::Aws => {
            let sdk_config = create_sdk_config(config).await;
            let db_client = create_dynamodb_client(&sdk_config);
            let s3_client = create_s3_client(&sdk_config);

            if config.init_resources {
                init_resources(&db_client, &s3_client, config).await?;
            }

            Ok(Backend::new(
                Arc::new(DynamoDbMemeRepository::new(db_client.clone(), config.memes_table.clone())),
                Arc::new(DynamoDbCommentRepository::new(db_client.clone(), config.comments_table.clone())),
                Arc::new(DynamoDbLikeRepository::new(db_client, config.likes_table.clone())),
                Arc::new(S3FileStorage::new(
                    s3_client,
                    config.meme_bucket_name.clone(),
                    config.storage_public_url.clone(),
                )),
                storage_domain,
            ))
        }
    }
}
