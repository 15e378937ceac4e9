use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::storage::{ObjectStore, PutOptions, StorageError};

/// S3-backed object store. Credentials and region resolution follow the
/// standard SDK provider chain; a custom endpoint switches to path-style
/// addressing for S3-compatible local stores.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(bucket: &str, region: &str, endpoint_url: Option<&str>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        info!(bucket, region, "initialized object store");
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        let size = body.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body));

        if let Some(content_type) = options.content_type {
            request = request.content_type(content_type);
        }
        if let Some(content_encoding) = options.content_encoding {
            request = request.content_encoding(content_encoding);
        }
        if let Some(cache_control) = options.cache_control {
            request = request.cache_control(cache_control);
        }
        for (name, value) in options.metadata {
            request = request.metadata(name, value);
        }

        request.send().await.map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        debug!(key, size_bytes = size, "object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match response {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Read {
                        key: key.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    return Ok(None);
                }
                Err(StorageError::Read {
                    key: key.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StorageError::List {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}
