//! A simplified S3 client that stores and retrieves data files.
//! It attempts to hide the complexities of working with the AWS SDK for S3.

use crate::cli::CommandLineArgs;
use crate::error::ChannelStatsError;
use crate::object_store::{ObjectStore, StoredObject};
use crate::resource_manager::ResourceManager;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use bytes::Bytes;
use tracing::Instrument;
use url::Url;

#[derive(Clone, Eq, Hash, PartialEq)]
pub enum S3Credentials {
    AccessKey {
        access_key: String,
        secret_key: String,
    },
    None,
}

impl S3Credentials {
    /// Create an access key credential.
    pub fn access_key(access_key: &str, secret_key: &str) -> Self {
        S3Credentials::AccessKey {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Returns access key credentials if both keys are provided, and no credentials otherwise.
    pub fn from_keys(access_key: Option<&str>, secret_key: Option<&str>) -> Self {
        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Self::access_key(access_key, secret_key),
            _ => Self::None,
        }
    }
}

/// S3 client object bound to the bucket holding data files.
#[derive(Clone)]
pub struct S3Client {
    /// Underlying AWS SDK S3 client object.
    client: Client,
    /// Name of the bucket
    bucket: String,
}

impl S3Client {
    /// Creates an S3Client object
    ///
    /// # Arguments
    ///
    /// * `url`: Object storage API URL
    /// * `credentials`: Object storage account credentials
    /// * `region`: Object storage region
    /// * `bucket`: Name of the bucket holding data files
    pub fn new(url: &Url, credentials: S3Credentials, region: &str, bucket: &str) -> Self {
        let region = Region::new(region.to_string());
        let builder = aws_sdk_s3::Config::builder().behavior_version(BehaviorVersion::latest());
        let builder = match credentials {
            S3Credentials::AccessKey {
                access_key,
                secret_key,
            } => {
                let credentials = Credentials::from_keys(access_key, secret_key, None);
                builder.credentials_provider(credentials)
            }
            S3Credentials::None => builder,
        };
        let s3_config = builder
            .region(Some(region))
            .endpoint_url(url.to_string())
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Creates an S3Client object from command line arguments.
    pub fn from_args(args: &CommandLineArgs) -> Self {
        let credentials = S3Credentials::from_keys(
            args.s3_access_key.as_deref(),
            args.s3_secret_key.as_deref(),
        );
        tracing::info!(
            "Using S3 bucket {} at {}",
            args.s3_bucket,
            args.s3_endpoint
        );
        Self::new(
            &args.s3_endpoint,
            credentials,
            &args.s3_region,
            &args.s3_bucket,
        )
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn exists(&self, key: &str) -> Result<bool, ChannelStatsError> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .instrument(tracing::Span::current())
            .await;
        match response {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_error)) if service_error.err().is_not_found() => {
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get<'a>(
        &self,
        key: &str,
        resource_manager: &'a ResourceManager,
    ) -> Result<Option<StoredObject<'a>>, ChannelStatsError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .instrument(tracing::Span::current())
            .await;
        let mut response = match response {
            Ok(response) => response,
            Err(SdkError::ServiceError(service_error))
                if service_error.err().is_no_such_key() =>
            {
                return Ok(None)
            }
            Err(err) => return Err(err.into()),
        };
        // Fail if the content length header is missing.
        let content_length: usize = response
            .content_length()
            .ok_or(ChannelStatsError::S3ContentLengthMissing)?
            .try_into()?;

        // Reserve memory before reading the body.
        let memory_permit = resource_manager.memory(content_length).await?;

        let mut buf = Vec::with_capacity(content_length);
        while let Some(bytes) = response
            .body
            .try_next()
            .instrument(tracing::Span::current())
            .await?
        {
            buf.extend_from_slice(&bytes)
        }
        Ok(Some(StoredObject {
            data: buf.into(),
            memory_permit,
        }))
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ChannelStatsError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .instrument(tracing::Span::current())
            .await?;
        Ok(())
    }
}
