//! Object storage destination.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::info;

use super::{Destination, PushReceipt, PushRequest};
use crate::config::Secrets;
use crate::error::{Result, SweepError};

#[derive(Debug, Clone, Deserialize)]
pub struct S3Options {
    pub bucket: String,

    /// Key prefix, without leading slash.
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint (MinIO, Scaleway, ...). Default: AWS.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Secret keys holding static credentials. Without them the default
    /// AWS provider chain is used.
    #[serde(default)]
    pub access_key_secret: Option<String>,
    #[serde(default)]
    pub secret_key_secret: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

pub struct S3Gateway {
    options: S3Options,
    credentials: Option<Credentials>,
    client: OnceCell<Client>,
}

impl S3Gateway {
    pub fn new(options: S3Options, secrets: &Secrets) -> Result<Self> {
        if let Some(prefix) = &options.prefix {
            validate_key(prefix)?;
        }

        let credentials = match (&options.access_key_secret, &options.secret_key_secret) {
            (Some(access), Some(secret)) => Some(Credentials::new(
                secrets.require(access)?,
                secrets.require(secret)?,
                None,
                None,
                "sweeper_static",
            )),
            (None, None) => None,
            _ => {
                return Err(SweepError::Config(
                    "s3: access_key_secret and secret_key_secret go together".into(),
                ))
            }
        };

        Ok(Self {
            options,
            credentials,
            client: OnceCell::new(),
        })
    }

    /// Client is built on first use so configuration checks stay offline.
    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.options.region.clone()));
                if let Some(credentials) = &self.credentials {
                    loader = loader.credentials_provider(credentials.clone());
                }
                if let Some(endpoint) = &self.options.endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared = loader.load().await;
                let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                    .force_path_style(self.options.endpoint.is_some())
                    .build();
                Client::from_conf(s3_config)
            })
            .await
    }

    fn object_key(&self, name: &str) -> Result<String> {
        let key = match &self.options.prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), name)
            }
            _ => name.to_string(),
        };
        validate_key(&key)?;
        Ok(key)
    }
}

#[async_trait]
impl Destination for S3Gateway {
    fn name(&self) -> &str {
        "s3"
    }

    async fn push(&self, request: &PushRequest<'_>) -> Result<PushReceipt> {
        let key = self.object_key(&request.resource.name)?;
        info!("Uploading {} to s3://{}/{}...", request.resource.name, self.options.bucket, key);

        let body = ByteStream::from_path(request.path)
            .await
            .map_err(|e| SweepError::S3(format!("read {:?}: {}", request.path, e)))?;

        let output = self
            .client()
            .await
            .put_object()
            .bucket(&self.options.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| SweepError::S3(format!("put_object {}: {}", key, e)))?;

        Ok(PushReceipt {
            destination: self.name().to_string(),
            descriptor: json!({
                "bucket": self.options.bucket,
                "key": key,
                "etag": output.e_tag(),
            }),
        })
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(SweepError::S3("object key is empty".to_string()));
    }
    if key.starts_with('/') {
        return Err(SweepError::S3(format!("object key '{}' must not start with '/'", key)));
    }
    if key.split('/').any(|seg| seg == "..") {
        return Err(SweepError::S3(format!(
            "object key '{}' must not contain '..' segments",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(prefix: Option<&str>) -> S3Options {
        S3Options {
            bucket: "test-bucket".into(),
            prefix: prefix.map(str::to_string),
            region: default_region(),
            endpoint: None,
            access_key_secret: None,
            secret_key_secret: None,
        }
    }

    #[test]
    fn test_object_key() {
        let gateway = S3Gateway::new(options(Some("mydir/")), &Secrets::default()).unwrap();
        assert_eq!(gateway.object_key("test.csv").unwrap(), "mydir/test.csv");

        let bare = S3Gateway::new(options(None), &Secrets::default()).unwrap();
        assert_eq!(bare.object_key("test.csv").unwrap(), "test.csv");
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(S3Gateway::new(options(Some("/abs")), &Secrets::default()).is_err());
        assert!(S3Gateway::new(options(Some("a/../b")), &Secrets::default()).is_err());
    }

    #[test]
    fn test_static_credentials_need_both_secrets() {
        let mut opts = options(None);
        opts.access_key_secret = Some("access".into());
        assert!(matches!(
            S3Gateway::new(opts.clone(), &Secrets::default()),
            Err(SweepError::Config(_))
        ));

        opts.secret_key_secret = Some("secret".into());
        let secrets = Secrets::from_values([("access", "AKIA"), ("secret", "s3cr3t")]);
        assert!(S3Gateway::new(opts, &secrets).is_ok());
    }
}
