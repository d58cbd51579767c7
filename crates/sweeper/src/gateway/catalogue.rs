//! Data-catalogue destination.
//!
//! Talks to a dataset resource API (`/api/1/datasets/<dataset>/resources/<id>/`)
//! authenticated with an `X-Api-Key` header. Two modes:
//!
//! - `upload`: replace the resource's file. Artifacts above the chunk
//!   threshold go through the chunked upload protocol (`dz*` form fields,
//!   one request per part, then a finishing request without payload).
//!   Afterwards the resource metadata is updated, but only when one of the
//!   overrides matches a field of the returned descriptor.
//! - `link`: point the resource at a public URL (e.g. the file server the
//!   artifact was just pushed to), with title, size and checksum.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Destination, PushReceipt, PushRequest};
use crate::config::Secrets;
use crate::error::{Result, SweepError};
use crate::progress::{ProgressSink, TransferProgress};

/// What a push does on the catalogue side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogueMode {
    #[default]
    Upload,
    Link,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueOptions {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub dataset_id: String,

    /// Secret key holding the API key.
    pub api_key_secret: String,

    #[serde(default)]
    pub mode: CatalogueMode,

    /// Public location of pushed files, required in link mode.
    #[serde(default)]
    pub public_url_prefix: Option<String>,

    /// Title template with `{name}`, `{stem}` and `{date}` placeholders.
    #[serde(default)]
    pub title: Option<String>,

    /// Additional metadata fields sent with every update.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

fn default_base_url() -> String {
    "https://www.data.gouv.fr".to_string()
}

pub struct CatalogueGateway {
    client: reqwest::Client,
    options: CatalogueOptions,
    api_key: String,
    chunk_threshold: u64,
    chunk_size: u64,
}

impl CatalogueGateway {
    pub fn new(
        client: reqwest::Client,
        options: CatalogueOptions,
        secrets: &Secrets,
        chunk_threshold: u64,
        chunk_size: u64,
    ) -> Result<Self> {
        if options.mode == CatalogueMode::Link && options.public_url_prefix.is_none() {
            return Err(SweepError::Config(
                "catalogue: link mode requires public_url_prefix".into(),
            ));
        }
        let api_key = secrets.require(&options.api_key_secret)?.to_string();

        Ok(Self {
            client,
            options,
            api_key,
            chunk_threshold,
            chunk_size: chunk_size.max(1),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/api/1", self.options.base_url.trim_end_matches('/'))
    }

    fn resource_url(&self, dataset_id: &str, resource_id: &str) -> String {
        format!(
            "{}/datasets/{}/resources/{}/",
            self.api_url(),
            dataset_id,
            resource_id
        )
    }

    fn upload_url(&self, dataset_id: &str, resource_id: &str) -> String {
        format!("{}upload/", self.resource_url(dataset_id, resource_id))
    }

    async fn json_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(SweepError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// PUT metadata fields on a resource.
    pub async fn update_resource(
        &self,
        dataset_id: &str,
        resource_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Value> {
        let response = self
            .client
            .put(self.resource_url(dataset_id, resource_id))
            .header("X-Api-Key", &self.api_key)
            .json(fields)
            .send()
            .await?;
        Self::json_response(response).await
    }

    /// Replace a resource's file, then apply `overrides` if any of them
    /// names a field present in the returned descriptor.
    pub async fn upload_replace_resource(
        &self,
        dataset_id: &str,
        resource_id: &str,
        path: &Path,
        overrides: &Map<String, Value>,
    ) -> Result<Value> {
        let size = tokio::fs::metadata(path).await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| resource_id.to_string());
        let url = self.upload_url(dataset_id, resource_id);

        let data = if size > self.chunk_threshold {
            self.upload_chunked(&url, path, &file_name, size).await?
        } else {
            self.upload_direct(&url, path, &file_name).await?
        };

        let Value::Object(mut data) = data else {
            return Ok(data);
        };
        if !overrides.keys().any(|k| data.contains_key(k)) {
            debug!("No metadata override applies to resource {}", resource_id);
            return Ok(Value::Object(data));
        }
        for (key, value) in overrides {
            if let Some(slot) = data.get_mut(key) {
                *slot = value.clone();
            }
        }
        self.update_resource(dataset_id, resource_id, &data).await
    }

    /// Point a resource at a remote URL.
    pub async fn remote_replace_resource(
        &self,
        dataset_id: &str,
        resource_id: &str,
        url: &str,
        title: &str,
        extra: &Map<String, Value>,
    ) -> Result<Value> {
        info!(
            "Replacing remote resource {}/datasets/{}/#resource-{}: {} | {}...",
            self.options.base_url.trim_end_matches('/'),
            dataset_id,
            resource_id,
            title,
            url
        );
        let mut fields = Map::new();
        fields.insert("title".into(), json!(title));
        fields.insert("url".into(), json!(url));
        fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.update_resource(dataset_id, resource_id, &fields).await
    }

    async fn upload_direct(&self, url: &str, path: &Path, file_name: &str) -> Result<Value> {
        let bytes = tokio::fs::read(path).await?;
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        let response = self
            .client
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::json_response(response).await
    }

    async fn upload_chunked(
        &self,
        url: &str,
        path: &Path,
        file_name: &str,
        size: u64,
    ) -> Result<Value> {
        let session = Uuid::new_v4().to_string();
        let total_parts = size.div_ceil(self.chunk_size);
        info!(
            "Chunked upload of {} ({} bytes, {} parts)",
            file_name, size, total_parts
        );

        let mut file = tokio::fs::File::open(path).await?;
        let progress = TransferProgress::new(format!("upload {}", file_name));
        let mut offset: u64 = 0;

        for index in 0..total_parts {
            let len = self.chunk_size.min(size - offset);
            let mut chunk = vec![0u8; len as usize];
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let form = Form::new()
                .text("dzuuid", session.clone())
                .text("dzchunkindex", index.to_string())
                .text("dztotalfilesize", size.to_string())
                .text("dzchunksize", len.to_string())
                .text("dztotalchunkcount", total_parts.to_string())
                .text("dzchunkbyteoffset", offset.to_string())
                .part("file", Part::bytes(chunk).file_name(file_name.to_string()));

            let ack = self.send_part(url, form).await.map_err(|e| {
                progress.finish();
                SweepError::upload(index, e.to_string())
            })?;
            if ack.get("success").and_then(Value::as_bool) != Some(true) {
                progress.finish();
                return Err(SweepError::upload(index, format!("rejected: {}", ack)));
            }

            offset += len;
            progress.update(offset, Some(size));
        }
        progress.finish();

        let form = Form::new()
            .text("dzuuid", session)
            .text("dztotalchunkcount", total_parts.to_string())
            .text("dztotalfilesize", size.to_string())
            .text("filename", file_name.to_string());
        self.send_part(url, form).await
    }

    async fn send_part(&self, url: &str, form: Form) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::json_response(response).await
    }
}

/// Fill `{name}`, `{stem}` and `{date}` in a title template.
pub fn render_title(template: &str, name: &str, date: NaiveDate) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    template
        .replace("{name}", name)
        .replace("{stem}", &stem)
        .replace("{date}", &date.format("%d %B %Y").to_string())
}

#[async_trait]
impl Destination for CatalogueGateway {
    fn name(&self) -> &str {
        "catalogue"
    }

    async fn push(&self, request: &PushRequest<'_>) -> Result<PushReceipt> {
        let name = &request.resource.name;
        let resource_id = request.remote_id.ok_or_else(|| {
            SweepError::push("catalogue", format!("no mapping entry for '{}'", name))
        })?;
        let today = chrono::Local::now().date_naive();
        let title = self
            .options
            .title
            .as_deref()
            .map(|t| render_title(t, name, today));

        let mut fields: Map<String, Value> = self
            .options
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let descriptor = match self.options.mode {
            CatalogueMode::Upload => {
                if let Some(title) = title {
                    fields.insert("title".into(), json!(title));
                }
                self.upload_replace_resource(
                    &self.options.dataset_id,
                    resource_id,
                    request.path,
                    &fields,
                )
                .await?
            }
            CatalogueMode::Link => {
                let prefix = self.options.public_url_prefix.as_deref().unwrap_or_default();
                let url = format!("{}/{}", prefix.trim_end_matches('/'), name);
                fields.insert("filesize".into(), json!(request.resource.size));
                if let Some(hash) = &request.resource.content_hash {
                    fields.insert(
                        "checksum".into(),
                        json!({ "value": hash, "type": request.checksum_type.as_str() }),
                    );
                }
                self.remote_replace_resource(
                    &self.options.dataset_id,
                    resource_id,
                    &url,
                    title.as_deref().unwrap_or(name),
                    &fields,
                )
                .await?
            }
        };

        Ok(PushReceipt {
            destination: self.name().to_string(),
            descriptor,
        })
    }
}
