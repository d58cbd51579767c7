//! Listing fetched from a JSON endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{SourceAdapter, SourceItem};
use crate::error::{Result, SweepError};

#[derive(Debug, Clone, Deserialize)]
pub struct HttpJsonOptions {
    /// Listing endpoint.
    pub url: String,

    /// JSON pointer to the array of entries (default: the document root).
    #[serde(default)]
    pub items_pointer: Option<String>,

    #[serde(default = "default_name_field")]
    pub name_field: String,

    #[serde(default = "default_url_field")]
    pub url_field: String,
}

fn default_name_field() -> String {
    "id".to_string()
}

fn default_url_field() -> String {
    "url".to_string()
}

pub struct HttpJsonSource {
    client: reqwest::Client,
    options: HttpJsonOptions,
    auth: Option<(String, Option<String>)>,
}

impl HttpJsonSource {
    pub fn new(
        client: reqwest::Client,
        options: HttpJsonOptions,
        auth: Option<(String, Option<String>)>,
    ) -> Self {
        Self {
            client,
            options,
            auth,
        }
    }

    fn entries<'a>(&self, document: &'a Value) -> Result<Vec<&'a Value>> {
        let node = match &self.options.items_pointer {
            Some(pointer) => document.pointer(pointer).ok_or_else(|| {
                SweepError::Config(format!("listing has nothing at pointer '{}'", pointer))
            })?,
            None => document,
        };
        match node {
            Value::Array(items) => Ok(items.iter().collect()),
            // A single entry is not wrapped in an array by some listings
            Value::Object(_) => Ok(vec![node]),
            other => Err(SweepError::Config(format!(
                "listing entries must be an array, got {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl SourceAdapter for HttpJsonSource {
    fn name(&self) -> &str {
        "http_json"
    }

    async fn list(&self) -> Result<Vec<SourceItem>> {
        let mut request = self.client.get(&self.options.url);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, password.as_ref());
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SweepError::Status {
                url: self.options.url.clone(),
                status: status.as_u16(),
            });
        }
        let document: Value = response.json().await?;

        let mut items = Vec::new();
        for entry in self.entries(&document)? {
            let name = entry.get(&self.options.name_field).and_then(Value::as_str);
            let url = entry.get(&self.options.url_field).and_then(Value::as_str);
            match (name, url) {
                (Some(name), Some(url)) => items.push(SourceItem::new(url, name)),
                _ => warn!(
                    "Listing entry without '{}'/'{}': {}",
                    self.options.name_field, self.options.url_field, entry
                ),
            }
        }
        debug!("{} listed {} items", self.options.url, items.len());
        Ok(items)
    }
}
