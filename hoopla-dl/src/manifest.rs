use crate::{Error, Result, utils};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Raw manifest as fetched, kept next to the parsed protection info.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub url: String,
    pub media_key: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip)]
    pub xml: String,
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, media_key: &str) -> Result<ManifestDocument>;
}

/// Fetches `Manifest.mpd` from the streaming cdn.
pub struct HttpManifestSource {
    client: Client,
    template: String,
}

impl HttpManifestSource {
    pub fn new(client: Client, template: impl Into<String>) -> Self {
        Self {
            client,
            template: template.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, media_key: &str) -> Result<ManifestDocument> {
        let url = utils::fill_template(&self.template, &[("media_key", media_key)])
            .map_err(Error::NetworkFailure)?;

        // The cdn is public, the patron token is not sent there.
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|x| x.error_for_status())
            .map_err(Error::from_reqwest)?;

        let xml = response.text().await.map_err(Error::from_reqwest)?;

        if xml.trim().is_empty() {
            return Err(Error::EmptyResponse(url.to_string()));
        }

        Ok(ManifestDocument {
            url: url.to_string(),
            media_key: media_key.to_owned(),
            fetched_at: Utc::now(),
            xml,
        })
    }
}
