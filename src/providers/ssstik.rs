//! ssstik resolution strategy
//!
//! Fallback endpoint with a different response shape: a flat list of link
//! entries labeled by quality.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{DownloadProvider, MediaCandidate};
use crate::errors::JobError;

#[derive(Debug, Deserialize)]
struct SsstikResponse {
    #[serde(default)]
    links: Vec<SsstikLink>,
}

#[derive(Debug, Deserialize)]
struct SsstikLink {
    url: String,
    #[serde(default)]
    label: String,
}

pub struct SsstikProvider {
    client: Client,
    api_base: String,
}

impl SsstikProvider {
    pub fn new(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }
}

#[async_trait]
impl DownloadProvider for SsstikProvider {
    fn name(&self) -> &'static str {
        "ssstik"
    }

    async fn resolve(&self, source_url: &str) -> Result<MediaCandidate, JobError> {
        let response = self
            .client
            .post(&self.api_base)
            .form(&[("url", source_url)])
            .send()
            .await
            .map_err(|e| JobError::download(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(JobError::download(format!(
                "endpoint returned HTTP {}",
                response.status()
            )));
        }

        let parsed: SsstikResponse = response
            .json()
            .await
            .map_err(|e| JobError::download(format!("malformed response: {e}")))?;

        let candidates: Vec<MediaCandidate> = parsed
            .links
            .into_iter()
            .map(|link| {
                let label = link.label.to_lowercase();
                MediaCandidate {
                    direct_url: link.url,
                    no_watermark: label.contains("no watermark") || label.contains("without"),
                    hd: label.contains("hd"),
                }
            })
            .collect();

        MediaCandidate::pick_best(candidates)
            .ok_or_else(|| JobError::download("no media URL in response".to_string()))
    }
}
