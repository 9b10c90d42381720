//! tikwm.com resolution strategy
//!
//! Queries the tikwm JSON API, which returns watermark-free `play` and
//! `hdplay` links alongside the watermarked `wmplay` link.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{DownloadProvider, MediaCandidate};
use crate::errors::JobError;

#[derive(Debug, Deserialize)]
struct TikwmResponse {
    code: i32,
    #[serde(default)]
    msg: String,
    data: Option<TikwmData>,
}

#[derive(Debug, Deserialize)]
struct TikwmData {
    play: Option<String>,
    hdplay: Option<String>,
    wmplay: Option<String>,
}

pub struct TikwmProvider {
    client: Client,
    api_base: String,
}

impl TikwmProvider {
    pub fn new(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }
}

#[async_trait]
impl DownloadProvider for TikwmProvider {
    fn name(&self) -> &'static str {
        "tikwm"
    }

    async fn resolve(&self, source_url: &str) -> Result<MediaCandidate, JobError> {
        let response = self
            .client
            .get(format!("{}/?url={}&hd=1", self.api_base, source_url))
            .send()
            .await
            .map_err(|e| JobError::download(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(JobError::download(format!(
                "endpoint returned HTTP {}",
                response.status()
            )));
        }

        let parsed: TikwmResponse = response
            .json()
            .await
            .map_err(|e| JobError::download(format!("malformed response: {e}")))?;

        if parsed.code != 0 {
            return Err(JobError::download(format!(
                "resolution rejected (code {}): {}",
                parsed.code, parsed.msg
            )));
        }

        let data = parsed
            .data
            .ok_or_else(|| JobError::download("response contained no data".to_string()))?;

        let mut candidates = Vec::new();
        if let Some(url) = data.hdplay {
            candidates.push(MediaCandidate {
                direct_url: url,
                no_watermark: true,
                hd: true,
            });
        }
        if let Some(url) = data.play {
            candidates.push(MediaCandidate {
                direct_url: url,
                no_watermark: true,
                hd: false,
            });
        }
        if let Some(url) = data.wmplay {
            candidates.push(MediaCandidate {
                direct_url: url,
                no_watermark: false,
                hd: false,
            });
        }

        MediaCandidate::pick_best(candidates)
            .ok_or_else(|| JobError::download("no media URL in response".to_string()))
    }
}
