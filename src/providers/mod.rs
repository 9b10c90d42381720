//! Download provider chain
//!
//! Ordered fallback strategies that turn a source link into a direct
//! downloadable media URL. The chain tries each provider in order until
//! one succeeds; when all fail, the job fails with an aggregated
//! per-provider error summary.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::errors::JobError;

pub mod ssstik;
pub mod tikwm;

pub use ssstik::SsstikProvider;
pub use tikwm::TikwmProvider;

/// A resolved direct media URL with its quality labels.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    pub direct_url: String,
    pub no_watermark: bool,
    pub hd: bool,
}

impl MediaCandidate {
    /// Prefer a no-watermark/HD candidate when several exist, else the
    /// first one found.
    pub fn pick_best(candidates: Vec<MediaCandidate>) -> Option<MediaCandidate> {
        if candidates.is_empty() {
            return None;
        }
        candidates
            .iter()
            .find(|c| c.no_watermark && c.hd)
            .or_else(|| candidates.iter().find(|c| c.no_watermark))
            .cloned()
            .or_else(|| candidates.into_iter().next())
    }
}

/// One resolution strategy against a third-party endpoint.
#[async_trait]
pub trait DownloadProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, source_url: &str) -> Result<MediaCandidate, JobError>;
}

/// Ordered chain-of-responsibility over the configured providers.
pub struct ProviderChain {
    providers: Vec<Box<dyn DownloadProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn DownloadProvider>>) -> Self {
        Self { providers }
    }

    pub async fn resolve(&self, source_url: &str) -> Result<MediaCandidate, JobError> {
        let mut attempts = Vec::new();

        for provider in &self.providers {
            debug!(
                "Trying download provider '{}' for {}",
                provider.name(),
                source_url
            );

            match provider.resolve(source_url).await {
                Ok(candidate) => {
                    info!(
                        "Provider '{}' resolved {} (no_watermark={}, hd={})",
                        provider.name(),
                        source_url,
                        candidate.no_watermark,
                        candidate.hd
                    );
                    return Ok(candidate);
                }
                Err(e) => {
                    warn!("Provider '{}' failed: {}", provider.name(), e);
                    attempts.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        Err(JobError::provider_resolution(attempts.join("; ")))
    }
}

/// Reject payloads that are too small or that look like an HTML/error page
/// instead of binary media.
pub fn validate_media_bytes(bytes: &[u8], min_bytes: usize) -> Result<(), JobError> {
    if bytes.len() < min_bytes {
        return Err(JobError::download(format!(
            "payload too small: {} bytes (minimum {})",
            bytes.len(),
            min_bytes
        )));
    }

    let head: Vec<u8> = bytes
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take(15)
        .collect();
    let head_lower = head.to_ascii_lowercase();

    if head_lower.starts_with(b"<!doctype") || head_lower.starts_with(b"<html") {
        return Err(JobError::download(
            "payload looks like an HTML page, not media".to_string(),
        ));
    }

    Ok(())
}

/// Download the resolved media and validate the payload.
pub async fn download_media(
    client: &Client,
    candidate: &MediaCandidate,
    min_bytes: usize,
) -> Result<Vec<u8>, JobError> {
    let response = client
        .get(&candidate.direct_url)
        .send()
        .await
        .map_err(|e| JobError::download(format!("media download failed: {e}")))?;

    if !response.status().is_success() {
        return Err(JobError::download(format!(
            "media download returned HTTP {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| JobError::download(format!("media read failed: {e}")))?;

    validate_media_bytes(&bytes, min_bytes)?;

    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl DownloadProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn resolve(&self, _source_url: &str) -> Result<MediaCandidate, JobError> {
            Err(JobError::download("endpoint returned HTTP 503".to_string()))
        }
    }

    struct WorkingProvider;

    #[async_trait]
    impl DownloadProvider for WorkingProvider {
        fn name(&self) -> &'static str {
            "working"
        }

        async fn resolve(&self, _source_url: &str) -> Result<MediaCandidate, JobError> {
            Ok(MediaCandidate {
                direct_url: "https://cdn.example.com/video.mp4".to_string(),
                no_watermark: true,
                hd: false,
            })
        }
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_second_provider() {
        let chain = ProviderChain::new(vec![
            Box::new(FailingProvider),
            Box::new(WorkingProvider),
        ]);

        let candidate = chain.resolve("https://example.com/item/1").await.unwrap();
        assert_eq!(candidate.direct_url, "https://cdn.example.com/video.mp4");
    }

    #[tokio::test]
    async fn test_chain_aggregates_errors_when_all_fail() {
        let chain = ProviderChain::new(vec![
            Box::new(FailingProvider),
            Box::new(FailingProvider),
        ]);

        let err = chain
            .resolve("https://example.com/item/1")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("all download providers failed"));
        // Both attempts must appear in the summary
        assert_eq!(message.matches("failing:").count(), 2);
    }

    #[test]
    fn test_pick_best_prefers_no_watermark_hd() {
        let candidates = vec![
            MediaCandidate {
                direct_url: "a".to_string(),
                no_watermark: false,
                hd: false,
            },
            MediaCandidate {
                direct_url: "b".to_string(),
                no_watermark: true,
                hd: true,
            },
            MediaCandidate {
                direct_url: "c".to_string(),
                no_watermark: true,
                hd: false,
            },
        ];

        let best = MediaCandidate::pick_best(candidates).unwrap();
        assert_eq!(best.direct_url, "b");
    }

    #[test]
    fn test_pick_best_falls_back_to_first() {
        let candidates = vec![
            MediaCandidate {
                direct_url: "a".to_string(),
                no_watermark: false,
                hd: false,
            },
            MediaCandidate {
                direct_url: "b".to_string(),
                no_watermark: false,
                hd: true,
            },
        ];

        let best = MediaCandidate::pick_best(candidates).unwrap();
        assert_eq!(best.direct_url, "a");
    }

    #[test]
    fn test_validate_rejects_small_payload() {
        let err = validate_media_bytes(&[0u8; 16], 1024).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_validate_rejects_html_payload() {
        let mut payload = b"<!DOCTYPE html><html><body>error</body></html>".to_vec();
        payload.resize(2048, b' ');
        let err = validate_media_bytes(&payload, 1024).unwrap_err();
        assert!(err.to_string().contains("HTML"));
    }

    #[test]
    fn test_validate_accepts_binary_payload() {
        // MP4 ftyp box header followed by padding
        let mut payload = vec![0x00, 0x00, 0x00, 0x20, b'f', b't', b'y', b'p'];
        payload.resize(2048, 0xAB);
        assert!(validate_media_bytes(&payload, 1024).is_ok());
    }
}
