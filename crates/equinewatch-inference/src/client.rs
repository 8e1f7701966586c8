//! HTTP client for the external inference service (§2, §6).
//!
//! Exposes the three pure-function primitives the pipeline treats as
//! external: [`InferenceClient::detect`], [`InferenceClient::estimate_keypoints`],
//! and [`InferenceClient::embed`]. Each box/frame crosses the wire as a
//! base64-encoded PNG; failures are classified via [`InferenceError`] and
//! recovered at the frame level by the caller (§7).

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{ImageEncoder, RgbImage};
use reqwest::Client;
use tracing::{debug, warn};

use equinewatch_models::{AppearanceEmbedding, Detection, Keypoints, DEFAULT_DETECTION_THRESHOLD};

use crate::error::{InferenceError, InferenceResult};
use crate::types::{
    DetectRequest, DetectResponse, EmbedRequest, EmbedResponse, HealthResponse, KeypointRequest,
    KeypointResponse,
};

/// Configuration for the inference client.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the inference service.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Max retries for retryable errors.
    pub max_retries: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl InferenceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("INFERENCE_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("INFERENCE_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("INFERENCE_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

/// Client for the detector / keypoint estimator / appearance embedder service.
pub struct InferenceClient {
    http: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> InferenceResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(InferenceError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> InferenceResult<Self> {
        Self::new(InferenceConfig::from_env())
    }

    /// Check if the inference service is healthy.
    pub async fn health_check(&self) -> InferenceResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("inference service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("inference service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Detect objects in one frame. Used both by the main per-frame pipeline
    /// (default threshold, §3) and the snapshot path (lower threshold, §6).
    pub async fn detect(
        &self,
        frame: &RgbImage,
        confidence_threshold: f32,
    ) -> InferenceResult<Vec<Detection>> {
        let url = format!("{}/detect", self.config.base_url);
        let request = DetectRequest {
            image_png_base64: encode_png(frame)?,
            confidence_threshold,
        };

        debug!("sending detect request to {}", url);

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(InferenceError::Network)
            })
            .await?;

        let body: DetectResponse = check_status_and_decode(response).await?;
        Ok(body.detections.into_iter().map(|d| d.into_detection()).collect())
    }

    /// Detect objects at the default per-frame confidence threshold (§3).
    pub async fn detect_default(&self, frame: &RgbImage) -> InferenceResult<Vec<Detection>> {
        self.detect(frame, DEFAULT_DETECTION_THRESHOLD).await
    }

    /// Estimate keypoints for one cropped box. Returns `None` if the crop is
    /// degenerate and the estimator declines to produce a result (§4.2).
    pub async fn estimate_keypoints(&self, crop: &RgbImage) -> InferenceResult<Option<Keypoints>> {
        if crop.width() == 0 || crop.height() == 0 {
            return Err(InferenceError::EmptyCrop);
        }

        let url = format!("{}/keypoints", self.config.base_url);
        let request = KeypointRequest { crop_png_base64: encode_png(crop)? };

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(InferenceError::Network)
            })
            .await?;

        let body: KeypointResponse = check_status_and_decode(response).await?;
        Ok(body.into_keypoints())
    }

    /// Compute a unit-norm appearance embedding for one cropped box. Returns
    /// `None` for an out-of-frame or otherwise empty crop, per §4.2 Failure:
    /// such a box is treated as ineligible for stage-2 appearance matching.
    pub async fn embed(&self, crop: &RgbImage) -> InferenceResult<Option<AppearanceEmbedding>> {
        if crop.width() == 0 || crop.height() == 0 {
            return Err(InferenceError::EmptyCrop);
        }

        let url = format!("{}/embed", self.config.base_url);
        let request = EmbedRequest { crop_png_base64: encode_png(crop)? };

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(InferenceError::Network)
            })
            .await?;

        let body: EmbedResponse = check_status_and_decode(response).await?;
        Ok(body.into_embedding())
    }

    /// Execute with retry logic for transient errors.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> InferenceResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = InferenceResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "inference request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(InferenceError::RequestFailed("unknown error".to_string())))
    }
}

async fn check_status_and_decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> InferenceResult<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(InferenceError::RequestFailed(format!("inference service returned {}: {}", status, body)));
    }
    Ok(response.json().await?)
}

fn encode_png(image: &RgbImage) -> InferenceResult<String> {
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(image.as_raw(), image.width(), image.height(), image::ColorType::Rgb8)
        .map_err(|e| InferenceError::InvalidResponse(format!("failed to encode crop as PNG: {e}")))?;
    Ok(BASE64.encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn encode_png_roundtrips_dimensions() {
        let image = RgbImage::new(4, 4);
        let encoded = encode_png(&image).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }
}
