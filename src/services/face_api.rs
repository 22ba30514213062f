//! Face-merge API client.
//!
//! Swaps the face from one photo onto the face in a template photo using the
//! Face++ HTTP API:
//! - `POST {base}/facepp/v3/detect` (multipart) locates the face rectangle
//! - `POST {base}/imagepp/v1/mergeface` (form) blends the faces
//!
//! Both calls are made once; there is no retry or fallback.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::FaceApiConfig;
use crate::models::FaceRectangle;
use crate::{Error, Result};

/// Merges the face of one image onto the face of a template image.
#[async_trait]
pub trait FaceMerger: Send + Sync {
    /// Put the face found in `extract` onto the face found in `template`.
    ///
    /// `rate` is the blend strength (0-100). Returns the encoded result image.
    async fn merge_face(&self, template: &[u8], extract: &[u8], rate: u8) -> Result<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectedFace {
    face_rectangle: FaceRectangle,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    result: Option<String>,
    error_message: Option<String>,
}

/// Face++ implementation of [`FaceMerger`].
#[derive(Clone)]
pub struct FacePlusPlus {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl FacePlusPlus {
    /// Create a new client.
    pub fn new(config: &FaceApiConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Detect the first face in an image.
    pub async fn detect(&self, image: &[u8]) -> Result<FaceRectangle> {
        let url = format!("{}/facepp/v3/detect", self.base_url);

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("api_secret", self.api_secret.clone())
            .text("return_landmark", "1")
            .part("image_file", Part::bytes(image.to_vec()).file_name("image"));

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::FaceApi(format!("Detect request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::FaceApi(format!("Failed to read detect response: {}", e)))?;

        let parsed: DetectResponse = serde_json::from_str(&text).map_err(|_| {
            Error::FaceApi(format!("Detect returned {}: {}", status, text))
        })?;

        if let Some(message) = parsed.error_message {
            return Err(Error::FaceApi(format!("Detect failed: {}", message)));
        }
        if !status.is_success() {
            return Err(Error::FaceApi(format!("Detect returned {}", status)));
        }

        let face = parsed
            .faces
            .into_iter()
            .next()
            .ok_or_else(|| Error::FaceApi("No face detected in image".to_string()))?;

        debug!(rectangle = %face.face_rectangle.to_param(), "Detected face");
        Ok(face.face_rectangle)
    }
}

#[async_trait]
impl FaceMerger for FacePlusPlus {
    async fn merge_face(&self, template: &[u8], extract: &[u8], rate: u8) -> Result<Vec<u8>> {
        let template_rect = self.detect(template).await?;
        let extract_rect = self.detect(extract).await?;

        let url = format!("{}/imagepp/v1/mergeface", self.base_url);
        let params = [
            ("api_key", self.api_key.clone()),
            ("api_secret", self.api_secret.clone()),
            ("template_base64", BASE64.encode(template)),
            ("template_rectangle", template_rect.to_param()),
            ("merge_base64", BASE64.encode(extract)),
            ("merge_rectangle", extract_rect.to_param()),
            ("merge_rate", rate.min(100).to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::FaceApi(format!("Merge request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::FaceApi(format!("Failed to read merge response: {}", e)))?;

        let parsed: MergeResponse = serde_json::from_str(&text)
            .map_err(|_| Error::FaceApi(format!("Merge returned {}: {}", status, text)))?;

        if let Some(message) = parsed.error_message {
            return Err(Error::FaceApi(format!("Merge failed: {}", message)));
        }
        if !status.is_success() {
            return Err(Error::FaceApi(format!("Merge returned {}", status)));
        }

        let encoded = parsed
            .result
            .ok_or_else(|| Error::FaceApi("Merge response has no result".to_string()))?;

        BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::FaceApi(format!("Invalid merge result encoding: {}", e)))
    }
}
