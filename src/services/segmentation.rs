//! Portrait segmentation.
//!
//! Cuts the person out of a photo. The model runs as a separate HTTP
//! service taking `{"images": [<base64>]}` and answering
//! `{"results": [{"data": <base64 PNG with alpha>}]}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::RgbaImage;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{Error, Result};

/// Separates a person from the photo background.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Return the person as an RGBA cut-out; background pixels are transparent.
    async fn segment(&self, image: &[u8]) -> Result<RgbaImage>;
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    #[serde(default)]
    results: Vec<SegmentResult>,
}

#[derive(Debug, Deserialize)]
struct SegmentResult {
    data: String,
}

/// HTTP client for the human segmentation model service.
#[derive(Clone)]
pub struct HumanSegService {
    client: Client,
    endpoint: String,
}

impl HumanSegService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Segmenter for HumanSegService {
    async fn segment(&self, image: &[u8]) -> Result<RgbaImage> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "images": [BASE64.encode(image)] }))
            .send()
            .await
            .map_err(|e| Error::Segmentation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Segmentation(format!(
                "Service returned {}: {}",
                status, body
            )));
        }

        let parsed: SegmentResponse = response
            .json()
            .await
            .map_err(|e| Error::Segmentation(format!("Invalid response: {}", e)))?;

        let encoded = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Segmentation("Service returned no result".to_string()))?
            .data;

        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::Segmentation(format!("Invalid result encoding: {}", e)))?;

        let cutout = image::load_from_memory(&bytes)
            .map_err(|e| Error::Segmentation(format!("Undecodable result image: {}", e)))?
            .to_rgba8();

        debug!(
            width = cutout.width(),
            height = cutout.height(),
            "Segmented person"
        );
        Ok(cutout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbImage};
    use std::io::Cursor;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png(img: image::DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn service(server: &MockServer) -> HumanSegService {
        HumanSegService::new(&format!("{}/predict/humanseg", server.uri()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn test_segment_decodes_rgba_result() {
        let server = MockServer::start().await;
        let cutout = png(image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            4,
            6,
            Rgba([10, 20, 30, 0]),
        )));
        let request_image = BASE64.encode(b"photo");

        Mock::given(method("POST"))
            .and(path("/predict/humanseg"))
            .and(body_string_contains(request_image.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"results": [{"data": BASE64.encode(&cutout)}]}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let result = service(&server).segment(b"photo").await.unwrap();
        assert_eq!(result.dimensions(), (4, 6));
        assert_eq!(*result.get_pixel(0, 0), Rgba([10, 20, 30, 0]));
    }

    #[tokio::test]
    async fn test_segment_without_alpha_is_opaque() {
        let server = MockServer::start().await;
        let cutout = png(image::DynamicImage::ImageRgb8(RgbImage::new(2, 2)));

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"results": [{"data": BASE64.encode(&cutout)}]}),
            ))
            .mount(&server)
            .await;

        let result = service(&server).segment(b"photo").await.unwrap();
        assert!(result.pixels().all(|p| p[3] == 255));
    }

    #[tokio::test]
    async fn test_segment_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let err = service(&server).segment(b"photo").await.unwrap_err();
        assert!(matches!(err, Error::Segmentation(ref m) if m.contains("model crashed")));
    }

    #[tokio::test]
    async fn test_segment_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let err = service(&server).segment(b"photo").await.unwrap_err();
        assert!(matches!(err, Error::Segmentation(_)));
    }
}
