//! HTTP-backed segmentation oracle client.
//!
//! Talks to a promptable-segmentation inference server: one POST per
//! (image, label) query, masks returned run-length encoded.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use image::{DynamicImage, GenericImageView};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::wire::RleMask;
use super::{OracleError, OracleKind, Prediction, SegmentationOracle};

/// Default inference endpoint.
const DEFAULT_ENDPOINT: &str = "http://localhost:8765";

/// Inference is slow on CPU hosts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct PredictRequest<'a> {
    /// Base64-encoded PNG of the query image.
    image: String,
    label: &'a str,
    box_threshold: f32,
    text_threshold: f32,
    model: &'static str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<WirePrediction>,
}

#[derive(Deserialize)]
struct WirePrediction {
    mask: RleMask,
    #[serde(rename = "box")]
    bbox: [f32; 4],
    #[serde(default)]
    phrase: String,
    score: f32,
}

/// Segmentation oracle backed by an HTTP inference server.
pub struct HttpOracle {
    kind: OracleKind,
    endpoint: String,
    client: Client,
}

impl HttpOracle {
    /// Create a client for `kind` at `endpoint` (default when `None`).
    pub fn new(kind: OracleKind, endpoint: Option<&str>) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            kind,
            endpoint: endpoint
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    fn encode_image(image: &DynamicImage) -> Result<String, OracleError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| OracleError::Parse(format!("cannot encode query image: {e}")))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(png))
    }
}

#[async_trait]
impl SegmentationOracle for HttpOracle {
    fn kind(&self) -> OracleKind {
        self.kind
    }

    async fn predict(
        &self,
        image: &DynamicImage,
        label: &str,
        box_threshold: f32,
        text_threshold: f32,
    ) -> Result<Vec<Prediction>, OracleError> {
        let request = PredictRequest {
            image: Self::encode_image(image)?,
            label,
            box_threshold,
            text_threshold,
            model: self.kind.as_str(),
        };
        let response = self
            .client
            .post(format!("{}/predict", self.endpoint))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OracleError::Endpoint {
                status: response.status(),
            });
        }
        let body: PredictResponse = response.json().await?;

        let (width, height) = (image.width(), image.height());
        let mut predictions = Vec::with_capacity(body.predictions.len());
        for wire in body.predictions {
            let mask = wire.mask.decode()?;
            if (mask.width(), mask.height()) != (width, height) {
                warn!(
                    "skipping prediction with a {}x{} mask for a {}x{} image",
                    mask.width(),
                    mask.height(),
                    width,
                    height
                );
                continue;
            }
            predictions.push(Prediction {
                mask,
                bbox: wire.bbox,
                phrase: wire.phrase,
                score: wire.score,
            });
        }
        debug!(
            "oracle returned {} instances for label {:?}",
            predictions.len(),
            label
        );
        Ok(predictions)
    }
}
