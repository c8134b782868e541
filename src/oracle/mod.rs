//! Promptable segmentation oracle abstraction.
//!
//! The oracle accepts an image and a text label and proposes instance masks
//! with boxes, phrases, and scores. Concrete implementations are selected at
//! construction time; the rest of the pipeline only sees the trait.

mod http;
mod wire;

pub use http::HttpOracle;
pub use wire::RleMask;

use async_trait::async_trait;
use image::DynamicImage;
use thiserror::Error;

use crate::models::BitMask;

/// Errors from oracle queries.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("oracle endpoint returned {status}")]
    Endpoint { status: reqwest::StatusCode },

    #[error("malformed oracle response: {0}")]
    Parse(String),
}

/// One instance proposed by the oracle for a label query.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub mask: BitMask,
    /// Bounding box as `[x0, y0, x1, y1]` in pixels.
    pub bbox: [f32; 4],
    pub phrase: String,
    pub score: f32,
}

/// Available oracle model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleKind {
    /// Largest backbone; accurate but memory hungry.
    VitH,
    VitL,
    VitB,
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleKind::VitH => "vit_h",
            OracleKind::VitL => "vit_l",
            OracleKind::VitB => "vit_b",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vit_h" => Some(OracleKind::VitH),
            "vit_l" => Some(OracleKind::VitL),
            "vit_b" => Some(OracleKind::VitB),
            _ => None,
        }
    }
}

impl std::fmt::Display for OracleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for promptable segmentation oracles.
#[async_trait]
pub trait SegmentationOracle: Send + Sync {
    /// Model variant behind this oracle.
    fn kind(&self) -> OracleKind;

    /// Propose instances matching `label` in `image`.
    async fn predict(
        &self,
        image: &DynamicImage,
        label: &str,
        box_threshold: f32,
        text_threshold: f32,
    ) -> Result<Vec<Prediction>, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_names() {
        for kind in [OracleKind::VitH, OracleKind::VitL, OracleKind::VitB] {
            assert_eq!(OracleKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(OracleKind::from_str("VIT_L"), Some(OracleKind::VitL));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert_eq!(OracleKind::from_str("vit_xxl"), None);
        assert_eq!(OracleKind::from_str(""), None);
    }
}
