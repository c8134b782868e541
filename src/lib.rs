//! Panoptic segmentation dataset harvesting.
//!
//! Builds image datasets with panoptic annotations: candidate images come
//! from a web search API (optionally deep-crawled), pass license and size
//! filtering, are annotated by a promptable segmentation oracle once per
//! category label, and the per-label detections are fused into one
//! per-pixel instance map with COCO-style segment metadata. Each image's
//! record is persisted immediately; a final combine step assembles the
//! dataset file.

pub mod cli;
pub mod compose;
pub mod config;
pub mod filter;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod search;
pub mod store;
