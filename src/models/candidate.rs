//! Candidates flowing between the search, filter, and annotation stages.

use std::path::PathBuf;

/// One image hit produced by the search stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Direct link to the image file.
    pub image_url: String,
    /// Page the image was found on.
    pub context_url: String,
}

/// A downloaded image that passed license and size filtering.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A category the oracle is prompted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabel {
    /// Ordinal position in the configured category list.
    pub id: u32,
    pub name: String,
}
