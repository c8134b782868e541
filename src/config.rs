//! Run configuration: label files, directory layout, crawl and size limits.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::CategoryLabel;

/// Page size of the search API; it will not serve more results per request.
pub const RESULTS_PER_PAGE: u32 = 10;

/// Contents of a label configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelFile {
    #[serde(default)]
    pub label_name: Option<String>,
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
}

/// Load category labels from a YAML label file.
///
/// Category ids are the ordinal positions in the configured list. Fails when
/// the file is missing, malformed, or lists no categories.
pub fn load_labels(path: &Path) -> anyhow::Result<Vec<CategoryLabel>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read label file {}", path.display()))?;
    let parsed: LabelFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("malformed label file {}", path.display()))?;
    anyhow::ensure!(
        !parsed.categories.is_empty(),
        "label file {} lists no categories",
        path.display()
    );
    Ok(parsed
        .categories
        .into_iter()
        .enumerate()
        .map(|(id, entry)| CategoryLabel {
            id: id as u32,
            name: entry.name,
        })
        .collect())
}

/// Write a label file skeleton naming `categories`, for later editing.
///
/// The file is named after the search key, spaces replaced with
/// underscores. Returns the path written.
pub fn write_label_file(
    dir: &Path,
    search_key: &str,
    categories: &[String],
) -> anyhow::Result<PathBuf> {
    anyhow::ensure!(!categories.is_empty(), "no categories given");
    let slug = search_key.replace(' ', "_");
    let file = LabelFile {
        label_name: Some(slug.clone()),
        categories: categories
            .iter()
            .map(|name| CategoryEntry { name: name.clone() })
            .collect(),
    };
    let path = dir.join(format!("{slug}.yaml"));
    fs::write(&path, serde_yaml::to_string(&file)?)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

/// Size limits applied to downloaded images.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    /// Both dimensions must strictly exceed these to be kept as-is.
    pub min: (u32, u32),
    /// Images larger than this on either axis are downscaled to fit.
    pub max: (u32, u32),
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            min: (200, 200),
            max: (1333, 1333),
        }
    }
}

/// Bounds on the deep-crawl frontier.
#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    /// Maximum pages fetched per deep crawl.
    pub max_pages: usize,
    /// Maximum link depth from the seed page.
    pub max_depth: u32,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 3,
        }
    }
}

/// Directory layout of one collection run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    root: PathBuf,
}

impl RunPaths {
    /// Layout under `<output_dir>/datasets/<search term>`, spaces replaced
    /// with underscores.
    pub fn new(output_dir: &Path, search_term: &str) -> Self {
        let slug = search_term.replace(' ', "_");
        Self {
            root: output_dir.join("datasets").join(slug),
        }
    }

    /// Attach to an existing run directory.
    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn panoptic_dir(&self) -> PathBuf {
        self.root.join("panoptic_annotation")
    }

    pub fn intermediate_dir(&self) -> PathBuf {
        self.root.join("annotation_json")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.root.join("previews")
    }

    pub fn combined_file(&self) -> PathBuf {
        self.root.join("panoptic_annotation.json")
    }
}

/// Create `dir`, failing when it already exists.
///
/// Every output directory is created exactly once per run; a pre-existing
/// directory means another run already wrote there.
pub fn create_fresh(dir: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    fs::create_dir(dir)
        .with_context(|| format!("output directory {} already exists", dir.display()))?;
    Ok(())
}
