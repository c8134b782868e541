//! Candidate filtering: license probe, download, and size policy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use image::imageops::FilterType;
use image::GenericImageView;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{self, SizeLimits};
use crate::models::{ImageCandidate, SearchHit};

/// File extensions accepted for download.
const VALID_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// License metadata keyword required in commercial-only mode.
const LICENSE_KEYWORD: &str = "creative commons";

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Candidates probed and downloaded concurrently per page.
const DOWNLOAD_CONCURRENCY: usize = 4;

/// Downloads search hits and rejects unusable ones.
pub struct CandidateFilter {
    client: Client,
    license_keyword: &'static str,
    images_dir: PathBuf,
    limits: SizeLimits,
}

impl CandidateFilter {
    /// Create the filter and its images directory; fails when the
    /// directory already exists.
    pub fn new(
        images_dir: PathBuf,
        commercial_only: bool,
        limits: SizeLimits,
    ) -> anyhow::Result<Self> {
        config::create_fresh(&images_dir)?;
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            license_keyword: if commercial_only { LICENSE_KEYWORD } else { "" },
            images_dir,
            limits,
        })
    }

    /// Probe, download, and validate hits.
    ///
    /// Runs a bounded number of candidates concurrently; accepted
    /// candidates come back in input order.
    pub async fn filter_and_download(&self, hits: &[SearchHit]) -> Vec<ImageCandidate> {
        let results: Vec<Option<ImageCandidate>> = stream::iter(hits)
            .map(|hit| self.process(hit))
            .buffered(DOWNLOAD_CONCURRENCY)
            .collect()
            .await;
        let candidates: Vec<ImageCandidate> = results.into_iter().flatten().collect();
        info!(
            "{} of {} candidate urls passed filtering",
            candidates.len(),
            hits.len()
        );
        candidates
    }

    async fn process(&self, hit: &SearchHit) -> Option<ImageCandidate> {
        if !self.license_allowed(&hit.image_url).await {
            return None;
        }
        let path = self.download(&hit.image_url).await?;
        let (width, height) = self.enforce_size(&path)?;
        info!("downloaded image {}", hit.image_url);
        Some(ImageCandidate {
            path,
            width,
            height,
        })
    }

    /// A URL passes when its `License` header is absent, empty, or matches
    /// the configured keyword.
    async fn license_allowed(&self, url: &str) -> bool {
        let response = match self.client.head(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("license probe failed for {}: {}", url, e);
                return false;
            }
        };
        let value = response
            .headers()
            .get("License")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        value.is_empty() || value.eq_ignore_ascii_case(self.license_keyword)
    }

    /// Fetch the image bytes; `None` on any miss, with no file kept.
    async fn download(&self, url: &str) -> Option<PathBuf> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("download failed for {}: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("download of {} returned {}", url, response.status());
            return None;
        }
        let file_name = file_name_from_url(url)?;
        if !has_valid_extension(&file_name) {
            debug!("rejecting {} by extension", file_name);
            return None;
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("cannot read body of {}: {}", url, e);
                return None;
            }
        };
        let path = self.images_dir.join(&file_name);
        if let Err(e) = std::fs::write(&path, &bytes) {
            warn!("cannot write {}: {}", path.display(), e);
            return None;
        }
        Some(path)
    }

    /// Apply the size policy.
    ///
    /// Oversized images are downscaled in place to fit the maximum bound;
    /// undersized or unreadable ones are deleted. Returns the final
    /// dimensions of an accepted image.
    fn enforce_size(&self, path: &Path) -> Option<(u32, u32)> {
        let SizeLimits { min, max } = self.limits;
        match image::open(path) {
            Ok(img) => {
                let (width, height) = img.dimensions();
                if width > max.0 || height > max.1 {
                    let resized = img.resize(max.0, max.1, FilterType::Triangle);
                    let dims = resized.dimensions();
                    match resized.save(path) {
                        Ok(()) => return Some(dims),
                        Err(e) => warn!("cannot re-save resized {}: {}", path.display(), e),
                    }
                } else if width > min.0 && height > min.1 {
                    return Some((width, height));
                }
            }
            Err(e) => debug!("cannot decode {}: {}", path.display(), e),
        }
        let _ = std::fs::remove_file(path);
        None
    }
}

/// Derive a local file name from the URL path, dropping query and fragment.
fn file_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let name = trimmed.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn has_valid_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VALID_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn filter_in(dir: &Path) -> CandidateFilter {
        CandidateFilter::new(dir.join("images"), false, SizeLimits::default()).unwrap()
    }

    #[test]
    fn test_file_name_from_url_strips_query() {
        assert_eq!(
            file_name_from_url("https://cdn.example.com/pics/cat.jpg?width=640"),
            Some("cat.jpg".to_string())
        );
        assert_eq!(
            file_name_from_url("https://example.com/a/b/dog.png"),
            Some("dog.png".to_string())
        );
        assert_eq!(file_name_from_url("https://example.com/"), None);
    }

    #[test]
    fn test_extension_check_is_case_insensitive() {
        assert!(has_valid_extension("photo.JPG"));
        assert!(has_valid_extension("photo.jpeg"));
        assert!(has_valid_extension("photo.png"));
        assert!(!has_valid_extension("photo.gif"));
        assert!(!has_valid_extension("photo"));
    }

    #[test]
    fn test_oversized_image_is_downscaled_keeping_aspect() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_in(dir.path());
        let path = dir.path().join("images").join("big.png");
        RgbImage::new(2000, 1500).save(&path).unwrap();

        let dims = filter.enforce_size(&path).unwrap();
        assert_eq!(dims, (1333, 1000));
        let reopened = image::open(&path).unwrap();
        assert_eq!(reopened.dimensions(), (1333, 1000));
    }

    #[test]
    fn test_undersized_image_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_in(dir.path());
        let path = dir.path().join("images").join("small.png");
        RgbImage::new(100, 100).save(&path).unwrap();

        assert!(filter.enforce_size(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_one_small_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_in(dir.path());
        let path = dir.path().join("images").join("banner.png");
        RgbImage::new(800, 120).save(&path).unwrap();

        assert!(filter.enforce_size(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_undecodable_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_in(dir.path());
        let path = dir.path().join("images").join("junk.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(filter.enforce_size(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_images_dir_must_be_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let _first = filter_in(dir.path());
        assert!(CandidateFilter::new(
            dir.path().join("images"),
            false,
            SizeLimits::default()
        )
        .is_err());
    }
}
