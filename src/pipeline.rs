//! Run driver: sequences search, filtering, composition, and combination.
//!
//! Pages are processed strictly in order; a page is fully filtered before
//! annotation starts, and images are annotated one at a time. The only
//! shared mutable state across the run is the image id counter below.

use std::path::Path;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::compose::{ComposeOutcome, PanopticComposer};
use crate::config::{self, RunPaths, RESULTS_PER_PAGE};
use crate::filter::CandidateFilter;
use crate::search::SearchClient;
use crate::store::AnnotationStore;

/// Run-global monotonic image id source.
///
/// Owned by the driver and handed to the composer by reference; bumped
/// exactly once per successfully annotated image.
#[derive(Debug, Default)]
pub struct ImageIdCounter(u32);

impl ImageIdCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Next id, starting at 1.
    pub fn next_id(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }

    /// Last id handed out (0 before the first).
    pub fn last(&self) -> u32 {
        self.0
    }
}

/// Detection thresholds forwarded to the oracle per query.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub box_threshold: f32,
    pub text_threshold: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            box_threshold: 0.3,
            text_threshold: 0.25,
        }
    }
}

/// Options for one collection run.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub pages: u32,
    pub thresholds: Thresholds,
    pub save_previews: bool,
}

/// End-of-run totals.
#[derive(Debug, Default)]
pub struct CollectSummary {
    pub pages_searched: u32,
    pub urls_considered: usize,
    pub candidates_downloaded: usize,
    pub images_annotated: u32,
}

/// One full collection run.
pub struct CollectService {
    search: SearchClient,
    filter: CandidateFilter,
    composer: PanopticComposer,
    store: AnnotationStore,
    paths: RunPaths,
    options: CollectOptions,
}

impl CollectService {
    pub fn new(
        search: SearchClient,
        filter: CandidateFilter,
        composer: PanopticComposer,
        store: AnnotationStore,
        paths: RunPaths,
        options: CollectOptions,
    ) -> anyhow::Result<Self> {
        if options.save_previews {
            config::create_fresh(&paths.previews_dir())?;
        }
        Ok(Self {
            search,
            filter,
            composer,
            store,
            paths,
            options,
        })
    }

    /// Process every page, then combine all intermediate records.
    pub async fn run(self) -> anyhow::Result<CollectSummary> {
        let mut counter = ImageIdCounter::new();
        let mut summary = CollectSummary::default();

        let progress = ProgressBar::new(u64::from(self.options.pages)).with_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:30.cyan/blue}] page {pos}/{len} {msg}",
            )?
            .progress_chars("=>-"),
        );

        for page in 0..self.options.pages {
            let start = page * RESULTS_PER_PAGE + 1;
            progress.set_message("searching");
            let hits = match self.search.crawl(start).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("search page at offset {} failed: {}", start, e);
                    progress.inc(1);
                    continue;
                }
            };
            summary.pages_searched += 1;
            summary.urls_considered += hits.len();

            progress.set_message(format!("filtering {} urls", hits.len()));
            let candidates = self.filter.filter_and_download(&hits).await;
            summary.candidates_downloaded += candidates.len();

            for candidate in &candidates {
                let name = candidate
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                progress.set_message(format!("annotating {name}"));
                match self
                    .composer
                    .generate_annotation(
                        candidate,
                        &self.store,
                        &mut counter,
                        self.options.thresholds.box_threshold,
                        self.options.thresholds.text_threshold,
                    )
                    .await
                {
                    Ok(Some(outcome)) => {
                        summary.images_annotated += 1;
                        if self.options.save_previews {
                            self.save_preview(&outcome)?;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("annotation of {} failed: {}", candidate.path.display(), e),
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        let combined = self.store.combine_all()?;
        info!(
            "run complete under {}: {} images annotated",
            self.paths.root().display(),
            summary.images_annotated
        );
        println!(
            "{} {} pages searched, {} urls considered, {} downloads, {} images annotated, {} records combined",
            style("done:").green().bold(),
            summary.pages_searched,
            summary.urls_considered,
            summary.candidates_downloaded,
            summary.images_annotated,
            combined
        );
        Ok(summary)
    }

    fn save_preview(&self, outcome: &ComposeOutcome) -> anyhow::Result<()> {
        let path = self
            .paths
            .previews_dir()
            .join(Path::new(&outcome.annotation.file_name).with_extension("png"));
        outcome
            .preview
            .save(&path)
            .with_context(|| format!("cannot save preview {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic_from_one() {
        let mut counter = ImageIdCounter::new();
        assert_eq!(counter.last(), 0);
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.next_id(), 3);
        assert_eq!(counter.last(), 3);
    }
}
