//! Page sources: rendered page directories and JSON-lines manifests.
//!
//! Both produce pages in a stable order, which the count-based watermark
//! relies on across runs.

use crate::types::PageItem;
use docseek_core::{AppError, AppResult};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const PAGE_EXTENSION: &str = "png";
const PAGE_MARKER: &str = "_page_";

/// Optional bounds applied to discovered pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFilter {
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub page_number: Option<u32>,
}

impl PageFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A page with unknown dimensions fails any size bound.
    pub fn matches(&self, item: &PageItem) -> bool {
        fn within(value: Option<u32>, min: Option<u32>, max: Option<u32>) -> bool {
            if min.is_none() && max.is_none() {
                return true;
            }
            match value {
                Some(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
                None => false,
            }
        }

        within(item.pixel_width, self.min_width, self.max_width)
            && within(item.pixel_height, self.min_height, self.max_height)
            && self.page_number.map_or(true, |n| item.page_number == Some(n))
    }
}

/// Page number from a `<name>_page_<N>.png` file name.
pub fn parse_page_number(filename: &str) -> Option<u32> {
    let stem = filename
        .strip_suffix(PAGE_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(filename);
    let (_, number) = stem.rsplit_once(PAGE_MARKER)?;
    number.parse().ok().filter(|n| *n > 0)
}

/// Collect `.png` page renders under `dir` in lexicographic path order.
pub fn discover_pages(dir: &Path, filter: &PageFilter) -> AppResult<Vec<PageItem>> {
    if !dir.is_dir() {
        return Err(AppError::Config(format!(
            "Page directory does not exist: {}",
            dir.display()
        )));
    }

    let mut pages = Vec::new();
    let mut excluded = 0usize;

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| AppError::Io(e.into()))?;
        let path = entry.path();

        let is_page = entry.file_type().is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PAGE_EXTENSION));
        if !is_page {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().into_owned();
        let mut item = PageItem::new(filename.clone()).with_image_path(path);
        item.page_number = parse_page_number(&filename);

        match image::image_dimensions(path) {
            Ok((width, height)) => item = item.with_dimensions(width, height),
            Err(e) => warn!("Cannot read dimensions of {}: {}", path.display(), e),
        }

        if filter.matches(&item) {
            pages.push(item);
        } else {
            excluded += 1;
        }
    }

    debug!(
        "Discovered {} pages in {} ({} excluded by filter)",
        pages.len(),
        dir.display(),
        excluded
    );
    Ok(pages)
}

/// Read pages from a JSON-lines manifest, one `PageItem` per line.
///
/// Relative image paths are resolved against the manifest's directory.
pub fn load_manifest(path: &Path) -> AppResult<Vec<PageItem>> {
    let content = fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut pages = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let mut item: PageItem = serde_json::from_str(line).map_err(|e| {
            AppError::Serialization(format!(
                "{}:{}: invalid page entry: {}",
                path.display(),
                line_no + 1,
                e
            ))
        })?;

        if let Some(image) = &item.image_path {
            if image.is_relative() {
                item.image_path = Some(base.join(image));
            }
        }
        pages.push(item);
    }

    debug!("Loaded {} pages from {}", pages.len(), path.display());
    Ok(pages)
}
