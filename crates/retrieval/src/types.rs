//! Retrieval type definitions.

use docseek_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Vector-store point identity of an indexed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl PageId {
    /// Position of the page in the item sequence it was indexed from.
    pub fn position(self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One document page to index.
///
/// Created by the page source and never mutated afterwards; the engine only
/// borrows items for the duration of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    /// Origin document name
    pub source_filename: String,

    /// 1-based page number within the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    /// Text extracted from the page (stored in the payload, never embedded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_height: Option<u32>,

    /// Location of the rendered page image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
}

impl PageItem {
    pub fn new(source_filename: impl Into<String>) -> Self {
        Self {
            source_filename: source_filename.into(),
            page_number: None,
            extracted_text: None,
            pixel_width: None,
            pixel_height: None,
            image_path: None,
        }
    }

    pub fn with_page_number(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.pixel_width = Some(width);
        self.pixel_height = Some(height);
        self
    }

    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Reason this item cannot be indexed, if any.
    pub fn validation_issue(&self) -> Option<&'static str> {
        if self.source_filename.trim().is_empty() {
            return Some("missing source filename");
        }
        if self.page_number == Some(0) {
            return Some("page number must be positive");
        }
        None
    }

    /// Payload stored next to this page's vectors.
    pub fn payload(&self, source: &str) -> EntryPayload {
        EntryPayload {
            source_filename: self.source_filename.clone(),
            page_number: self.page_number,
            extracted_text: self.extracted_text.clone(),
            source: source.to_string(),
        }
    }
}

/// Variable-count set of equal-dimension vectors representing one page or query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f32>>", into = "Vec<Vec<f32>>")]
pub struct MultiVector {
    vectors: Vec<Vec<f32>>,
}

impl MultiVector {
    /// Build a multi-vector, rejecting empty, ragged or non-finite input.
    pub fn new(vectors: Vec<Vec<f32>>) -> AppResult<Self> {
        let dimension = match vectors.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => {
                return Err(AppError::Embedding(
                    "Multi-vector contains a zero-length vector".to_string(),
                ))
            }
            None => return Err(AppError::Embedding("Multi-vector is empty".to_string())),
        };

        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(AppError::Embedding(format!(
                "Multi-vector is ragged: vector {} has dimension {}, expected {}",
                i,
                v.len(),
                dimension
            )));
        }

        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(AppError::Embedding(
                "Multi-vector contains non-finite values".to_string(),
            ));
        }

        Ok(Self { vectors })
    }

    /// Per-vector dimension.
    pub fn dimension(&self) -> usize {
        self.vectors[0].len()
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Always false; construction rejects empty multi-vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        self.vectors
    }
}

impl TryFrom<Vec<Vec<f32>>> for MultiVector {
    type Error = AppError;

    fn try_from(vectors: Vec<Vec<f32>>) -> AppResult<Self> {
        Self::new(vectors)
    }
}

impl From<MultiVector> for Vec<Vec<f32>> {
    fn from(value: MultiVector) -> Self {
        value.vectors
    }
}

/// Similarity used between individual vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

impl FromStr for Distance {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "dot" => Ok(Distance::Dot),
            "euclid" | "euclidean" => Ok(Distance::Euclid),
            other => Err(AppError::Config(format!(
                "Unknown distance '{}'. Supported: cosine, dot, euclid",
                other
            ))),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
            Distance::Euclid => "euclid",
        };
        f.write_str(name)
    }
}

/// How two multi-vectors are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiVectorComparator {
    /// Sum over query vectors of the best match among stored vectors.
    #[default]
    MaxSim,
}

/// Scalar quantization policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarQuantization {
    pub bits: u8,
    pub quantile: f32,
    pub always_ram: bool,
}

impl ScalarQuantization {
    pub fn validate(&self) -> AppResult<()> {
        if self.bits != 8 {
            return Err(AppError::Config(format!(
                "Unsupported scalar quantization width: {} bits (only 8 is supported)",
                self.bits
            )));
        }
        if !(0.5..=1.0).contains(&self.quantile) {
            return Err(AppError::Config(format!(
                "Quantization quantile must be within [0.5, 1.0], got {}",
                self.quantile
            )));
        }
        Ok(())
    }
}

impl Default for ScalarQuantization {
    fn default() -> Self {
        Self {
            bits: 8,
            quantile: 0.99,
            always_ram: true,
        }
    }
}

/// Fixed configuration of a collection, set once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub dimension: usize,
    pub distance: Distance,
    pub comparator: MultiVectorComparator,
    pub quantization: Option<ScalarQuantization>,
    pub on_disk_payload: bool,
}

impl CollectionConfig {
    pub fn new(dimension: usize, distance: Distance) -> Self {
        Self {
            dimension,
            distance,
            comparator: MultiVectorComparator::MaxSim,
            quantization: None,
            on_disk_payload: true,
        }
    }

    pub fn with_quantization(mut self, quantization: Option<ScalarQuantization>) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn with_on_disk_payload(mut self, on_disk_payload: bool) -> Self {
        self.on_disk_payload = on_disk_payload;
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.dimension == 0 {
            return Err(AppError::Config(
                "Collection dimension must be positive".to_string(),
            ));
        }
        if let Some(quantization) = &self.quantization {
            quantization.validate()?;
        }
        Ok(())
    }

    /// Reject a multi-vector whose dimension differs from the collection's.
    pub fn check_dimension(&self, identity: PageId, vectors: &MultiVector) -> AppResult<()> {
        if vectors.dimension() != self.dimension {
            return Err(AppError::Config(format!(
                "Dimension mismatch for entry {}: expected {}, got {}",
                identity,
                self.dimension,
                vectors.dimension()
            )));
        }
        Ok(())
    }
}

/// Payload stored with each entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub source_filename: String,
    pub page_number: Option<u32>,
    pub extracted_text: Option<String>,
    pub source: String,
}

/// The stored unit: identity, vectors and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub identity: PageId,
    pub vectors: MultiVector,
    pub payload: EntryPayload,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub identity: PageId,
    /// MaxSim aggregate of the query against the stored multi-vector
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EntryPayload>,
}
