//! Typed records written to and read from a collection.

use serde::{Deserialize, Serialize};

use crate::vector_store::VectorStoreError;

pub const PATH_FIELD: &str = "path";
pub const CONTENT_FIELD: &str = "content";
pub const CONTENT_LENGTH_FIELD: &str = "content_length";

/// Payload stored alongside every file vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub path: String,
    pub content: String,
    /// Length of `content` in characters.
    pub content_length: usize,
}

impl FilePayload {
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            content_length: content.chars().count(),
            content,
        }
    }
}

/// A point ready to be upserted. Constructed only through [`CollectionPoint::new`],
/// which rejects empty or non-finite vectors and empty paths.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPoint {
    id: u64,
    vector: Vec<f32>,
    payload: FilePayload,
}

impl CollectionPoint {
    /// # Errors
    ///
    /// Returns [`VectorStoreError::InvalidPoint`] if the vector is empty or holds
    /// NaN/infinite values, or if the payload path is empty.
    pub fn new(id: u64, vector: Vec<f32>, payload: FilePayload) -> Result<Self, VectorStoreError> {
        if vector.is_empty() {
            return Err(VectorStoreError::InvalidPoint(format!(
                "point {id} has an empty vector"
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorStoreError::InvalidPoint(format!(
                "point {id} has a non-finite vector component"
            )));
        }
        if payload.path.is_empty() {
            return Err(VectorStoreError::InvalidPoint(format!(
                "point {id} has an empty path"
            )));
        }
        Ok(Self {
            id,
            vector,
            payload,
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    #[must_use]
    pub fn payload(&self) -> &FilePayload {
        &self.payload
    }

    #[must_use]
    pub fn into_parts(self) -> (u64, Vec<f32>, FilePayload) {
        (self.id, self.vector, self.payload)
    }
}

/// A nearest-neighbour hit; higher `score` means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub payload: FilePayload,
}

/// A point returned by scrolling, without its vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPoint {
    pub id: u64,
    pub payload: FilePayload,
}

/// One page of a cursor scroll. `next_offset` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    pub next_offset: Option<u64>,
}
