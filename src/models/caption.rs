//! Caption records: the `{title, description}` sidecar stored as `<base>.json`.

use serde::{Deserialize, Serialize};

pub const UNTITLED: &str = "Untitled Image";
pub const NO_DESCRIPTION: &str = "No description available.";
/// Shown on the detail page when no caption record exists or a field is missing.
pub const NO_STORED_DESCRIPTION: &str = "No AI-generated description available for this image.";

pub const API_KEY_MISSING: &str = "API Key Missing";
pub const ANALYSIS_ERROR: &str = "Analysis Error";
pub const PROCESSING_ERROR: &str = "Processing Error";

/// A generated caption, serialized verbatim as the caption record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Caption {
    pub title: String,
    pub description: String,
}

impl Caption {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Build a caption from raw model output, substituting placeholders for
    /// empty text.
    pub fn from_generated(title: &str, description: &str) -> Self {
        let title = title.trim();
        let description = description.trim();
        Self::new(
            if title.is_empty() { UNTITLED } else { title },
            if description.is_empty() {
                NO_DESCRIPTION
            } else {
                description
            },
        )
    }

    /// Placeholder pair for the detail page when nothing usable is stored.
    pub fn view_default() -> Self {
        Self::new(UNTITLED, NO_STORED_DESCRIPTION)
    }

    /// Parse a stored caption record. Missing keys fall back to the detail
    /// page defaults; malformed JSON is an error.
    pub fn from_record(bytes: &[u8]) -> serde_json::Result<Self> {
        let stored: StoredCaption = serde_json::from_slice(bytes)?;
        Ok(Self::new(
            stored.title.unwrap_or_else(|| UNTITLED.into()),
            stored
                .description
                .unwrap_or_else(|| NO_STORED_DESCRIPTION.into()),
        ))
    }

    pub fn to_record(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Lenient view of a caption record; records written by other tools may
/// omit either key.
#[derive(Deserialize, Debug, Default)]
struct StoredCaption {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}
