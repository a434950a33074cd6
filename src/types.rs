//! Board record types shared by the sync service, database layer, and CLI.
//!
//! DESIGN
//! ======
//! `BoardRecord` is the stored shape under `Users/{uid}/Boards/{key}`;
//! `Board` pairs it with the backend-assigned key. Numeric fields default to
//! zero so records written by older editors (no `stamp`, no `time`) still
//! decode and simply sort last.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Editor version stamped on the onboarding template.
pub const EDITOR_VERSION: &str = "2.18.0";

// =============================================================================
// BOARD
// =============================================================================

/// A board as held in the local list: key plus stored record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub key: String,
    pub data: BoardData,
    pub meta: BoardMeta,
}

/// A board record as stored remotely (no key).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub data: BoardData,
    pub meta: BoardMeta,
}

/// Editor document content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardData {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub version: String,
    /// Last editor save time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub time: f64,
}

/// A single editor block (header, list, paragraph, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Listing metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardMeta {
    #[serde(default)]
    pub name: String,
    /// Sort key for the listing, newest first.
    #[serde(default)]
    pub stamp: f64,
    #[serde(default)]
    pub cover: String,
    #[serde(rename = "coverBg", default)]
    pub cover_bg: serde_json::Value,
}

impl Board {
    #[must_use]
    pub fn from_record(key: impl Into<String>, record: BoardRecord) -> Self {
        Self { key: key.into(), data: record.data, meta: record.meta }
    }

    /// Decode a snapshot child into a board.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `value` does not have the record shape.
    pub fn from_child(key: &str, value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let record = BoardRecord::deserialize(value)?;
        Ok(Self::from_record(key, record))
    }

    /// The onboarding template, keyed as `key`.
    #[must_use]
    pub fn template(key: impl Into<String>) -> Self {
        Self::from_record(key, BoardRecord::template())
    }

    #[must_use]
    pub fn record(&self) -> BoardRecord {
        BoardRecord { data: self.data.clone(), meta: self.meta.clone() }
    }
}

impl BoardRecord {
    /// Onboarding content shown for a board that has not synced yet and
    /// written as the initial body of a freshly created board.
    #[must_use]
    pub fn template() -> Self {
        let marker = |text: &str| format!("<mark class ='cdx-marker'><b>{text}</b></mark>");
        Self {
            data: BoardData {
                blocks: vec![
                    Block {
                        id: None,
                        kind: "header".to_owned(),
                        data: json!({
                            "level": 6,
                            "text": "<mark class ='cdx-marker'>Guide/</mark>",
                        }),
                    },
                    Block {
                        id: None,
                        kind: "list".to_owned(),
                        data: json!({
                            "items": [
                                marker("Click anywhere to add content"),
                                marker("Hit tab for block types"),
                                marker("Saved automatically on typing! "),
                                marker("Ctrl/Cmd + S to force save"),
                            ],
                            "style": "ordered",
                        }),
                    },
                ],
                version: EDITOR_VERSION.to_owned(),
                time: 0.0,
            },
            meta: BoardMeta {
                name: "Untitled".to_owned(),
                stamp: 0.0,
                cover: "🔰".to_owned(),
                cover_bg: json!({
                    "background": "linear-gradient(90deg, #71f7bd 25%, #e2a8f7 50%, #8077e5 75%)",
                }),
            },
        }
    }

    /// Template with `stamp` and `time` set to `now_ms`.
    #[must_use]
    pub fn stamped_template(now_ms: f64) -> Self {
        let mut record = Self::template();
        record.data.time = now_ms;
        record.meta.stamp = now_ms;
        record
    }
}
