use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title prefix marking a bookmark (or a stray closing entry) as special.
pub const SPECIAL_MARKER: &str = "#special";

/// The classification prefix includes the separating space; stripping it
/// yields the appendix title.
pub const SPECIAL_TITLE_PREFIX: &str = "#special ";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryNode {
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "bm", default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<Vec<Bookmark>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "ct", default)]
    pub created_at: u64,
}

impl Bookmark {
    pub fn is_special(&self) -> bool {
        self.title.starts_with(SPECIAL_MARKER)
    }
}

/// One raw entry of a chapter's content window. Only `chapter`, `choice` and
/// `readerPost` entries render; the remaining variants exist so a full window
/// parses cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "nt")]
pub enum RawEntry {
    #[serde(rename = "chapter")]
    Chapter {
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(rename = "b", default)]
        body: String,
    },
    #[serde(rename = "chat")]
    Chat {
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(rename = "choice")]
    Choice {
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default)]
        choices: Vec<String>,
        #[serde(default)]
        multiple: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        votes: Option<HashMap<String, VoteSelection>>,
        #[serde(rename = "userVotes", default, skip_serializing_if = "Option::is_none")]
        user_votes: Option<HashMap<String, VoteSelection>>,
        #[serde(rename = "xOut", default, skip_serializing_if = "Option::is_none")]
        crossed_out: Option<Vec<String>>,
    },
    #[serde(rename = "readerPost")]
    ReaderPost {
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Submitted texts keyed by voter id; iteration order is the JSON
        /// insertion order, which carries no ranking.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        votes: Option<serde_json::Map<String, Value>>,
    },
    #[serde(rename = "story")]
    Story {
        #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl RawEntry {
    pub fn title(&self) -> Option<&str> {
        match self {
            RawEntry::Chapter { title, .. }
            | RawEntry::Chat { title, .. }
            | RawEntry::Choice { title, .. }
            | RawEntry::ReaderPost { title, .. }
            | RawEntry::Story { title, .. } => title.as_deref(),
            RawEntry::Unknown => None,
        }
    }
}

/// A single-select vote is one choice index; a multi-select vote is the list
/// of indices one voter picked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoteSelection {
    One(usize),
    Many(Vec<usize>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterData {
    pub title: String,
    pub is_appendix: bool,
    pub raw_key: String,
    pub output_key: String,
    pub previous_key: String,
    pub next_key: String,
    pub fragments: Vec<String>,
}

/// Segmented archive, before image rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryData {
    pub title: String,
    pub chapters: Vec<ChapterData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Every raw URL seen for this image, in discovery order.
    pub original_urls: Vec<String>,
    /// Canonical URL after host normalization; the dedup key.
    pub url: String,
    /// Local filename, assigned once and stable across runs.
    pub filename: String,
}

/// Final artifact: the segmented story with rewritten fragments and the full
/// image mapping. Canonical input for the site emitter and the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryArchive {
    pub title: String,
    pub chapters: Vec<ChapterData>,
    pub images: Vec<ImageRecord>,
}
