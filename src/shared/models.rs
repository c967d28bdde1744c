use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved answer value meaning "no answer recorded yet". A real author can
/// type this literal as an answer; the collision is accepted.
pub const UNANSWERED: &str = "#$unanswered$#";

/// Conversation reference recorded when an entry has no originating thread.
pub const NO_CONVERSATION: &str = "#";

/// Entry source recorded in the knowledge service.
pub const ENTRY_SOURCE: &str = "Bot";

/// Placeholder entry the knowledge service requires to bootstrap a KB.
/// Filtered from all user-facing results by its sentinel team id.
pub const PLACEHOLDER_QUESTION: &str = "dummyquestion";
pub const PLACEHOLDER_ANSWER: &str = "dummyanswer";
pub const PLACEHOLDER_TEAM_ID: &str = "dummy";

// Command literals, matched case-insensitively against trimmed turn text.
pub const SAVE_COMMAND: &str = "save";
pub const DELETE_COMMAND: &str = "delete";
pub const SUBMIT_ADD_COMMAND: &str = "submit/add";
pub const ADD_COMMAND: &str = "add question";
pub const NO_COMMAND: &str = "no";

// Metadata key names. The knowledge service lowercases metadata, so display
// names are resolved through the identity cache instead of metadata values.
pub const METADATA_TEAM_ID: &str = "teamid";
pub const METADATA_CREATED_AT: &str = "createdat";
pub const METADATA_CREATED_BY: &str = "createdby";
pub const METADATA_UPDATED_AT: &str = "updatedat";
pub const METADATA_UPDATED_BY: &str = "updatedby";
pub const METADATA_CONVERSATION_ID: &str = "conversationid";

// Messaging extension command ids.
pub const CREATED_COMMAND_ID: &str = "created";
pub const EDITED_COMMAND_ID: &str = "edited";
pub const UNANSWERED_COMMAND_ID: &str = "unanswered";

/// Fixed page size for extension search results.
pub const SEARCH_PAGE_SIZE: usize = 50;

/// One name/value metadata pair attached to a knowledge base entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
}

impl Metadata {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// A question/answer entry as stored in the knowledge service. The first
/// question is canonical, the rest are synonyms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QnaEntry {
    #[serde(default)]
    pub id: i64,
    pub questions: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

impl QnaEntry {
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    }
}

/// A scored answer returned by the knowledge service runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedAnswer {
    pub id: i64,
    #[serde(default)]
    pub questions: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

impl RankedAnswer {
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    }
}

/// Which view of the knowledge base a query or download targets: the
/// unpublished draft or the last-published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbEnvironment {
    Test,
    Prod,
}

impl KbEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::Prod => "Prod",
        }
    }
}

impl std::fmt::Display for KbEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Singleton record mapping the deployment to its knowledge base id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfiguration {
    pub kb_id: String,
}

/// Team to knowledge base mapping. Every team maps to the single active kb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamKbMapping {
    pub team_id: String,
    pub kb_id: String,
}

/// objectId to display name mapping, refreshed on every mutating action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameIdMapping {
    pub object_id: String,
    pub name: String,
}

/// Publish-relevant timestamps reported by the knowledge service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KbDetails {
    pub last_changed_timestamp: Option<DateTime<Utc>>,
    pub last_published_timestamp: Option<DateTime<Utc>>,
}

/// Search index projection of a published entry. Rebuilt wholesale each
/// publish cycle, never incrementally patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    pub id: String,
    pub questions: Vec<String>,
    pub answer: String,
    #[serde(rename = "teamid")]
    pub team_id: String,
    #[serde(rename = "createddate")]
    pub created_date: DateTime<Utc>,
    #[serde(rename = "updateddate")]
    pub updated_date: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}
