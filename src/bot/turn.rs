use crate::shared::models::{
    ADD_COMMAND, DELETE_COMMAND, NO_COMMAND, SAVE_COMMAND, SUBMIT_ADD_COMMAND,
};
use serde::{Deserialize, Serialize};

/// The user behind a turn.
#[derive(Debug, Clone)]
pub struct Actor {
    pub object_id: String,
    pub name: String,
}

/// Team-channel scope of one conversational turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub team_id: String,
    pub conversation_id: String,
    pub reply_to_id: Option<String>,
    pub from: Actor,
}

/// Strongly typed card submit data, decoded at the transport boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitActionPayload {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub details: Option<PayloadDetails>,
}

/// Original-entry reference carried by edit/delete card submits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadDetails {
    #[serde(default)]
    pub question: Option<String>,
}

impl SubmitActionPayload {
    pub fn question_trimmed(&self) -> String {
        self.question.as_deref().unwrap_or_default().trim().to_string()
    }

    pub fn answer_trimmed(&self) -> String {
        self.answer.as_deref().unwrap_or_default().trim().to_string()
    }

    pub fn original_question(&self) -> String {
        self.details
            .as_ref()
            .and_then(|d| d.question.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Per-turn command, dispatched on the literal (case-insensitive) text.
/// Anything unrecognized is a free-text question.
#[derive(Debug, Clone)]
pub enum Command {
    AddPrompt,
    SubmitAdd(SubmitActionPayload),
    Save(SubmitActionPayload),
    Delete(SubmitActionPayload),
    NoOp,
    Ask(String),
}

impl Command {
    pub fn parse(text: &str, payload: Option<SubmitActionPayload>) -> Self {
        let trimmed = text.trim();
        let payload = payload.unwrap_or_default();
        match trimmed.to_lowercase().as_str() {
            SAVE_COMMAND => Self::Save(payload),
            DELETE_COMMAND => Self::Delete(payload),
            SUBMIT_ADD_COMMAND => Self::SubmitAdd(payload),
            ADD_COMMAND => Self::AddPrompt,
            NO_COMMAND => Self::NoOp,
            _ => Self::Ask(trimmed.to_string()),
        }
    }
}

/// Rendering-free turn reply. The transport (or a card layer above it)
/// decides how each variant is presented.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TurnReply {
    /// A published answer with attribution.
    Answer {
        question: String,
        answer: String,
        answered_by: String,
    },
    /// The question is known but nobody has answered it yet.
    NoAnswerYet { question: String },
    /// A draft answer exists but is not published; the answer text is
    /// deliberately withheld.
    PendingPublish { question: String },
    /// The entry only exists unpublished, so it cannot be deleted yet.
    PendingDelete,
    Deleted {
        question: String,
        answer: String,
        deleted_by: String,
    },
    Updated {
        question: String,
        answer: Option<String>,
        updated_by: String,
    },
    Added {
        question: String,
        answer: Option<String>,
        added_by: String,
    },
    /// Input form for a new entry; `valid: false` re-renders after a blank
    /// question submit.
    QuestionForm { valid: bool },
    EmptyQuestionValidation,
    QuestionNotAvailable,
    Welcome,
    NotInScope,
    GenericError,
}
