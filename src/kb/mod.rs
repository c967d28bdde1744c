use crate::registry::KbConfigStore;
use crate::shared::models::{
    KbEnvironment, Metadata, QnaEntry, RankedAnswer, ENTRY_SOURCE, METADATA_CONVERSATION_ID,
    METADATA_CREATED_AT, METADATA_CREATED_BY, METADATA_TEAM_ID, METADATA_UPDATED_AT,
    METADATA_UPDATED_BY, NO_CONVERSATION, PLACEHOLDER_ANSWER, PLACEHOLDER_QUESTION,
    PLACEHOLDER_TEAM_ID, UNANSWERED,
};
use crate::storage::StorageError;
use chrono::Utc;
use log::info;
use std::sync::Arc;
use std::time::Duration;

pub mod operation;
pub mod service;

use operation::{OperationOutcome, OPERATION_POLL_DELAY, OPERATION_POLL_RETRIES};
use service::{
    AddSection, AnswerQuery, DeleteSection, KnowledgeService, QuestionsDiff, UpdateKbRequest,
    UpdateQna, UpdateSection,
};

#[derive(Debug, thiserror::Error)]
pub enum KbError {
    #[error("knowledge service request failed: {0}")]
    Service(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no knowledge base has been provisioned yet")]
    NotProvisioned,
    #[error("operation {id} failed: {reason}")]
    OperationFailed { id: String, reason: String },
    #[error("operation {id} still pending after bounded polling")]
    OperationTimedOut { id: String },
    #[error("malformed knowledge service response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Other(String),
}

/// Knowledge base provider: idempotent entry CRUD, ranked answering across
/// the test/prod views, and KB lifecycle (create/publish/delete).
pub struct QnaProvider {
    service: Arc<dyn KnowledgeService>,
    config_store: Arc<KbConfigStore>,
    kb_name: String,
    score_threshold: f64,
    operation_delay: Duration,
}

impl QnaProvider {
    pub fn new(
        service: Arc<dyn KnowledgeService>,
        config_store: Arc<KbConfigStore>,
        kb_name: &str,
        score_threshold: f64,
    ) -> Self {
        Self {
            service,
            config_store,
            kb_name: kb_name.to_string(),
            score_threshold,
            operation_delay: OPERATION_POLL_DELAY,
        }
    }

    /// Shortens the operation poll delay. Test hook.
    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = delay;
        self
    }

    async fn kb_id(&self) -> Result<String, KbError> {
        let config = self.config_store.get().await?;
        config.map(|c| c.kb_id).ok_or(KbError::NotProvisioned)
    }

    fn tick_now() -> String {
        Utc::now().timestamp_micros().to_string()
    }

    /// Adds a new entry tagged with creator, team, creation tick and the
    /// originating conversation reference (`"#"` when there is none).
    pub async fn add_qna(
        &self,
        question: &str,
        answer: &str,
        created_by: &str,
        team_id: &str,
        conversation_id: &str,
    ) -> Result<(), KbError> {
        let kb_id = self.kb_id().await?;
        let conversation = if conversation_id.is_empty() {
            NO_CONVERSATION
        } else {
            conversation_id
        };
        let entry = QnaEntry {
            id: 0,
            questions: vec![question.to_string()],
            answer: answer.to_string(),
            source: Some(ENTRY_SOURCE.to_string()),
            metadata: vec![
                Metadata::new(METADATA_CREATED_AT, Self::tick_now()),
                Metadata::new(METADATA_CREATED_BY, created_by),
                Metadata::new(METADATA_TEAM_ID, urlencoding::encode(team_id).into_owned()),
                Metadata::new(
                    METADATA_CONVERSATION_ID,
                    urlencoding::encode(conversation).into_owned(),
                ),
            ],
        };
        let diff = UpdateKbRequest {
            add: Some(AddSection {
                qna_list: vec![entry],
            }),
            ..Default::default()
        };
        self.service.update_knowledge_base(&kb_id, diff).await
    }

    /// Updates an entry in place. A changed question text becomes an
    /// add/delete question diff so the entry id is preserved; the answer is
    /// always overwritten, with blank normalized to the unanswered sentinel.
    pub async fn update_qna(
        &self,
        id: i64,
        answer: &str,
        updated_by: &str,
        updated_question: Option<&str>,
        question: &str,
        _team_id: &str,
    ) -> Result<(), KbError> {
        let kb_id = self.kb_id().await?;

        let questions = match updated_question {
            Some(updated) if !updated.is_empty() && updated != question => Some(QuestionsDiff {
                add: vec![updated.to_string()],
                delete: vec![question.to_string()],
            }),
            _ => None,
        };

        let answer = if answer.is_empty() { UNANSWERED } else { answer };

        let diff = UpdateKbRequest {
            update: Some(UpdateSection {
                qna_list: vec![UpdateQna {
                    id,
                    answer: answer.to_string(),
                    source: Some(ENTRY_SOURCE.to_string()),
                    questions,
                    metadata_add: vec![
                        Metadata::new(METADATA_UPDATED_AT, Self::tick_now()),
                        Metadata::new(METADATA_UPDATED_BY, updated_by),
                    ],
                }],
            }),
            ..Default::default()
        };
        self.service.update_knowledge_base(&kb_id, diff).await
    }

    pub async fn delete_qna(&self, id: i64, _team_id: &str) -> Result<(), KbError> {
        let kb_id = self.kb_id().await?;
        let diff = UpdateKbRequest {
            delete: Some(DeleteSection { ids: vec![id] }),
            ..Default::default()
        };
        self.service.update_knowledge_base(&kb_id, diff).await
    }

    /// Ranked answer lookup scoped to a team. The wire-level no-match
    /// sentinel (id = -1) is mapped to `None` here.
    pub async fn generate_answer(
        &self,
        is_test: bool,
        question: &str,
        team_id: &str,
    ) -> Result<Option<RankedAnswer>, KbError> {
        let kb_id = self.kb_id().await?;
        let answers = self
            .service
            .generate_answer(
                &kb_id,
                AnswerQuery {
                    is_test,
                    question: question.to_string(),
                    score_threshold: self.score_threshold,
                    strict_filters: vec![Metadata::new(
                        METADATA_TEAM_ID,
                        urlencoding::encode(team_id).into_owned(),
                    )],
                },
            )
            .await?;
        Ok(answers.into_iter().find(|a| a.id != -1))
    }

    /// Creates a knowledge base seeded with the mandatory placeholder entry
    /// and monitors the creation operation to completion. Returns the new
    /// kb id parsed from the operation's resource location.
    pub async fn create_knowledge_base(&self) -> Result<String, KbError> {
        let seed = vec![QnaEntry {
            id: 0,
            questions: vec![PLACEHOLDER_QUESTION.to_string()],
            answer: PLACEHOLDER_ANSWER.to_string(),
            source: Some(ENTRY_SOURCE.to_string()),
            metadata: vec![Metadata::new(METADATA_TEAM_ID, PLACEHOLDER_TEAM_ID)],
        }];

        let op = self
            .service
            .create_knowledge_base(&self.kb_name, seed)
            .await?;
        let op_id = op.operation_id.clone();

        match operation::await_operation(
            self.service.as_ref(),
            op,
            self.operation_delay,
            OPERATION_POLL_RETRIES,
        )
        .await?
        {
            OperationOutcome::Succeeded(location) => {
                let kb_id = location
                    .rsplit('/')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        KbError::MalformedResponse(format!(
                            "operation {op_id} succeeded without a resource location"
                        ))
                    })?;
                info!("knowledge base created: {kb_id}");
                Ok(kb_id)
            }
            OperationOutcome::Failed(reason) => {
                Err(KbError::OperationFailed { id: op_id, reason })
            }
            OperationOutcome::TimedOut => Err(KbError::OperationTimedOut { id: op_id }),
        }
    }

    pub async fn publish(&self, kb_id: &str) -> Result<(), KbError> {
        self.service.publish(kb_id).await
    }

    /// Dirty when the KB changed since the last publish, or when either
    /// timestamp is missing (never published).
    pub async fn is_dirty(&self, kb_id: &str) -> Result<bool, KbError> {
        let details = self.service.details(kb_id).await?;
        match (
            details.last_changed_timestamp,
            details.last_published_timestamp,
        ) {
            (Some(changed), Some(published)) => Ok(changed > published),
            _ => Ok(true),
        }
    }

    /// Downloads the published view of the KB.
    pub async fn download_published(&self, kb_id: &str) -> Result<Vec<QnaEntry>, KbError> {
        self.service.download(kb_id, KbEnvironment::Prod).await
    }

    pub async fn delete_knowledge_base(&self, kb_id: &str) -> Result<(), KbError> {
        self.service.delete_knowledge_base(kb_id).await
    }
}
