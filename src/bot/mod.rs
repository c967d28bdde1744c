use crate::directory::IdentityNameCache;
use crate::kb::{KbError, QnaProvider};
use crate::registry::{KbConfigStore, TeamKbRegistry};
use crate::search::{SearchError, SearchIndex, SearchQueryCommand};
use crate::shared::models::{
    KbConfiguration, RankedAnswer, SearchEntry, METADATA_CREATED_BY, METADATA_UPDATED_BY,
    UNANSWERED,
};
use crate::storage::StorageError;
use log::{info, warn};
use std::sync::Arc;

pub mod routes;
pub mod turn;

use turn::{Command, TurnContext, TurnReply};

/// Attribution label when no display name is cached for an object id.
const UNKNOWN_AUTHOR: &str = "someone";

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Kb(#[from] KbError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Per-turn command state machine. Resolves answers across the published
/// ("prod") and draft ("test") views with a strict no-leak policy for
/// unpublished content, and performs idempotent create/update/delete.
pub struct CommandProcessor {
    qna: Arc<QnaProvider>,
    registry: Arc<TeamKbRegistry>,
    config_store: Arc<KbConfigStore>,
    names: Arc<IdentityNameCache>,
    index: Arc<dyn SearchIndex>,
}

impl CommandProcessor {
    pub fn new(
        qna: Arc<QnaProvider>,
        registry: Arc<TeamKbRegistry>,
        config_store: Arc<KbConfigStore>,
        names: Arc<IdentityNameCache>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            qna,
            registry,
            config_store,
            names,
            index,
        }
    }

    pub async fn handle_turn(
        &self,
        ctx: &TurnContext,
        command: Command,
    ) -> Result<Vec<TurnReply>, TurnError> {
        match command {
            Command::Ask(text) => self.answer_question(ctx, &text).await,
            Command::Save(payload) => self.save(ctx, &payload).await,
            Command::Delete(payload) => self.delete(ctx, &payload).await,
            Command::SubmitAdd(payload) => self.submit_add(ctx, &payload).await,
            Command::AddPrompt => Ok(vec![TurnReply::QuestionForm { valid: true }]),
            Command::NoOp => Ok(vec![]),
        }
    }

    /// Free-text question: published KB first, then the draft (pending
    /// notice only, never the draft answer), else record the question as
    /// unanswered so it seeds future answering.
    async fn answer_question(
        &self,
        ctx: &TurnContext,
        question: &str,
    ) -> Result<Vec<TurnReply>, TurnError> {
        if let Some(hit) = self
            .qna
            .generate_answer(false, question, &ctx.team_id)
            .await?
        {
            if hit.answer == UNANSWERED {
                return Ok(vec![TurnReply::NoAnswerYet {
                    question: question.to_string(),
                }]);
            }
            let answered_by = self.resolve_author(&hit).await?;
            return Ok(vec![TurnReply::Answer {
                question: hit
                    .questions
                    .first()
                    .cloned()
                    .unwrap_or_else(|| question.to_string()),
                answer: hit.answer,
                answered_by,
            }]);
        }

        if let Some(hit) = self
            .qna
            .generate_answer(true, question, &ctx.team_id)
            .await?
        {
            // Unpublished content must not leak: only a pending notice.
            if hit.answer == UNANSWERED {
                return Ok(vec![TurnReply::NoAnswerYet {
                    question: hit
                        .questions
                        .first()
                        .cloned()
                        .unwrap_or_else(|| question.to_string()),
                }]);
            }
            return Ok(vec![TurnReply::PendingPublish {
                question: question.to_string(),
            }]);
        }

        // Unknown everywhere: record it unanswered, tagged with the thread.
        self.qna
            .add_qna(
                question,
                UNANSWERED,
                &ctx.from.object_id,
                &ctx.team_id,
                &ctx.conversation_id,
            )
            .await?;
        self.names
            .upsert(&ctx.from.object_id, &ctx.from.name)
            .await?;
        info!(
            "unanswered question recorded: team={} by={}",
            ctx.team_id, ctx.from.object_id
        );
        Ok(vec![TurnReply::NoAnswerYet {
            question: question.to_string(),
        }])
    }

    /// Save resolves the entry by its original question text, published KB
    /// first with the draft as fallback. No match anywhere is a silent
    /// no-op (source behavior, preserved).
    async fn save(
        &self,
        ctx: &TurnContext,
        payload: &turn::SubmitActionPayload,
    ) -> Result<Vec<TurnReply>, TurnError> {
        let updated_question = payload.question_trimmed();
        if updated_question.is_empty() {
            return Ok(vec![TurnReply::EmptyQuestionValidation]);
        }
        let original_question = payload.original_question();
        let answer = payload.answer_trimmed();

        let mut replies = Vec::new();
        let saved = self
            .save_in_environment(ctx, false, &original_question, &updated_question, &answer, &mut replies)
            .await?;
        if !saved {
            self.save_in_environment(ctx, true, &original_question, &updated_question, &answer, &mut replies)
                .await?;
        }

        self.names
            .upsert(&ctx.from.object_id, &ctx.from.name)
            .await?;
        Ok(replies)
    }

    async fn save_in_environment(
        &self,
        ctx: &TurnContext,
        is_test: bool,
        original_question: &str,
        updated_question: &str,
        answer: &str,
        replies: &mut Vec<TurnReply>,
    ) -> Result<bool, TurnError> {
        match self
            .qna
            .generate_answer(is_test, original_question, &ctx.team_id)
            .await?
        {
            Some(hit) => {
                self.qna
                    .update_qna(
                        hit.id,
                        answer,
                        &ctx.from.object_id,
                        Some(updated_question),
                        original_question,
                        &ctx.team_id,
                    )
                    .await?;
                info!(
                    "entry {} updated: team={} by={}",
                    hit.id, ctx.team_id, ctx.from.object_id
                );
                replies.push(TurnReply::Updated {
                    question: updated_question.to_string(),
                    answer: (!answer.is_empty()).then(|| answer.to_string()),
                    updated_by: ctx.from.name.clone(),
                });
                Ok(true)
            }
            None => {
                if is_test {
                    replies.push(TurnReply::QuestionNotAvailable);
                }
                Ok(false)
            }
        }
    }

    /// Delete resolves via the published KB only; a draft-only entry gets a
    /// pending notice instead (deleting unpublished content is unsupported).
    async fn delete(
        &self,
        ctx: &TurnContext,
        payload: &turn::SubmitActionPayload,
    ) -> Result<Vec<TurnReply>, TurnError> {
        let question = payload.original_question();

        if let Some(hit) = self
            .qna
            .generate_answer(false, &question, &ctx.team_id)
            .await?
        {
            self.qna.delete_qna(hit.id, &ctx.team_id).await?;
            self.names
                .upsert(&ctx.from.object_id, &ctx.from.name)
                .await?;
            info!(
                "entry {} deleted: team={} by={}",
                hit.id, ctx.team_id, ctx.from.object_id
            );
            return Ok(vec![TurnReply::Deleted {
                question,
                answer: hit.answer,
                deleted_by: ctx.from.name.clone(),
            }]);
        }

        if self
            .qna
            .generate_answer(true, &question, &ctx.team_id)
            .await?
            .is_some()
        {
            return Ok(vec![TurnReply::PendingDelete]);
        }

        Ok(vec![])
    }

    /// Pure validation + creation from the input form. A blank question
    /// re-renders the form flagged invalid instead of committing.
    async fn submit_add(
        &self,
        ctx: &TurnContext,
        payload: &turn::SubmitActionPayload,
    ) -> Result<Vec<TurnReply>, TurnError> {
        let question = payload.question_trimmed();
        if question.is_empty() {
            return Ok(vec![TurnReply::QuestionForm { valid: false }]);
        }
        let answer = payload.answer_trimmed();
        let stored_answer = if answer.is_empty() { UNANSWERED } else { &answer };

        self.qna
            .add_qna(
                &question,
                stored_answer,
                &ctx.from.object_id,
                &ctx.team_id,
                &ctx.conversation_id,
            )
            .await?;
        self.names
            .upsert(&ctx.from.object_id, &ctx.from.name)
            .await?;
        info!(
            "entry added: team={} by={}",
            ctx.team_id, ctx.from.object_id
        );

        Ok(vec![TurnReply::Added {
            question,
            answer: (!answer.is_empty()).then_some(answer),
            added_by: ctx.from.name.clone(),
        }])
    }

    /// Bot added to a team: map the team to the KB already on record — the
    /// persisted configuration wins over mappings, so a KB provisioned by
    /// the publish cycle but not yet mapped to any team is reused, never
    /// duplicated. A fresh KB is created and published only when neither a
    /// configuration nor any mapping exists. Two concurrent first-runs can
    /// race here (check-then-create is only optimistically exclusive);
    /// accepted source behavior.
    pub async fn on_members_added(&self, team_id: &str) -> Result<Vec<TurnReply>, TurnError> {
        if let Some(config) = self.config_store.get().await? {
            if self.registry.get(team_id).await?.is_none() {
                self.registry.upsert(team_id, &config.kb_id).await?;
            }
            return Ok(vec![TurnReply::Welcome]);
        }

        let mappings = self.registry.all().await?;
        if let Some(existing) = mappings.first() {
            self.registry.upsert(team_id, &existing.kb_id).await?;
            return Ok(vec![TurnReply::Welcome]);
        }

        let kb_id = self.qna.create_knowledge_base().await?;
        self.config_store
            .create(&KbConfiguration {
                kb_id: kb_id.clone(),
            })
            .await?;
        self.registry.upsert(team_id, &kb_id).await?;
        self.qna.publish(&kb_id).await?;
        info!("kb {kb_id} created and mapped for team {team_id}");

        Ok(vec![TurnReply::Welcome])
    }

    /// Messaging-extension query: named filter commands or free-text search
    /// over the published index, scoped to the team.
    pub async fn query_extension(
        &self,
        command_id: &str,
        text: &str,
        team_id: &str,
    ) -> Result<Vec<SearchEntry>, TurnError> {
        let command = SearchQueryCommand::resolve(command_id, text);
        let encoded = urlencoding::encode(team_id).into_owned();
        Ok(self.index.query(&command, &encoded).await?)
    }

    async fn resolve_author(&self, hit: &RankedAnswer) -> Result<String, TurnError> {
        let object_id = hit
            .metadata_value(METADATA_UPDATED_BY)
            .or_else(|| hit.metadata_value(METADATA_CREATED_BY));
        match object_id {
            Some(id) => match self.names.get_name(id).await? {
                Some(name) => Ok(name),
                None => {
                    warn!("no cached display name for object id {id}");
                    Ok(UNKNOWN_AUTHOR.to_string())
                }
            },
            None => Ok(UNKNOWN_AUTHOR.to_string()),
        }
    }
}
