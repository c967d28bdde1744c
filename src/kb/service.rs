use crate::shared::models::{KbDetails, KbEnvironment, Metadata, QnaEntry, RankedAnswer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::KbError;

const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Remote knowledge service surface. Create/update/publish/download manage
/// the KB lifecycle; `generate_answer` queries either the draft ("Test") or
/// published ("Prod") view of the same KB.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn create_knowledge_base(
        &self,
        name: &str,
        seed: Vec<QnaEntry>,
    ) -> Result<Operation, KbError>;

    async fn get_operation(&self, operation_id: &str) -> Result<Operation, KbError>;

    async fn update_knowledge_base(
        &self,
        kb_id: &str,
        diff: UpdateKbRequest,
    ) -> Result<(), KbError>;

    async fn publish(&self, kb_id: &str) -> Result<(), KbError>;

    async fn details(&self, kb_id: &str) -> Result<KbDetails, KbError>;

    async fn download(
        &self,
        kb_id: &str,
        environment: KbEnvironment,
    ) -> Result<Vec<QnaEntry>, KbError>;

    async fn delete_knowledge_base(&self, kb_id: &str) -> Result<(), KbError>;

    async fn generate_answer(
        &self,
        kb_id: &str,
        query: AnswerQuery,
    ) -> Result<Vec<RankedAnswer>, KbError>;
}

/// Long-running operation handle returned by KB creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: String,
    pub operation_state: OperationState,
    #[serde(default)]
    pub resource_location: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Running)
    }
}

/// Diff applied to a KB: add new entries, update existing ones in place,
/// delete by id. Updates carry a question add/delete list instead of a
/// destructive replace so the entry id is preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateKbRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<AddSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<DeleteSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSection {
    #[serde(rename = "qnaList")]
    pub qna_list: Vec<QnaEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSection {
    #[serde(rename = "qnaList")]
    pub qna_list: Vec<UpdateQna>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQna {
    pub id: i64,
    pub answer: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<QuestionsDiff>,
    #[serde(rename = "metadataAdd", default)]
    pub metadata_add: Vec<Metadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsDiff {
    pub add: Vec<String>,
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSection {
    pub ids: Vec<i64>,
}

/// Ranked-answer query. `strict_filters` scope results by metadata; results
/// below `score_threshold` come back as the sentinel no-match on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerQuery {
    pub is_test: bool,
    pub question: String,
    pub score_threshold: f64,
    pub strict_filters: Vec<Metadata>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKbRequest<'a> {
    name: &'a str,
    qna_list: Vec<QnaEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResponse {
    #[serde(default)]
    qna_documents: Vec<QnaEntry>,
}

#[derive(Debug, Deserialize)]
struct GenerateAnswerResponse {
    #[serde(default)]
    answers: Vec<RankedAnswer>,
}

/// REST client for the knowledge service.
pub struct RestKnowledgeService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RestKnowledgeService {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

#[async_trait]
impl KnowledgeService for RestKnowledgeService {
    async fn create_knowledge_base(
        &self,
        name: &str,
        seed: Vec<QnaEntry>,
    ) -> Result<Operation, KbError> {
        let response = self
            .client
            .post(self.url("/knowledgebases/create"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&CreateKbRequest {
                name,
                qna_list: seed,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_operation(&self, operation_id: &str) -> Result<Operation, KbError> {
        let response = self
            .client
            .get(self.url(&format!("/operations/{operation_id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn update_knowledge_base(
        &self,
        kb_id: &str,
        diff: UpdateKbRequest,
    ) -> Result<(), KbError> {
        self.client
            .patch(self.url(&format!("/knowledgebases/{kb_id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&diff)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn publish(&self, kb_id: &str) -> Result<(), KbError> {
        self.client
            .post(self.url(&format!("/knowledgebases/{kb_id}/publish")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn details(&self, kb_id: &str) -> Result<KbDetails, KbError> {
        let response = self
            .client
            .get(self.url(&format!("/knowledgebases/{kb_id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn download(
        &self,
        kb_id: &str,
        environment: KbEnvironment,
    ) -> Result<Vec<QnaEntry>, KbError> {
        let response = self
            .client
            .get(self.url(&format!("/knowledgebases/{kb_id}/{environment}/qna")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let body: DownloadResponse = response.json().await?;
        Ok(body.qna_documents)
    }

    async fn delete_knowledge_base(&self, kb_id: &str) -> Result<(), KbError> {
        self.client
            .delete(self.url(&format!("/knowledgebases/{kb_id}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn generate_answer(
        &self,
        kb_id: &str,
        query: AnswerQuery,
    ) -> Result<Vec<RankedAnswer>, KbError> {
        let response = self
            .client
            .post(self.url(&format!("/knowledgebases/{kb_id}/generateAnswer")))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&query)
            .send()
            .await?
            .error_for_status()?;
        let body: GenerateAnswerResponse = response.json().await?;
        Ok(body.answers)
    }
}
