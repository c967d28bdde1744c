use async_trait::async_trait;
use kbserver::kb::service::{
    AnswerQuery, KnowledgeService, Operation, OperationState, UpdateKbRequest,
};
use kbserver::kb::KbError;
use kbserver::shared::models::{
    KbDetails, KbEnvironment, Metadata, QnaEntry, RankedAnswer, METADATA_CREATED_BY,
    METADATA_TEAM_ID,
};
use kbserver::storage::{MemoryTableStore, StorageError, TableStore};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scriptable in-process stand-in for the remote knowledge service.
/// Counters record lifecycle calls; `polls` scripts the operation states
/// returned by successive `get_operation` calls.
#[derive(Default)]
pub struct FakeKnowledgeService {
    pub create_calls: AtomicUsize,
    pub publish_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub polls: Mutex<VecDeque<Operation>>,
    pub details: Mutex<KbDetails>,
    pub prod_answers: Mutex<Vec<RankedAnswer>>,
    pub test_answers: Mutex<Vec<RankedAnswer>>,
    pub diffs: Mutex<Vec<UpdateKbRequest>>,
    pub published: Mutex<Vec<QnaEntry>>,
}

pub fn running_operation() -> Operation {
    Operation {
        operation_id: "op-1".into(),
        operation_state: OperationState::Running,
        resource_location: None,
        error_message: None,
    }
}

pub fn succeeded_operation(kb_id: &str) -> Operation {
    Operation {
        operation_id: "op-1".into(),
        operation_state: OperationState::Succeeded,
        resource_location: Some(format!("/knowledgebases/{kb_id}")),
        error_message: None,
    }
}

pub fn failed_operation(reason: &str) -> Operation {
    Operation {
        operation_id: "op-1".into(),
        operation_state: OperationState::Failed,
        resource_location: None,
        error_message: Some(reason.to_string()),
    }
}

pub fn ranked_answer(id: i64, question: &str, answer: &str, author: &str) -> RankedAnswer {
    RankedAnswer {
        id,
        questions: vec![question.to_string()],
        answer: answer.to_string(),
        score: 90.0,
        metadata: vec![
            Metadata::new(METADATA_CREATED_BY, author),
            Metadata::new(METADATA_TEAM_ID, "team-1"),
        ],
    }
}

#[async_trait]
impl KnowledgeService for FakeKnowledgeService {
    async fn create_knowledge_base(
        &self,
        _name: &str,
        _seed: Vec<QnaEntry>,
    ) -> Result<Operation, KbError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(running_operation())
    }

    async fn get_operation(&self, _operation_id: &str) -> Result<Operation, KbError> {
        let next = self.polls.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| succeeded_operation("kb-fresh")))
    }

    async fn update_knowledge_base(
        &self,
        _kb_id: &str,
        diff: UpdateKbRequest,
    ) -> Result<(), KbError> {
        self.diffs.lock().unwrap().push(diff);
        Ok(())
    }

    async fn publish(&self, _kb_id: &str) -> Result<(), KbError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn details(&self, _kb_id: &str) -> Result<KbDetails, KbError> {
        Ok(self.details.lock().unwrap().clone())
    }

    async fn download(
        &self,
        _kb_id: &str,
        _environment: KbEnvironment,
    ) -> Result<Vec<QnaEntry>, KbError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.published.lock().unwrap().clone())
    }

    async fn delete_knowledge_base(&self, _kb_id: &str) -> Result<(), KbError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate_answer(
        &self,
        _kb_id: &str,
        query: AnswerQuery,
    ) -> Result<Vec<RankedAnswer>, KbError> {
        let answers = if query.is_test {
            self.test_answers.lock().unwrap().clone()
        } else {
            self.prod_answers.lock().unwrap().clone()
        };
        Ok(answers)
    }
}

/// Table store whose writes always fail, for exercising the compensation
/// path; reads delegate to an in-memory store.
#[derive(Default)]
pub struct FailingTableStore {
    inner: MemoryTableStore,
}

#[async_trait]
impl TableStore for FailingTableStore {
    async fn get(&self, partition: &str, row: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(partition, row).await
    }

    async fn put(&self, _partition: &str, _row: &str, _value: Value) -> Result<(), StorageError> {
        Err(StorageError::Backend("precondition failed".into()))
    }

    async fn delete(&self, partition: &str, row: &str) -> Result<(), StorageError> {
        self.inner.delete(partition, row).await
    }

    async fn scan(&self, partition: &str) -> Result<Vec<Value>, StorageError> {
        self.inner.scan(partition).await
    }
}
