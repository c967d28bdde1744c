mod common;

use common::{ranked_answer, succeeded_operation, FakeKnowledgeService};
use kbserver::bot::turn::{Actor, Command, PayloadDetails, SubmitActionPayload, TurnContext, TurnReply};
use kbserver::bot::CommandProcessor;
use kbserver::directory::IdentityNameCache;
use kbserver::kb::QnaProvider;
use kbserver::registry::{KbConfigStore, TeamKbRegistry};
use kbserver::search::MemorySearchIndex;
use kbserver::shared::models::{
    KbConfiguration, METADATA_CONVERSATION_ID, METADATA_TEAM_ID, UNANSWERED,
};
use kbserver::storage::MemoryTableStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct World {
    service: Arc<FakeKnowledgeService>,
    processor: CommandProcessor,
    registry: Arc<TeamKbRegistry>,
    config_store: Arc<KbConfigStore>,
    names: Arc<IdentityNameCache>,
}

async fn world(provisioned: bool) -> World {
    let service = Arc::new(FakeKnowledgeService::default());
    let table = Arc::new(MemoryTableStore::new());
    let config_store = Arc::new(KbConfigStore::new(table.clone()));
    let registry = Arc::new(TeamKbRegistry::new(table.clone()));
    let names = Arc::new(IdentityNameCache::new(table));
    if provisioned {
        config_store
            .create(&KbConfiguration { kb_id: "kb-1".into() })
            .await
            .unwrap();
    }
    let qna = Arc::new(
        QnaProvider::new(service.clone(), config_store.clone(), "teamknowledge", 50.0)
            .with_operation_delay(Duration::from_millis(1)),
    );
    let processor = CommandProcessor::new(
        qna,
        registry.clone(),
        config_store.clone(),
        names.clone(),
        Arc::new(MemorySearchIndex::new()),
    );
    World {
        service,
        processor,
        registry,
        config_store,
        names,
    }
}

fn ctx() -> TurnContext {
    TurnContext {
        team_id: "team-1".into(),
        conversation_id: "19:conv/1".into(),
        reply_to_id: None,
        from: Actor {
            object_id: "aad-ada".into(),
            name: "Ada".into(),
        },
    }
}

#[tokio::test]
async fn published_answer_carries_attribution() {
    let w = world(true).await;
    w.names.upsert("aad-ada", "Ada").await.unwrap();
    w.service
        .prod_answers
        .lock()
        .unwrap()
        .push(ranked_answer(3, "How do I deploy?", "Run the pipeline", "aad-ada"));

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Ask("how do i deploy".into()))
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![TurnReply::Answer {
            question: "How do I deploy?".into(),
            answer: "Run the pipeline".into(),
            answered_by: "Ada".into(),
        }]
    );
}

#[tokio::test]
async fn draft_answer_is_withheld() {
    let w = world(true).await;
    w.service
        .test_answers
        .lock()
        .unwrap()
        .push(ranked_answer(5, "How do I deploy?", "secret draft", "aad-ada"));

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Ask("how do i deploy".into()))
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![TurnReply::PendingPublish {
            question: "how do i deploy".into(),
        }]
    );
    let rendered = serde_json::to_string(&replies).unwrap();
    assert!(!rendered.contains("secret draft"));
}

#[tokio::test]
async fn unanswered_hit_reports_no_answer_yet() {
    let w = world(true).await;
    w.service
        .prod_answers
        .lock()
        .unwrap()
        .push(ranked_answer(5, "How do I deploy?", UNANSWERED, "aad-ada"));

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Ask("how do i deploy".into()))
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![TurnReply::NoAnswerYet {
            question: "how do i deploy".into(),
        }]
    );
    assert!(w.service.diffs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_question_is_recorded_unanswered() {
    let w = world(true).await;

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Ask("what is the oncall rota".into()))
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![TurnReply::NoAnswerYet {
            question: "what is the oncall rota".into(),
        }]
    );
    let diffs = w.service.diffs.lock().unwrap();
    let added = &diffs[0].add.as_ref().unwrap().qna_list[0];
    assert_eq!(added.answer, UNANSWERED);
    assert_eq!(added.metadata_value(METADATA_TEAM_ID), Some("team-1"));
    assert_eq!(
        added.metadata_value(METADATA_CONVERSATION_ID),
        Some("19%3Aconv%2F1")
    );
    assert_eq!(w.names.get_name("aad-ada").await.unwrap().as_deref(), Some("Ada"));
}

#[tokio::test]
async fn save_with_blank_question_is_rejected() {
    let w = world(true).await;
    let payload = SubmitActionPayload {
        question: Some("   ".into()),
        answer: Some("A".into()),
        details: None,
    };

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Save(payload))
        .await
        .unwrap();

    assert_eq!(replies, vec![TurnReply::EmptyQuestionValidation]);
    assert!(w.service.diffs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn save_updates_published_entry_preserving_its_id() {
    let w = world(true).await;
    w.service
        .prod_answers
        .lock()
        .unwrap()
        .push(ranked_answer(42, "Old question", "old answer", "aad-ada"));
    let payload = SubmitActionPayload {
        question: Some("New question".into()),
        answer: Some("new answer".into()),
        details: Some(PayloadDetails {
            question: Some("Old question".into()),
        }),
    };

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Save(payload))
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![TurnReply::Updated {
            question: "New question".into(),
            answer: Some("new answer".into()),
            updated_by: "Ada".into(),
        }]
    );
    let diffs = w.service.diffs.lock().unwrap();
    let update = &diffs[0].update.as_ref().unwrap().qna_list[0];
    assert_eq!(update.id, 42);
    let questions = update.questions.as_ref().unwrap();
    assert_eq!(questions.add, vec!["New question".to_string()]);
    assert_eq!(questions.delete, vec!["Old question".to_string()]);
}

#[tokio::test]
async fn delete_of_draft_only_entry_is_pending() {
    let w = world(true).await;
    w.service
        .test_answers
        .lock()
        .unwrap()
        .push(ranked_answer(5, "Draft question", "draft answer", "aad-ada"));
    let payload = SubmitActionPayload {
        question: None,
        answer: None,
        details: Some(PayloadDetails {
            question: Some("Draft question".into()),
        }),
    };

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Delete(payload))
        .await
        .unwrap();

    assert_eq!(replies, vec![TurnReply::PendingDelete]);
    assert!(w.service.diffs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delete_of_published_entry_removes_it() {
    let w = world(true).await;
    w.service
        .prod_answers
        .lock()
        .unwrap()
        .push(ranked_answer(3, "Old question", "old answer", "aad-ada"));
    let payload = SubmitActionPayload {
        question: None,
        answer: None,
        details: Some(PayloadDetails {
            question: Some("Old question".into()),
        }),
    };

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::Delete(payload))
        .await
        .unwrap();

    assert_eq!(
        replies,
        vec![TurnReply::Deleted {
            question: "Old question".into(),
            answer: "old answer".into(),
            deleted_by: "Ada".into(),
        }]
    );
    let diffs = w.service.diffs.lock().unwrap();
    assert_eq!(diffs[0].delete.as_ref().unwrap().ids, vec![3]);
}

#[tokio::test]
async fn submit_with_blank_question_rerenders_the_form() {
    let w = world(true).await;
    let payload = SubmitActionPayload {
        question: Some("".into()),
        answer: Some("A".into()),
        details: None,
    };

    let replies = w
        .processor
        .handle_turn(&ctx(), Command::SubmitAdd(payload))
        .await
        .unwrap();

    assert_eq!(replies, vec![TurnReply::QuestionForm { valid: false }]);
    assert!(w.service.diffs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn member_added_reuses_kb_provisioned_by_the_publish_cycle() {
    // Configuration exists (startup cycle already provisioned) but no team
    // has been mapped yet: the event must map, never create a second KB.
    let w = world(true).await;

    let replies = w.processor.on_members_added("team-1").await.unwrap();

    assert_eq!(replies, vec![TurnReply::Welcome]);
    assert_eq!(w.service.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(w.config_store.get().await.unwrap().unwrap().kb_id, "kb-1");
    assert_eq!(w.registry.get("team-1").await.unwrap().unwrap().kb_id, "kb-1");
}

#[tokio::test]
async fn member_added_bootstraps_kb_and_maps_later_teams_to_it() {
    let w = world(false).await;
    w.service
        .polls
        .lock()
        .unwrap()
        .push_back(succeeded_operation("kb-7"));

    let replies = w.processor.on_members_added("team-1").await.unwrap();
    assert_eq!(replies, vec![TurnReply::Welcome]);
    assert_eq!(w.service.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(w.service.publish_calls.load(Ordering::SeqCst), 1);
    assert_eq!(w.config_store.get().await.unwrap().unwrap().kb_id, "kb-7");
    assert_eq!(w.registry.get("team-1").await.unwrap().unwrap().kb_id, "kb-7");

    // A second team reuses the existing KB instead of provisioning again.
    w.processor.on_members_added("team-2").await.unwrap();
    assert_eq!(w.service.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(w.registry.get("team-2").await.unwrap().unwrap().kb_id, "kb-7");
}
