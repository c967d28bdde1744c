use crate::shared::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;

use super::turn::{Actor, Command, SubmitActionPayload, TurnContext, TurnReply};

#[derive(Debug, Deserialize)]
pub struct BotActivity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    pub from: ChannelAccount,
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub recipient: Option<ChannelAccount>,
    #[serde(rename = "replyToId", default)]
    pub reply_to_id: Option<String>,
    #[serde(rename = "channelData", default)]
    pub channel_data: Option<ChannelData>,
    #[serde(rename = "membersAdded", default)]
    pub members_added: Vec<ChannelAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "aadObjectId", default)]
    pub aad_object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
    #[serde(rename = "conversationType", default)]
    pub conversation_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelData {
    #[serde(default)]
    pub team: Option<TeamInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TeamInfo {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ExtensionQuery {
    #[serde(rename = "commandId", default)]
    command_id: String,
    #[serde(default)]
    text: String,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/api/messages", post(handle_activity))
}

async fn handle_activity(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<BotActivity>,
) -> impl IntoResponse {
    match activity.activity_type.as_str() {
        "message" => handle_message(state, activity).await,
        "conversationUpdate" => handle_conversation_update(state, activity).await,
        "invoke" => handle_invoke(state, activity).await,
        other => {
            info!("ignoring activity type {other}");
            (StatusCode::OK, Json(serde_json::json!([])))
        }
    }
}

async fn handle_message(state: Arc<AppState>, activity: BotActivity) -> (StatusCode, Json<serde_json::Value>) {
    let team_id = match team_id_of(&activity) {
        Some(id) => id,
        None => {
            warn!(
                "message outside a team channel: conversation={}",
                activity.conversation.id
            );
            return reply(vec![TurnReply::NotInScope]);
        }
    };

    let ctx = TurnContext {
        team_id,
        conversation_id: activity.conversation.id.clone(),
        reply_to_id: activity.reply_to_id.clone(),
        from: actor_of(&activity.from),
    };

    let payload: Option<SubmitActionPayload> = activity
        .value
        .and_then(|v| serde_json::from_value(v).ok());
    let text = strip_mentions(activity.text.as_deref().unwrap_or_default());
    let command = Command::parse(&text, payload);

    match state.processor.handle_turn(&ctx, command).await {
        Ok(replies) => reply(replies),
        Err(e) => {
            error!("turn failed: team={} error={e}", ctx.team_id);
            reply(vec![TurnReply::GenericError])
        }
    }
}

async fn handle_conversation_update(
    state: Arc<AppState>,
    activity: BotActivity,
) -> (StatusCode, Json<serde_json::Value>) {
    let bot_added = activity
        .recipient
        .as_ref()
        .map(|recipient| activity.members_added.iter().any(|m| m.id == recipient.id))
        .unwrap_or(false);
    let team_id = team_id_of(&activity);

    if let (true, Some(team_id)) = (bot_added, team_id) {
        match state.processor.on_members_added(&team_id).await {
            Ok(replies) => return reply(replies),
            Err(e) => {
                error!("member-added handling failed: team={team_id} error={e}");
                return reply(vec![TurnReply::GenericError]);
            }
        }
    }
    (StatusCode::OK, Json(serde_json::json!([])))
}

async fn handle_invoke(
    state: Arc<AppState>,
    activity: BotActivity,
) -> (StatusCode, Json<serde_json::Value>) {
    let team_id = match team_id_of(&activity) {
        Some(id) => id,
        None => return (StatusCode::OK, Json(serde_json::json!([]))),
    };

    let query: ExtensionQuery = match activity
        .value
        .and_then(|v| serde_json::from_value(v).ok())
    {
        Some(q) => q,
        None => return (StatusCode::OK, Json(serde_json::json!([]))),
    };

    match state
        .processor
        .query_extension(&query.command_id, &query.text, &team_id)
        .await
    {
        Ok(entries) => (
            StatusCode::OK,
            Json(serde_json::to_value(entries).unwrap_or_else(|_| serde_json::json!([]))),
        ),
        Err(e) => {
            error!("extension query failed: team={team_id} error={e}");
            (StatusCode::OK, Json(serde_json::json!([])))
        }
    }
}

fn team_id_of(activity: &BotActivity) -> Option<String> {
    if activity.conversation.conversation_type.as_deref() != Some("channel") {
        return None;
    }
    activity
        .channel_data
        .as_ref()
        .and_then(|d| d.team.as_ref())
        .map(|t| t.id.clone())
}

/// Channel messages address the bot with `<at>...</at>` mention markup;
/// command matching operates on the text with mentions removed.
fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<at>") {
        out.push_str(&rest[..start]);
        rest = match rest[start..].find("</at>") {
            Some(end) => &rest[start + end + "</at>".len()..],
            None => &rest[start + "<at>".len()..],
        };
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn actor_of(account: &ChannelAccount) -> Actor {
    Actor {
        object_id: account
            .aad_object_id
            .clone()
            .unwrap_or_else(|| account.id.clone()),
        name: account.name.clone().unwrap_or_default(),
    }
}

fn reply(replies: Vec<TurnReply>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::to_value(&replies).unwrap_or_else(|_| serde_json::json!([]))),
    )
}
