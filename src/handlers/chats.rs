use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::chat::events::ServerEvent;
use crate::entities::{Channel, ConversationStatus, SenderRole};
use crate::entities::{conversation, message};
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::AppState;

/// Customer-facing chat routes. The REST surface mirrors the socket
/// protocol so clients without a live socket still converge: appends and
/// reads broadcast the same events to connected parties.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_chats))
        .route("/{channel}", get(get_chat))
        .route("/{channel}/messages", post(post_message))
        .route("/{channel}/read", post(mark_read))
}

/// Back-office chat routes, role-gated where they are nested.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_all_chats))
        .route("/{user_id}/{channel}", get(get_user_chat))
        .route("/{user_id}/{channel}/messages", post(post_admin_message))
        .route("/{user_id}/{channel}/read", post(mark_read_as_admin))
        .route("/{user_id}/{channel}/close", post(close_chat))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageBody {
    content: String,
    client_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatListQuery {
    channel: Option<String>,
    status: Option<String>,
}

async fn list_chats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let conversations = state.services.chats.list_for_user(user.id).await?;
    Ok(success_response(conversations))
}

async fn get_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(channel): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;
    let detail = state.services.chats.get_conversation(user.id, channel).await?;
    Ok(success_response(detail))
}

async fn post_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(channel): Path<String>,
    Json(body): Json<PostMessageBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;
    let role = if user.is_admin() {
        SenderRole::Admin
    } else {
        SenderRole::User
    };

    let lock = state.hub.conversation_lock(user.id, channel);
    let _guard = lock.lock().await;

    let (message, conversation) = state
        .services
        .chats
        .append_message(user.id, channel, user.id, &user.name, role, &body.content)
        .await?;

    broadcast_append(
        &state,
        user.id,
        channel,
        role,
        &message,
        &conversation,
        body.client_ref,
    );

    Ok(created_response(message))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(channel): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;
    let conversation = state
        .services
        .chats
        .mark_read_for(user.id, channel, SenderRole::User)
        .await?;
    broadcast_unread(&state, user.id, channel, &conversation);
    Ok(success_response(conversation))
}

async fn list_all_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = query.channel.as_deref().map(Channel::parse).transpose()?;
    let status = query
        .status
        .as_deref()
        .map(ConversationStatus::parse)
        .transpose()?;
    let conversations = state.services.chats.list_all(channel, status).await?;
    Ok(success_response(conversations))
}

async fn get_user_chat(
    State(state): State<AppState>,
    Path((user_id, channel)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;
    let detail = state.services.chats.get_conversation(user_id, channel).await?;
    Ok(success_response(detail))
}

async fn post_admin_message(
    State(state): State<AppState>,
    admin: AuthUser,
    Path((user_id, channel)): Path<(Uuid, String)>,
    Json(body): Json<PostMessageBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;

    let lock = state.hub.conversation_lock(user_id, channel);
    let _guard = lock.lock().await;

    let (message, conversation) = state
        .services
        .chats
        .append_message(
            user_id,
            channel,
            admin.id,
            &admin.name,
            SenderRole::Admin,
            &body.content,
        )
        .await?;

    broadcast_append(
        &state,
        user_id,
        channel,
        SenderRole::Admin,
        &message,
        &conversation,
        body.client_ref,
    );

    Ok(created_response(message))
}

async fn mark_read_as_admin(
    State(state): State<AppState>,
    Path((user_id, channel)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;
    let conversation = state
        .services
        .chats
        .mark_read_for(user_id, channel, SenderRole::Admin)
        .await?;
    broadcast_unread(&state, user_id, channel, &conversation);
    Ok(success_response(conversation))
}

async fn close_chat(
    State(state): State<AppState>,
    Path((user_id, channel)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ServiceError> {
    let channel = Channel::parse(&channel)?;
    let conversation = state.services.chats.get_or_create(user_id, channel).await?;
    let conversation = state.services.chats.close(conversation.id).await?;
    Ok(success_response(conversation))
}

fn broadcast_append(
    state: &AppState,
    owner: Uuid,
    channel: Channel,
    role: SenderRole,
    message: &message::Model,
    conversation: &conversation::Model,
    client_ref: Option<String>,
) {
    state.hub.publish(
        owner,
        channel,
        ServerEvent::NewMessage {
            message: message.clone(),
            conversation: conversation.clone(),
            client_ref,
        },
    );
    match role {
        SenderRole::User => state.hub.publish_admins(ServerEvent::NewUserMessage {
            message: message.clone(),
            conversation: conversation.clone(),
        }),
        SenderRole::Admin => state.hub.publish_admins(ServerEvent::NewAdminMessage {
            message: message.clone(),
            conversation: conversation.clone(),
        }),
    }
}

fn broadcast_unread(
    state: &AppState,
    owner: Uuid,
    channel: Channel,
    conversation: &conversation::Model,
) {
    state.hub.publish(
        owner,
        channel,
        ServerEvent::UnreadUpdated {
            conversation: conversation.clone(),
        },
    );
    state.hub.publish_admins(ServerEvent::UnreadUpdated {
        conversation: conversation.clone(),
    });
}
