use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{AuthError, AuthService, AuthUser};
use crate::chat::events::{ClientEvent, ServerEvent};
use crate::entities::{Channel, SenderRole};
use crate::errors::ServiceError;
use crate::AppState;

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// WebSocket entry point. Authentication happens before the upgrade: the
/// bearer token travels in the `token` query parameter because browsers
/// cannot set headers on WebSocket requests. A missing token is an
/// authentication failure, the same as an invalid one.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match authenticate(&state.auth, query.token.as_deref()) {
        Ok(user) => ws.on_upgrade(move |socket| handle_socket(socket, state, user)),
        Err(err) => err.into_response(),
    }
}

fn authenticate(auth: &AuthService, token: Option<&str>) -> Result<AuthUser, AuthError> {
    match token {
        Some(token) => auth.validate_token(token),
        None => Err(AuthError::MissingAuth),
    }
}

/// One task per subscription forwards room broadcasts into the connection's
/// outbound queue; the writer task drains that queue onto the socket.
struct Connection {
    state: AppState,
    user: AuthUser,
    out: mpsc::Sender<ServerEvent>,
    subscriptions: HashMap<String, JoinHandle<()>>,
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    debug!(user_id = %user.id, role = ?user.role, "socket connected");

    let (mut sink, mut stream) = socket.split();
    let (out, mut outbound) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to encode server event"),
            }
        }
    });

    let mut conn = Connection {
        state,
        user,
        out,
        subscriptions: HashMap::new(),
    };

    // Admins always listen to the shared inbox room.
    if conn.user.is_admin() {
        let rx = conn.state.hub.subscribe_admins();
        conn.subscriptions
            .insert("admins".to_string(), forward(rx, conn.out.clone()));
    }

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => conn.dispatch(event).await,
                Err(err) => {
                    conn.send_error(
                        ServiceError::ValidationError(format!("malformed event: {err}")),
                        None,
                    )
                    .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    for (_, task) in conn.subscriptions.drain() {
        task.abort();
    }
    writer.abort();
    debug!(user_id = %conn.user.id, "socket disconnected");
}

fn forward(
    mut rx: broadcast::Receiver<ServerEvent>,
    out: mpsc::Sender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "socket subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

impl Connection {
    async fn dispatch(&mut self, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinChannel { channel, user_id } => {
                self.join_channel(&channel, user_id).await
            }
            ClientEvent::LeaveChannel { channel, user_id } => {
                self.leave_channel(&channel, user_id)
            }
            ClientEvent::SendMessage {
                channel,
                content,
                client_ref,
            } => {
                let outcome = self.send_message(&channel, &content, client_ref.clone()).await;
                if let Err(err) = outcome {
                    self.send_error(err, client_ref).await;
                }
                return;
            }
            ClientEvent::SendAdminMessage {
                user_id,
                channel,
                content,
                client_ref,
            } => {
                let outcome = self
                    .send_admin_message(user_id, &channel, &content, client_ref.clone())
                    .await;
                if let Err(err) = outcome {
                    self.send_error(err, client_ref).await;
                }
                return;
            }
            ClientEvent::MarkRead { channel, user_id } => self.mark_read(&channel, user_id).await,
            ClientEvent::Typing { channel, user_id } => {
                self.relay_typing(&channel, user_id, true).await
            }
            ClientEvent::StopTyping { channel, user_id } => {
                self.relay_typing(&channel, user_id, false).await
            }
        };

        if let Err(err) = result {
            self.send_error(err, None).await;
        }
    }

    /// The conversation a request targets: admins may address any customer's
    /// conversation, customers only their own.
    fn resolve_owner(&self, requested: Option<Uuid>) -> Result<Uuid, ServiceError> {
        match requested {
            Some(target) if self.user.is_admin() => Ok(target),
            Some(target) if target == self.user.id => Ok(target),
            Some(_) => Err(ServiceError::Forbidden(
                "cannot address another customer's conversation".into(),
            )),
            None => Ok(self.user.id),
        }
    }

    fn sender_role(&self) -> SenderRole {
        if self.user.is_admin() {
            SenderRole::Admin
        } else {
            SenderRole::User
        }
    }

    async fn join_channel(
        &mut self,
        channel: &str,
        user_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let channel = Channel::parse(channel)?;
        let owner = self.resolve_owner(user_id)?;

        let key = format!("{}:{}", owner, channel);
        if !self.subscriptions.contains_key(&key) {
            let rx = self.state.hub.subscribe(owner, channel);
            self.subscriptions.insert(key, forward(rx, self.out.clone()));
        }

        // An admin opening a conversation has seen it; reconcile unread state
        // before snapshotting so the counters in the snapshot are current.
        if self.user.is_admin() {
            let conversation = self
                .state
                .services
                .chats
                .mark_read_for(owner, channel, SenderRole::Admin)
                .await?;
            self.state.hub.publish(
                owner,
                channel,
                ServerEvent::UnreadUpdated {
                    conversation: conversation.clone(),
                },
            );
            self.state
                .hub
                .publish_admins(ServerEvent::UnreadUpdated { conversation });
        }

        let detail = self
            .state
            .services
            .chats
            .get_conversation(owner, channel)
            .await?;
        let _ = self
            .out
            .send(ServerEvent::JoinedChannel {
                channel,
                conversation: detail.conversation,
                messages: detail.messages,
            })
            .await;

        Ok(())
    }

    fn leave_channel(&mut self, channel: &str, user_id: Option<Uuid>) -> Result<(), ServiceError> {
        let channel = Channel::parse(channel)?;
        let owner = self.resolve_owner(user_id)?;
        if let Some(task) = self.subscriptions.remove(&format!("{}:{}", owner, channel)) {
            task.abort();
        }
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &str,
        content: &str,
        client_ref: Option<String>,
    ) -> Result<(), ServiceError> {
        let channel = Channel::parse(channel)?;
        let owner = self.user.id;
        let role = self.sender_role();

        let lock = self.state.hub.conversation_lock(owner, channel);
        let _guard = lock.lock().await;

        let (message, conversation) = self
            .state
            .services
            .chats
            .append_message(owner, channel, self.user.id, &self.user.name, role, content)
            .await?;

        self.state.hub.publish(
            owner,
            channel,
            ServerEvent::NewMessage {
                message: message.clone(),
                conversation: conversation.clone(),
                client_ref,
            },
        );

        if role == SenderRole::User {
            self.state.hub.publish_admins(ServerEvent::NewUserMessage {
                message,
                conversation,
            });
        }

        Ok(())
    }

    async fn send_admin_message(
        &self,
        owner: Uuid,
        channel: &str,
        content: &str,
        client_ref: Option<String>,
    ) -> Result<(), ServiceError> {
        if !self.user.is_admin() {
            return Err(ServiceError::Forbidden(
                "admin messages require the admin role".into(),
            ));
        }
        let channel = Channel::parse(channel)?;

        let lock = self.state.hub.conversation_lock(owner, channel);
        let _guard = lock.lock().await;

        let (message, conversation) = self
            .state
            .services
            .chats
            .append_message(
                owner,
                channel,
                self.user.id,
                &self.user.name,
                SenderRole::Admin,
                content,
            )
            .await?;

        self.state.hub.publish(
            owner,
            channel,
            ServerEvent::NewMessage {
                message: message.clone(),
                conversation: conversation.clone(),
                client_ref,
            },
        );
        self.state.hub.publish_admins(ServerEvent::NewAdminMessage {
            message,
            conversation,
        });

        Ok(())
    }

    async fn mark_read(
        &self,
        channel: &str,
        user_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let channel = Channel::parse(channel)?;
        let owner = self.resolve_owner(user_id)?;

        let conversation = self
            .state
            .services
            .chats
            .mark_read_for(owner, channel, self.sender_role())
            .await?;

        self.state.hub.publish(
            owner,
            channel,
            ServerEvent::UnreadUpdated {
                conversation: conversation.clone(),
            },
        );
        self.state
            .hub
            .publish_admins(ServerEvent::UnreadUpdated { conversation });

        Ok(())
    }

    /// Typing indicators are relayed, never persisted. A customer typing
    /// also reaches the admin inbox: no particular admin has joined the
    /// room yet, so any of them may pick the conversation up.
    async fn relay_typing(
        &self,
        channel: &str,
        user_id: Option<Uuid>,
        active: bool,
    ) -> Result<(), ServiceError> {
        let channel = Channel::parse(channel)?;
        let owner = self.resolve_owner(user_id)?;

        let event = if active {
            ServerEvent::Typing {
                channel,
                user_id: self.user.id,
                name: self.user.name.clone(),
            }
        } else {
            ServerEvent::StopTyping {
                channel,
                user_id: self.user.id,
            }
        };
        if self.sender_role() == SenderRole::User {
            self.state.hub.publish_admins(event.clone());
        }
        self.state.hub.publish(owner, channel, event);
        Ok(())
    }

    async fn send_error(&self, err: ServiceError, client_ref: Option<String>) {
        debug!(kind = err.kind(), "socket request failed");
        let _ = self
            .out
            .send(ServerEvent::Error {
                kind: err.kind().to_string(),
                message: err.response_message(),
                client_ref,
            })
            .await;
    }
}
