use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::conversation::{self, Channel, ConversationStatus, Entity as Conversation};
use crate::entities::message::{self, Entity as Message, SenderRole};
use crate::errors::{is_unique_violation, ServiceError};
use crate::events::{Event, EventSender};

const MAX_MESSAGE_LEN: usize = 2000;

/// Two-party support conversations. Every mutation of the unread counters is
/// a single-statement column expression so concurrent appends and reads
/// reconcile without lost updates.
pub struct ChatService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
}

/// A conversation with its message history.
#[derive(Debug, serde::Serialize)]
pub struct ConversationDetail {
    pub conversation: conversation::Model,
    pub messages: Vec<message::Model>,
}

fn unread_column(role: SenderRole) -> conversation::Column {
    match role {
        SenderRole::User => conversation::Column::UnreadUser,
        SenderRole::Admin => conversation::Column::UnreadAdmin,
    }
}

impl ChatService {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>) -> Self {
        Self { db, events }
    }

    /// Fetch the conversation for a (user, channel) pair, creating it on
    /// first access by either party.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<conversation::Model, ServiceError> {
        self.get_or_create_on(&*self.db, user_id, channel).await
    }

    /// Conversation plus full message history, oldest first.
    #[instrument(skip(self))]
    pub async fn get_conversation(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<ConversationDetail, ServiceError> {
        let conversation = self.get_or_create(user_id, channel).await?;
        let messages = Message::find()
            .filter(message::Column::ConversationId.eq(conversation.id))
            .order_by_asc(message::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    /// All of a user's conversations, one per channel, most recently active
    /// first. Missing channels are created so the client always sees the
    /// full set.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<conversation::Model>, ServiceError> {
        for channel in Channel::ALL {
            self.get_or_create(user_id, channel).await?;
        }

        Ok(Conversation::find()
            .filter(conversation::Column::UserId.eq(user_id))
            .order_by_desc(conversation::Column::LastMessageAt)
            .all(&*self.db)
            .await?)
    }

    /// Every conversation in the system, optionally filtered by channel and
    /// status. Admin operation; feeds the support inbox.
    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        channel: Option<Channel>,
        status: Option<ConversationStatus>,
    ) -> Result<Vec<conversation::Model>, ServiceError> {
        let mut query =
            Conversation::find().order_by_desc(conversation::Column::LastMessageAt);
        if let Some(channel) = channel {
            query = query.filter(conversation::Column::Channel.eq(channel));
        }
        if let Some(status) = status {
            query = query.filter(conversation::Column::Status.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Append a message to the (owner, channel) conversation. Bumps the
    /// counterpart's unread counter atomically, refreshes the activity
    /// timestamp and re-opens a closed conversation.
    #[instrument(skip(self, content), fields(sender = %sender_id))]
    pub async fn append_message(
        &self,
        owner_id: Uuid,
        channel: Channel,
        sender_id: Uuid,
        sender_name: &str,
        sender_role: SenderRole,
        content: &str,
    ) -> Result<(message::Model, conversation::Model), ServiceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ServiceError::ValidationError(
                "message content must not be empty".into(),
            ));
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(ServiceError::ValidationError(format!(
                "message content exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let txn = self.db.begin().await?;
        let conversation = self.get_or_create_on(&txn, owner_id, channel).await?;
        let now = Utc::now();

        let message = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            conversation_id: Set(conversation.id),
            sender_id: Set(sender_id),
            sender_name: Set(sender_name.to_string()),
            sender_role: Set(sender_role),
            content: Set(content.to_string()),
            read: Set(false),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let counter = unread_column(sender_role.other());
        Conversation::update_many()
            .col_expr(counter, Expr::col(counter).add(1))
            .col_expr(conversation::Column::LastMessageAt, Expr::value(now))
            .col_expr(conversation::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                conversation::Column::Status,
                Expr::value(ConversationStatus::Active),
            )
            .filter(conversation::Column::Id.eq(conversation.id))
            .exec(&txn)
            .await?;

        let conversation = self.refetch(&txn, conversation.id).await?;
        txn.commit().await?;

        self.events
            .send_or_log(Event::MessageAppended {
                conversation_id: conversation.id,
                channel,
            })
            .await;

        Ok((message, conversation))
    }

    /// Mark everything the reader has not seen as read: zero their unread
    /// counter and flip the read flag on the counterpart's messages. Runs in
    /// one transaction so the counter and the flags cannot diverge.
    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader: SenderRole,
    ) -> Result<conversation::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let conversation = self.refetch(&txn, conversation_id).await?;

        Conversation::update_many()
            .col_expr(unread_column(reader), Expr::value(0))
            .col_expr(conversation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(conversation::Column::Id.eq(conversation.id))
            .exec(&txn)
            .await?;

        Message::update_many()
            .col_expr(message::Column::Read, Expr::value(true))
            .filter(message::Column::ConversationId.eq(conversation.id))
            .filter(message::Column::SenderRole.eq(reader.other()))
            .filter(message::Column::Read.eq(false))
            .exec(&txn)
            .await?;

        let conversation = self.refetch(&txn, conversation.id).await?;
        txn.commit().await?;

        self.events
            .send_or_log(Event::ConversationRead {
                conversation_id: conversation.id,
                as_admin: reader == SenderRole::Admin,
            })
            .await;

        Ok(conversation)
    }

    /// Mark-as-read addressed by (owner, channel) instead of conversation id.
    #[instrument(skip(self))]
    pub async fn mark_read_for(
        &self,
        owner_id: Uuid,
        channel: Channel,
        reader: SenderRole,
    ) -> Result<conversation::Model, ServiceError> {
        let conversation = self.get_or_create(owner_id, channel).await?;
        self.mark_read(conversation.id, reader).await
    }

    /// Archive a conversation. Soft: the history stays readable and any new
    /// message re-opens it.
    #[instrument(skip(self))]
    pub async fn close(
        &self,
        conversation_id: Uuid,
    ) -> Result<conversation::Model, ServiceError> {
        let conversation = self.refetch(&*self.db, conversation_id).await?;

        let mut active: conversation::ActiveModel = conversation.into();
        active.status = Set(ConversationStatus::Closed);
        active.updated_at = Set(Utc::now());
        let conversation = active.update(&*self.db).await?;

        self.events
            .send_or_log(Event::ConversationClosed(conversation.id))
            .await;

        Ok(conversation)
    }

    async fn get_or_create_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<conversation::Model, ServiceError> {
        if let Some(found) = self.find_pair(conn, user_id, channel).await? {
            return Ok(found);
        }

        let now = Utc::now();
        let insert = conversation::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            channel: Set(channel),
            channel_name: Set(channel.display_name().to_string()),
            status: Set(ConversationStatus::Active),
            last_message_at: Set(now),
            unread_user: Set(0),
            unread_admin: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await;

        match insert {
            Ok(conversation) => {
                self.events
                    .send_or_log(Event::ConversationCreated(conversation.id))
                    .await;
                Ok(conversation)
            }
            // Lost a creation race against the other party.
            Err(err) if is_unique_violation(&err) => self
                .find_pair(conn, user_id, channel)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("conversation vanished after race".into())
                }),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_pair<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<Option<conversation::Model>, ServiceError> {
        Ok(Conversation::find()
            .filter(conversation::Column::UserId.eq(user_id))
            .filter(conversation::Column::Channel.eq(channel))
            .one(conn)
            .await?)
    }

    async fn refetch<C: ConnectionTrait>(
        &self,
        conn: &C,
        conversation_id: Uuid,
    ) -> Result<conversation::Model, ServiceError> {
        Conversation::find_by_id(conversation_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Conversation {} not found", conversation_id))
            })
    }
}
