use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Support conversation. Exactly one per (user, channel) pair, created lazily
/// on first access by either party. The two unread counters are independent
/// and only ever mutated through atomic column expressions.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: Channel,
    pub channel_name: String,
    pub status: ConversationStatus,
    pub last_message_at: DateTime<Utc>,
    pub unread_user: i32,
    pub unread_admin: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// The fixed set of conversation channels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum Channel {
    #[sea_orm(string_value = "orders")]
    #[serde(rename = "orders")]
    Orders,
    #[sea_orm(string_value = "customer-support")]
    #[serde(rename = "customer-support")]
    CustomerSupport,
    #[sea_orm(string_value = "admin")]
    #[serde(rename = "admin")]
    Admin,
    #[sea_orm(string_value = "shipping")]
    #[serde(rename = "shipping")]
    Shipping,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Orders,
        Channel::CustomerSupport,
        Channel::Admin,
        Channel::Shipping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Orders => "orders",
            Channel::CustomerSupport => "customer-support",
            Channel::Admin => "admin",
            Channel::Shipping => "shipping",
        }
    }

    /// Human-readable name shown in conversation lists.
    pub fn display_name(self) -> &'static str {
        match self {
            Channel::Orders => "Order Inquiry",
            Channel::CustomerSupport => "Customer Support",
            Channel::Admin => "Admin Contact",
            Channel::Shipping => "Shipping",
        }
    }

    /// Parse a channel identifier, rejecting anything outside the fixed set.
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value {
            "orders" => Ok(Channel::Orders),
            "customer-support" => Ok(Channel::CustomerSupport),
            "admin" => Ok(Channel::Admin),
            "shipping" => Ok(Channel::Shipping),
            other => Err(ServiceError::InvalidChannel(format!(
                "'{other}' is not a recognized channel"
            ))),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation lifecycle flag. Closing is a soft archive: appending a new
/// message re-opens the conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ConversationStatus {
    #[sea_orm(string_value = "active")]
    #[serde(rename = "active")]
    Active,
    #[sea_orm(string_value = "closed")]
    #[serde(rename = "closed")]
    Closed,
}

impl ConversationStatus {
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value {
            "active" => Ok(ConversationStatus::Active),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(ServiceError::ValidationError(format!(
                "'{other}' is not a conversation status"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn channel_parsing_covers_the_fixed_set() {
        for channel in Channel::ALL {
            assert_eq!(Channel::parse(channel.as_str()).unwrap(), channel);
        }
        assert_matches!(
            Channel::parse("billing"),
            Err(ServiceError::InvalidChannel(_))
        );
    }

    #[test]
    fn channel_serializes_with_wire_names() {
        let json = serde_json::to_string(&Channel::CustomerSupport).unwrap();
        assert_eq!(json, "\"customer-support\"");
        let parsed: Channel = serde_json::from_str("\"shipping\"").unwrap();
        assert_eq!(parsed, Channel::Shipping);
    }
}
