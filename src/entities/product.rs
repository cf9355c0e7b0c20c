use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product entity (the inventory ledger). `available` is the display source of
/// truth; every stock mutation keeps it synchronized with `stock > 0`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    #[sea_orm(nullable)]
    pub image: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Json")]
    pub sizes: Json,
    #[sea_orm(column_type = "Json")]
    pub colors: Json,
    pub stock: i32,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    fn json_contains(list: &Json, value: &str) -> bool {
        list.as_array()
            .map(|entries| entries.iter().any(|v| v.as_str() == Some(value)))
            .unwrap_or(false)
    }

    /// Whether `size` is one of the product's offered sizes.
    pub fn has_size(&self, size: &str) -> bool {
        Self::json_contains(&self.sizes, size)
    }

    /// Whether `color` is one of the product's offered colors.
    pub fn has_color(&self, color: &str) -> bool {
        Self::json_contains(&self.colors, color)
    }
}
