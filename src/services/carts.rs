use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::cart::{self, Entity as Cart};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::product::Entity as Product;
use crate::errors::{is_unique_violation, ServiceError};
use crate::events::{Event, EventSender};

/// Cart operations. One cart per user, created lazily; lines are merged by
/// (product, size, color) and totals are recomputed inside the same
/// transaction as every mutation.
pub struct CartService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
    tax_rate: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 99))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 32))]
    pub size: String,
    #[validate(length(min = 1, max = 64))]
    pub color: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateQuantityInput {
    #[validate(range(min = 1, max = 99))]
    pub quantity: i32,
}

/// A cart with its line items, as returned to callers.
#[derive(Debug, serde::Serialize)]
pub struct CartDetail {
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, events: Arc<EventSender>, tax_rate: f64) -> Self {
        // The rate is range-validated at configuration load.
        let tax_rate = Decimal::from_f64_retain(tax_rate).unwrap_or_default();
        Self {
            db,
            events,
            tax_rate,
        }
    }

    /// Fetch the user's cart, creating an empty one on first access.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartDetail, ServiceError> {
        let cart = self.get_or_create_cart(&*self.db, user_id).await?;
        let items = self.items_of(&*self.db, cart.id).await?;
        Ok(CartDetail { cart, items })
    }

    /// Add a product selection to the cart. An existing line with the same
    /// (product, size, color) absorbs the quantity instead of duplicating.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartDetail, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if !product.has_size(&input.size) {
            return Err(ServiceError::InvalidSelection(format!(
                "size '{}' is not offered for {}",
                input.size, product.name
            )));
        }
        if !product.has_color(&input.color) {
            return Err(ServiceError::InvalidSelection(format!(
                "color '{}' is not offered for {}",
                input.color, product.name
            )));
        }
        if !product.available || product.stock < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} units of {} left",
                product.stock.max(0),
                product.name
            )));
        }

        let cart = self.get_or_create_cart(&txn, user_id).await?;
        let now = Utc::now();

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(cart_item::Column::Size.eq(input.size.clone()))
            .filter(cart_item::Column::Color.eq(input.color.clone()))
            .one(&txn)
            .await?;

        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.clone().into();
                active.quantity = Set(line.quantity + input.quantity);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    quantity: Set(input.quantity),
                    size: Set(input.size),
                    color: Set(input.color),
                    unit_price: Set(product.price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        let detail = self.recalculate(&txn, cart.id).await?;
        txn.commit().await?;

        self.events
            .send_or_log(Event::CartItemAdded {
                cart_id: detail.cart.id,
                product_id: input.product_id,
            })
            .await;

        Ok(detail)
    }

    /// Change a line's quantity. Quantities below one are rejected; removal
    /// has its own endpoint.
    #[instrument(skip(self, input))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        input: UpdateQuantityInput,
    ) -> Result<CartDetail, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;

        let line = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let product = Product::find_by_id(line.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", line.product_id))
            })?;
        if product.stock < input.quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} units of {} left",
                product.stock.max(0),
                product.name
            )));
        }

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(input.quantity);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let detail = self.recalculate(&txn, cart.id).await?;
        txn.commit().await?;

        self.events
            .send_or_log(Event::CartItemUpdated {
                cart_id: detail.cart.id,
                item_id,
            })
            .await;

        Ok(detail)
    }

    /// Remove a line. Removing a line that is already gone is not an error;
    /// the operation is idempotent.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let detail = self.recalculate(&txn, cart.id).await?;
        txn.commit().await?;

        self.events
            .send_or_log(Event::CartItemRemoved {
                cart_id: detail.cart.id,
                item_id,
            })
            .await;

        Ok(detail)
    }

    /// Empty the cart and zero its totals.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.get_or_create_cart(&txn, user_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let detail = self.recalculate(&txn, cart.id).await?;
        txn.commit().await?;

        self.events.send_or_log(Event::CartCleared(cart.id)).await;
        Ok(detail)
    }

    async fn get_or_create_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?
        {
            return Ok(cart);
        }

        let now = Utc::now();
        let insert = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            subtotal: Set(Decimal::ZERO),
            tax_total: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await;

        match insert {
            Ok(cart) => {
                self.events.send_or_log(Event::CartCreated(cart.id)).await;
                Ok(cart)
            }
            // Lost a creation race; the other writer's cart is ours too.
            Err(err) if is_unique_violation(&err) => Cart::find()
                .filter(cart::Column::UserId.eq(user_id))
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::InternalError("cart vanished after race".into())),
            Err(err) => Err(err.into()),
        }
    }

    async fn items_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?)
    }

    /// Recompute subtotal, tax and total from the lines and persist them on
    /// the cart row.
    async fn recalculate<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let items = self.items_of(conn, cart_id).await?;

        let subtotal: Decimal = items.iter().map(|line| line.line_subtotal()).sum();
        let tax_total = (subtotal * self.tax_rate).round_dp(2);
        let total = subtotal + tax_total;

        let cart = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let mut active: cart::ActiveModel = cart.into();
        active.subtotal = Set(subtotal);
        active.tax_total = Set(tax_total);
        active.total = Set(total);
        active.updated_at = Set(Utc::now());
        let cart = active.update(conn).await?;

        Ok(CartDetail { cart, items })
    }
}
