use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::cart::{self, Entity as Cart};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::order::{self, Entity as Order, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::product::Entity as Product;
use crate::errors::{is_unique_violation, ServiceError};
use crate::events::{Event, EventSender};
use crate::services::ProductService;

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Checkout and the order state machine. The entire cart-to-order conversion
/// runs in one transaction: stock reservation, order insert, line snapshots
/// and cart emptying either all land or none do.
pub struct OrderService {
    db: Arc<DbPool>,
    events: Arc<EventSender>,
    products: Arc<ProductService>,
    tax_rate: Decimal,
}

/// An order with its line snapshots.
#[derive(Debug, serde::Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        events: Arc<EventSender>,
        products: Arc<ProductService>,
        tax_rate: f64,
    ) -> Self {
        let tax_rate = Decimal::from_f64_retain(tax_rate).unwrap_or_default();
        Self {
            db,
            events,
            products,
            tax_rate,
        }
    }

    /// Convert the user's cart into an order. Fails with `EmptyCart` on an
    /// empty cart and `InsufficientStock` when any line can no longer be
    /// covered; either way nothing is persisted.
    #[instrument(skip(self))]
    pub async fn create_order(&self, user_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&txn)
            .await?;

        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let mut subtotal = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(lines.len());

        for line in &lines {
            let product = Product::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            // The display flag is authoritative; a product pulled from sale
            // keeps its stock but cannot be ordered.
            if !product.available {
                return Err(ServiceError::InsufficientStock(format!(
                    "{} is no longer available",
                    product.name
                )));
            }

            self.products
                .reserve_stock(&txn, line.product_id, line.quantity)
                .await
                .map_err(|err| match err {
                    ServiceError::InsufficientStock(_) => ServiceError::InsufficientStock(
                        format!("only {} units of {} left", product.stock.max(0), product.name),
                    ),
                    other => other,
                })?;

            let line_subtotal = line.line_subtotal();
            subtotal += line_subtotal;
            snapshots.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(product.name),
                product_image: Set(product.image),
                quantity: Set(line.quantity),
                size: Set(line.size.clone()),
                color: Set(line.color.clone()),
                unit_price: Set(line.unit_price),
                subtotal: Set(line_subtotal),
            });
        }

        let tax = (subtotal * self.tax_rate).round_dp(2);
        let total = subtotal + tax;

        // A collision on the order-number index is retried with a fresh
        // number; it only surfaces as Conflict after exhaustion.
        let mut order = None;
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let order_number = self.allocate_order_number(&txn, user_id).await?;
            let candidate = order::ActiveModel {
                id: Set(order_id),
                order_number: Set(order_number.clone()),
                user_id: Set(user_id),
                status: Set(OrderStatus::InProgress),
                subtotal: Set(subtotal),
                tax: Set(tax),
                total: Set(total),
                created_at: Set(now),
                updated_at: Set(now),
                completed_at: Set(None),
                cancelled_at: Set(None),
                cancellation_reason: Set(None),
            };
            match self.try_insert_order(&txn, candidate).await? {
                Some(inserted) => {
                    order = Some(inserted);
                    break;
                }
                None => warn!(%order_number, "order number collision, retrying"),
            }
        }
        let order = order.ok_or_else(|| {
            ServiceError::Conflict("could not allocate a unique order number".into())
        })?;

        let items = {
            let mut inserted = Vec::with_capacity(snapshots.len());
            for snapshot in snapshots {
                inserted.push(snapshot.insert(&txn).await?);
            }
            inserted
        };

        // Checkout consumes the cart.
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        let mut active: cart::ActiveModel = cart.into();
        active.subtotal = Set(Decimal::ZERO);
        active.tax_total = Set(Decimal::ZERO);
        active.total = Set(Decimal::ZERO);
        active.updated_at = Set(now);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order.id, order_number = %order.order_number, "order created");
        self.events.send_or_log(Event::OrderCreated(order.id)).await;

        Ok(OrderDetail { order, items })
    }

    /// Cancel an in-progress order, returning its stock. Owner only; terminal
    /// orders reject the transition.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "only the order's owner may cancel it".into(),
            ));
        }
        if order.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "order is already {}",
                order.status.as_str()
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        for item in &items {
            self.products
                .restore_stock(&txn, item.product_id, item.quantity)
                .await?;
        }

        let now = Utc::now();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.cancelled_at = Set(Some(now));
        active.cancellation_reason = Set(reason);
        active.updated_at = Set(now);
        let order = active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order.id, "order cancelled");
        self.events
            .send_or_log(Event::OrderCancelled(order.id))
            .await;

        Ok(OrderDetail { order, items })
    }

    /// Mark an in-progress order as fulfilled. Admin operation.
    #[instrument(skip(self))]
    pub async fn complete_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "order is already {}",
                order.status.as_str()
            )));
        }

        let now = Utc::now();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Completed);
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        let order = active.update(&*self.db).await?;

        info!(order_id = %order.id, "order completed");
        self.events
            .send_or_log(Event::OrderCompleted(order.id))
            .await;

        self.with_items(order).await
    }

    /// The caller's own orders, newest first.
    #[instrument(skip(self))]
    pub async fn my_orders(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Fetch one order. Customers see only their own; admins see any.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        requester_id: Uuid,
        is_admin: bool,
    ) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        self.authorize_and_load(order, requester_id, is_admin).await
    }

    /// Fetch one order by its human-facing number.
    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
        requester_id: Uuid,
        is_admin: bool,
    ) -> Result<OrderDetail, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", order_number))
            })?;

        self.authorize_and_load(order, requester_id, is_admin).await
    }

    /// All orders, optionally filtered by status. Admin operation.
    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }

    async fn authorize_and_load(
        &self,
        order: order::Model,
        requester_id: Uuid,
        is_admin: bool,
    ) -> Result<OrderDetail, ServiceError> {
        if order.user_id != requester_id && !is_admin {
            return Err(ServiceError::Forbidden(
                "order belongs to another customer".into(),
            ));
        }
        self.with_items(order).await
    }

    async fn with_items(&self, order: order::Model) -> Result<OrderDetail, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        Ok(OrderDetail { order, items })
    }

    /// Allocate a human-facing order number: a time component, three random
    /// digits and the user's order sequence. The unique index guarding the
    /// column is the real arbiter; the insert retries on collision.
    async fn allocate_order_number<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<String, ServiceError> {
        let sequence = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .count(conn)
            .await?
            + 1;

        let time_part = Utc::now().timestamp_millis() % 1_000_000;
        let random_part: u32 = rand::thread_rng().gen_range(100..1000);
        Ok(format!("ORD-{:06}-{}-{}", time_part, random_part, sequence))
    }

    /// Insert the order under a savepoint so a number collision rolls back
    /// only the insert, leaving the checkout transaction usable for a retry.
    /// Returns `None` when the unique index rejected the number.
    async fn try_insert_order(
        &self,
        txn: &DatabaseTransaction,
        order: order::ActiveModel,
    ) -> Result<Option<order::Model>, ServiceError> {
        let savepoint = txn.begin().await?;
        match order.insert(&savepoint).await {
            Ok(model) => {
                savepoint.commit().await?;
                Ok(Some(model))
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};
    use tokio::sync::mpsc;

    async fn service() -> (Arc<DbPool>, OrderService) {
        // One connection so every handle sees the same in-memory database.
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.unwrap();
        crate::schema::create_tables(&db).await.unwrap();
        let db = Arc::new(db);
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(crate::events::process_events(rx));
        let events = Arc::new(EventSender::new(tx));
        let products = Arc::new(ProductService::new(db.clone()));
        let service = OrderService::new(db.clone(), events, products, 0.16);
        (db, service)
    }

    fn stub_order(number: &str) -> order::ActiveModel {
        let now = Utc::now();
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(number.to_string()),
            user_id: Set(Uuid::new_v4()),
            status: Set(OrderStatus::InProgress),
            subtotal: Set(Decimal::ZERO),
            tax: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
        }
    }

    #[tokio::test]
    async fn number_collision_rolls_back_only_the_insert() {
        let (db, service) = service().await;
        let txn = db.begin().await.unwrap();

        let first = service
            .try_insert_order(&txn, stub_order("ORD-000001-123-1"))
            .await
            .unwrap();
        assert!(first.is_some());

        // Same number again: absorbed, not surfaced to the caller.
        let second = service
            .try_insert_order(&txn, stub_order("ORD-000001-123-1"))
            .await
            .unwrap();
        assert!(second.is_none());

        // The enclosing transaction survives and accepts a fresh number.
        let third = service
            .try_insert_order(&txn, stub_order("ORD-000001-124-1"))
            .await
            .unwrap();
        assert!(third.is_some());
        txn.commit().await.unwrap();

        let count = Order::find().count(&*db).await.unwrap();
        assert_eq!(count, 2);
    }
}
