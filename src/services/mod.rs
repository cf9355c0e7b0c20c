//! Domain services. Each service owns one aggregate and goes through the
//! shared connection pool; cross-aggregate work (checkout, cancellation)
//! happens inside a single database transaction.

pub mod carts;
pub mod chats;
pub mod orders;
pub mod products;

pub use carts::CartService;
pub use chats::ChatService;
pub use orders::OrderService;
pub use products::ProductService;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

/// Bundle of domain services handed to the HTTP handlers and the socket
/// layer.
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub chats: Arc<ChatService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, config: &AppConfig, events: Arc<EventSender>) -> Self {
        let products = Arc::new(ProductService::new(db.clone()));
        let carts = Arc::new(CartService::new(
            db.clone(),
            events.clone(),
            config.tax_rate,
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            events.clone(),
            products.clone(),
            config.tax_rate,
        ));
        let chats = Arc::new(ChatService::new(db, events));
        Self {
            products,
            carts,
            orders,
            chats,
        }
    }
}
