//! Shared test harness: an application state wired to an in-memory SQLite
//! database with the schema created.

use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use boutique_api::auth::Role;
use boutique_api::config::AppConfig;
use boutique_api::db::DbPool;
use boutique_api::entities::product;
use boutique_api::events::{process_events, EventSender};
use boutique_api::services::products::NewProduct;
use boutique_api::{schema, AppState};

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub state: AppState,
}

/// Spin up a fresh state against `sqlite::memory:`. The pool is capped at a
/// single connection so every handle sees the same in-memory database.
pub async fn setup() -> TestApp {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).sqlx_logging(false);
    let db = Arc::new(
        Database::connect(opts)
            .await
            .expect("in-memory sqlite should connect"),
    );
    schema::create_tables(&db)
        .await
        .expect("schema creation should succeed");

    let config = Arc::new(AppConfig::new(
        "sqlite::memory:".to_string(),
        "integration_test_secret_key_0123456789abcdef".to_string(),
        "test".to_string(),
    ));

    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(process_events(rx));

    let state = AppState::new(db.clone(), config, Arc::new(EventSender::new(tx)));
    TestApp { db, state }
}

impl TestApp {
    /// Insert a catalog entry with the standard size/color assortment.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .products
            .create_product(NewProduct {
                name: name.to_string(),
                description: Some(format!("{name} description")),
                image: None,
                price,
                sizes: vec!["S".into(), "M".into(), "L".into()],
                colors: vec!["black".into(), "white".into()],
                stock,
            })
            .await
            .expect("seeding a product should succeed")
    }

    pub fn customer_token(&self, user_id: Uuid, name: &str) -> String {
        self.state
            .auth
            .generate_token(user_id, name, Role::Customer, true)
            .expect("token generation should succeed")
    }

    pub fn admin_token(&self, user_id: Uuid, name: &str) -> String {
        self.state
            .auth
            .generate_token(user_id, name, Role::Admin, true)
            .expect("token generation should succeed")
    }
}
