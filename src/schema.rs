//! Startup DDL. Creates the tables this crate owns when `auto_migrate` is
//! enabled; statements are idempotent and portable between SQLite and
//! Postgres.

use crate::db::DbPool;
use crate::errors::ServiceError;
use sea_orm::{ConnectionTrait, Statement};
use tracing::info;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        description TEXT,
        image VARCHAR(1024),
        price DECIMAL(19, 4) NOT NULL,
        sizes JSON NOT NULL,
        colors JSON NOT NULL,
        stock INTEGER NOT NULL DEFAULT 0,
        available BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS carts (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE,
        subtotal DECIMAL(19, 4) NOT NULL DEFAULT 0,
        tax_total DECIMAL(19, 4) NOT NULL DEFAULT 0,
        total DECIMAL(19, 4) NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cart_items (
        id UUID PRIMARY KEY,
        cart_id UUID NOT NULL,
        product_id UUID NOT NULL,
        quantity INTEGER NOT NULL,
        size VARCHAR(32) NOT NULL,
        color VARCHAR(64) NOT NULL,
        unit_price DECIMAL(19, 4) NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        order_number VARCHAR(64) NOT NULL UNIQUE,
        user_id UUID NOT NULL,
        status VARCHAR(20) NOT NULL,
        subtotal DECIMAL(19, 4) NOT NULL,
        tax DECIMAL(19, 4) NOT NULL,
        total DECIMAL(19, 4) NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        completed_at TIMESTAMP,
        cancelled_at TIMESTAMP,
        cancellation_reason TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL,
        product_id UUID NOT NULL,
        product_name VARCHAR(255) NOT NULL,
        product_image VARCHAR(1024),
        quantity INTEGER NOT NULL,
        size VARCHAR(32) NOT NULL,
        color VARCHAR(64) NOT NULL,
        unit_price DECIMAL(19, 4) NOT NULL,
        subtotal DECIMAL(19, 4) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        channel VARCHAR(32) NOT NULL,
        channel_name VARCHAR(64) NOT NULL,
        status VARCHAR(20) NOT NULL,
        last_message_at TIMESTAMP NOT NULL,
        unread_user INTEGER NOT NULL DEFAULT 0,
        unread_admin INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        UNIQUE (user_id, channel)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY,
        conversation_id UUID NOT NULL,
        sender_id UUID NOT NULL,
        sender_name VARCHAR(255) NOT NULL,
        sender_role VARCHAR(10) NOT NULL,
        content TEXT NOT NULL,
        read BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMP NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_cart_items_cart ON cart_items (cart_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_activity ON conversations (status, last_message_at)",
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages (conversation_id, created_at)",
];

/// Create all tables and indexes if they do not exist yet.
pub async fn create_tables(db: &DbPool) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    for ddl in TABLES.iter().chain(INDEXES.iter()) {
        db.execute(Statement::from_string(backend, (*ddl).to_string()))
            .await?;
    }
    info!("database schema ensured");
    Ok(())
}
