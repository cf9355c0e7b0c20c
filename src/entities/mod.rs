//! Database entities.

pub mod cart;
pub mod cart_item;
pub mod conversation;
pub mod message;
pub mod order;
pub mod order_item;
pub mod product;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use conversation::Entity as Conversation;
pub use message::Entity as Message;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;

pub use conversation::{Channel, ConversationStatus};
pub use message::SenderRole;
pub use order::OrderStatus;
