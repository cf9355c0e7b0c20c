//! HTTP handlers, grouped by resource. Each module exposes a `routes()`
//! builder (and `admin_routes()` where the resource has a back-office
//! surface); authentication layers are applied where the routers are nested.

pub mod carts;
pub mod chats;
pub mod common;
pub mod orders;
pub mod products;
