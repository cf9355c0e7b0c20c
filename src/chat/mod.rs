//! Real-time chat transport: the JSON wire protocol, the in-process room
//! hub, and the WebSocket handler that bridges sockets to `ChatService`.

pub mod events;
pub mod hub;
pub mod ws;

pub use events::{ClientEvent, ServerEvent};
pub use hub::ChatHub;
pub use ws::ws_handler;
