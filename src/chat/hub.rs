use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::chat::events::ServerEvent;
use crate::entities::Channel;

const ROOM_CAPACITY: usize = 256;

/// In-process fan-out for chat events. One broadcast room per
/// (conversation owner, channel) pair, plus a shared room every connected
/// admin subscribes to. Rooms are created lazily and live for the process
/// lifetime; an idle room is just a sender with no receivers.
pub struct ChatHub {
    rooms: DashMap<String, broadcast::Sender<ServerEvent>>,
    admins: broadcast::Sender<ServerEvent>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        let (admins, _) = broadcast::channel(ROOM_CAPACITY);
        Self {
            rooms: DashMap::new(),
            admins,
            locks: DashMap::new(),
        }
    }

    fn room_key(owner: Uuid, channel: Channel) -> String {
        format!("{}:{}", owner, channel)
    }

    fn room_sender(&self, owner: Uuid, channel: Channel) -> broadcast::Sender<ServerEvent> {
        self.rooms
            .entry(Self::room_key(owner, channel))
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, owner: Uuid, channel: Channel) -> broadcast::Receiver<ServerEvent> {
        self.room_sender(owner, channel).subscribe()
    }

    pub fn subscribe_admins(&self) -> broadcast::Receiver<ServerEvent> {
        self.admins.subscribe()
    }

    /// Publish to a conversation room. A send error only means nobody is
    /// listening right now.
    pub fn publish(&self, owner: Uuid, channel: Channel, event: ServerEvent) {
        let _ = self.room_sender(owner, channel).send(event);
    }

    pub fn publish_admins(&self, event: ServerEvent) {
        let _ = self.admins.send(event);
    }

    /// Per-conversation mutex. Held across append-then-broadcast so room
    /// subscribers observe messages in commit order.
    pub fn conversation_lock(&self, owner: Uuid, channel: Channel) -> Arc<Mutex<()>> {
        self.locks
            .entry(Self::room_key(owner, channel))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}
