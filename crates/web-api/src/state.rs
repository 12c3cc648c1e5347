use std::sync::Arc;

use application::{
    MessageRelay, MessageStore, PresenceTracker, RoomRegistry, SessionResolver, SignalRouter,
    UserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<MessageRelay>,
    pub rooms: Arc<RoomRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub signals: Arc<SignalRouter>,
    pub store: Arc<dyn MessageStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub sessions: Arc<dyn SessionResolver>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relay: Arc<MessageRelay>,
        rooms: Arc<RoomRegistry>,
        presence: Arc<PresenceTracker>,
        signals: Arc<SignalRouter>,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionResolver>,
    ) -> Self {
        Self {
            relay,
            rooms,
            presence,
            signals,
            store,
            directory,
            sessions,
        }
    }
}
