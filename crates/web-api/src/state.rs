use std::sync::Arc;

use application::{ChatRoomRegistry, ChatService, MatchingService};

#[derive(Clone)]
pub struct AppState {
    pub matching_service: Arc<MatchingService>,
    pub chat_service: Arc<ChatService>,
    pub registry: Arc<ChatRoomRegistry>,
}

impl AppState {
    pub fn new(
        matching_service: Arc<MatchingService>,
        chat_service: Arc<ChatService>,
        registry: Arc<ChatRoomRegistry>,
    ) -> Self {
        Self {
            matching_service,
            chat_service,
            registry,
        }
    }
}
