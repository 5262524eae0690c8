use std::sync::Arc;

use crate::{
    auth::TokenValidator,
    config::Config,
    media::MediaStore,
    store::ChatStore,
    websocket::{typing::TypingTracker, ConnectionRegistry},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub media: Arc<dyn MediaStore>,
    pub tokens: Arc<dyn TokenValidator>,
    pub registry: ConnectionRegistry,
    pub typing: TypingTracker,
    pub config: Arc<Config>,
}
