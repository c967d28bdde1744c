use crate::bot::CommandProcessor;
use std::sync::Arc;

/// Shared application state handed to every request handler.
pub struct AppState {
    pub processor: Arc<CommandProcessor>,
}
