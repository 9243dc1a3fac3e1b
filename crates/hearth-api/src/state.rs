use std::sync::Arc;

use hearth_core::{FanoutChannel, NotificationRepository};

use crate::auth::ConnectionAuthenticator;
use crate::gateway::Gateway;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub notifications: Arc<dyn NotificationRepository>,
    pub gateway: Gateway,
    pub fanout: Arc<dyn FanoutChannel>,
}

impl AppState {
    pub fn authenticator(&self) -> &ConnectionAuthenticator {
        &self.gateway.authenticator
    }
}
