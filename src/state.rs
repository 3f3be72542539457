use std::sync::Arc;

use crate::config::ClientConfig;
use crate::models::UserIdentity;
use crate::services::api::BookingApi;
use crate::services::realtime::RealtimeChannel;

pub struct ClientState {
    pub config: ClientConfig,
    pub user: UserIdentity,
    pub api: Arc<dyn BookingApi>,
    pub channel: Arc<dyn RealtimeChannel>,
}
