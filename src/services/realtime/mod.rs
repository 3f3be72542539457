pub mod ws;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::ChannelError;
use crate::models::{ClientMessage, SlotEvent};

/// The long-lived push connection of one user session.
///
/// Events carry no ordering or exactly-once guarantee across reconnects.
/// `send` fails immediately while disconnected instead of queueing.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn send(&self, message: &ClientMessage) -> Result<(), ChannelError>;

    /// A fresh subscription to decoded server events.
    fn subscribe(&self) -> broadcast::Receiver<SlotEvent>;

    fn is_connected(&self) -> bool;

    /// No events are delivered after this returns.
    fn close(&self);
}
