use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::RealtimeChannel;
use crate::config::ClientConfig;
use crate::errors::ChannelError;
use crate::models::{ClientMessage, SlotEvent};

const EVENT_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    fn next(&self, current: Duration) -> Duration {
        (current * 2).clamp(self.min, self.max)
    }
}

struct Shared {
    connected: AtomicBool,
    closed: AtomicBool,
    epoch: AtomicU64,
    shutdown: Notify,
}

/// WebSocket connection to `{ws_base_url}{user_id}/` with reconnect.
pub struct WsChannel {
    url: Url,
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<SlotEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    pub fn endpoint(base_url: &str, user_id: &str) -> Result<Url, ChannelError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Url::parse(&base)?.join(&format!("{user_id}/"))?)
    }

    pub fn connect(config: &ClientConfig, user_id: &str) -> Result<Self, ChannelError> {
        let url = Self::endpoint(&config.ws_base_url, user_id)?;
        let backoff = Backoff {
            min: config.reconnect_min,
            max: config.reconnect_max,
        };
        Ok(Self::open(url, backoff))
    }

    pub fn open(url: Url, backoff: Backoff) -> Self {
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            shutdown: Notify::new(),
        });
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let task = tokio::spawn(run(
            url.clone(),
            backoff,
            Arc::clone(&shared),
            events.clone(),
            outgoing_rx,
        ));

        Self {
            url,
            shared,
            outgoing,
            events,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Number of successful connects so far.
    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn send(&self, message: &ClientMessage) -> Result<(), ChannelError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }
        let text = message.encode()?;
        self.outgoing.send(text).map_err(|_| ChannelError::Closed)
    }

    fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst) && self.shared.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_waiters();
        tracing::info!(url = %self.url, "realtime channel closed");
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

async fn run(
    url: Url,
    backoff: Backoff,
    shared: Arc<Shared>,
    events: broadcast::Sender<SlotEvent>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let mut delay = backoff.min;

    while !shared.closed.load(Ordering::SeqCst) {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                if shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                // Requests queued against a previous connection are stale.
                while outgoing.try_recv().is_ok() {}

                let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                shared.connected.store(true, Ordering::SeqCst);
                tracing::info!(url = %url, epoch, "realtime channel connected");
                delay = backoff.min;

                let keep_going = pump(socket, &shared, &events, &mut outgoing).await;
                shared.connected.store(false, Ordering::SeqCst);
                if !keep_going {
                    break;
                }
                tracing::warn!(url = %url, epoch, "realtime channel disconnected");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "realtime connect failed");
            }
        }

        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.shutdown.notified() => break,
        }
        delay = backoff.next(delay);
    }

    tracing::debug!(url = %url, "realtime loop finished");
}

/// Moves frames until the connection drops. Returns `false` when the channel
/// is shutting down and should not reconnect.
async fn pump(
    socket: Socket,
    shared: &Shared,
    events: &broadcast::Sender<SlotEvent>,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
) -> bool {
    let (mut sink, mut source) = socket.split();

    loop {
        if shared.closed.load(Ordering::SeqCst) {
            let _ = sink.close().await;
            return false;
        }

        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match SlotEvent::decode(&text) {
                    Ok(event) => {
                        if shared.closed.load(Ordering::SeqCst) {
                            return false;
                        }
                        tracing::debug!(kind = event.kind(), "realtime event");
                        // No subscribers is fine.
                        let _ = events.send(event);
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping malformed realtime frame"),
                },
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "realtime read failed");
                    return true;
                }
            },
            message = outgoing.recv() => match message {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "realtime write failed");
                        return true;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return false;
                }
            },
            _ = shared.shutdown.notified() => {
                let _ = sink.close().await;
                return false;
            }
        }
    }
}
