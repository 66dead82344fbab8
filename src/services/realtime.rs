// src/services/realtime.rs
//
// Single persistent push connection to the matching server. The channel is
// an explicitly constructed, dependency-injected object with an owned
// open/close lifecycle; a boolean-ish connection state is the only guard
// against a second concurrent connection attempt.
//
// Failure semantics are deliberately soft: connection errors only flip the
// state back to Disconnected and never throw into calling code. The poll
// loop in the orchestrator is the correctness backstop for anything the
// channel misses.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::models::events::{ChannelFrame, RealtimeEvent};
use crate::models::ride::GeoPoint;
use crate::utils::geo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[async_trait]
pub trait RideChannel: Send + Sync {
    /// Open the connection. A no-op while connecting or connected.
    async fn connect(&self);
    /// Close the connection and clear internal references so a later
    /// `connect` is accepted.
    async fn disconnect(&self);
    /// Join a ride's room. Buffered until the connection is open.
    async fn subscribe_to_ride(&self, ride_id: &str);
    /// Leave a ride's room.
    async fn unsubscribe_from_ride(&self, ride_id: &str);
    fn is_connected(&self) -> bool;
    /// Hint the channel about the driver's position so it can filter
    /// inbound traffic. Ignored by default.
    fn note_driver_location(&self, _point: GeoPoint) {}
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub ws_url: String,
    pub token: String,
}

enum ChannelCommand {
    Send(ChannelFrame),
    Close,
}

struct ChannelInner {
    state: ChannelState,
    cmd_tx: Option<mpsc::UnboundedSender<ChannelCommand>>,
    /// Ride rooms requested while the socket was not open; flushed once
    /// right after the handshake.
    pending: HashSet<String>,
    subscribed: HashSet<String>,
    /// Bumped on every connect and disconnect. A connection task may only
    /// touch shared state while its own generation is still current, so a
    /// handshake that races a disconnect cannot resurrect the channel.
    generation: u64,
}

pub struct WsRealtimeChannel {
    config: ChannelConfig,
    inner: std::sync::Mutex<ChannelInner>,
    event_tx: mpsc::UnboundedSender<RealtimeEvent>,
    /// Last known driver position, used to proximity-check new-ride
    /// announcements before surfacing them.
    last_driver_location: std::sync::RwLock<Option<GeoPoint>>,
    weak_self: Weak<WsRealtimeChannel>,
}

impl WsRealtimeChannel {
    pub fn new(config: ChannelConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let channel = Arc::new_cyclic(|weak| Self {
            config,
            inner: std::sync::Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                cmd_tx: None,
                pending: HashSet::new(),
                subscribed: HashSet::new(),
                generation: 0,
            }),
            event_tx,
            last_driver_location: std::sync::RwLock::new(None),
            weak_self: weak.clone(),
        });
        (channel, event_rx)
    }

    /// Record the driver's position for the new-ride proximity filter.
    pub fn set_driver_location(&self, point: GeoPoint) {
        let mut guard = self
            .last_driver_location
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(point);
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connection URL with the token as a query parameter. The same token
    /// also travels in the auth frame; the server requires both.
    fn connect_url(&self) -> String {
        match url::Url::parse(&self.config.ws_url) {
            Ok(mut parsed) => {
                parsed
                    .query_pairs_mut()
                    .append_pair("token", &self.config.token);
                parsed.to_string()
            }
            Err(_) => format!("{}?token={}", self.config.ws_url, self.config.token),
        }
    }

    /// Apply per-kind inbound policy; `None` means the event is dropped.
    fn translate_event(&self, event: RealtimeEvent) -> Option<RealtimeEvent> {
        match event {
            RealtimeEvent::RideLocationChanged { ride_id, location } => {
                Some(RealtimeEvent::RideLocationChanged {
                    ride_id,
                    location: geo::normalize_precision(&location),
                })
            }
            RealtimeEvent::NewRideAvailable { ride } => {
                let driver = *self
                    .last_driver_location
                    .read()
                    .unwrap_or_else(|e| e.into_inner());
                if let Some(driver) = driver {
                    if !geo::is_plausible(&ride.pickup.point)
                        || !geo::within_pickup_radius(&driver, &ride.pickup.point)
                    {
                        tracing::debug!(
                            "Dropping out-of-range ride announcement: {}",
                            ride.id
                        );
                        return None;
                    }
                }
                Some(RealtimeEvent::NewRideAvailable { ride })
            }
            other => Some(other),
        }
    }

    fn forward(&self, event: RealtimeEvent) {
        if let Some(event) = self.translate_event(event) {
            if self.event_tx.send(event).is_err() {
                tracing::warn!("Realtime event receiver dropped, event discarded");
            }
        }
    }

    /// Promote a finished handshake to the live connection. Returns the
    /// buffered subscriptions to flush, or `None` when the attempt is stale
    /// (a disconnect or newer connect happened since it started).
    fn install_connection(
        &self,
        generation: u64,
        cmd_tx: mpsc::UnboundedSender<ChannelCommand>,
    ) -> Option<Vec<String>> {
        let mut inner = self.lock_inner();
        if inner.generation != generation || inner.state != ChannelState::Connecting {
            tracing::debug!("Dropping stale realtime connection attempt");
            return None;
        }
        inner.state = ChannelState::Connected;
        inner.cmd_tx = Some(cmd_tx);
        let pending: Vec<String> = inner.pending.drain().collect();
        inner.subscribed.extend(pending.iter().cloned());
        Some(pending)
    }

    /// Mark the channel disconnected and park active subscriptions back in
    /// the pending set so an explicit reconnect re-joins the rooms. A stale
    /// generation is a no-op: the state already belongs to a newer attempt.
    fn mark_disconnected(&self, generation: u64) {
        let mut inner = self.lock_inner();
        if inner.generation != generation {
            return;
        }
        inner.state = ChannelState::Disconnected;
        inner.cmd_tx = None;
        let subscribed: Vec<String> = inner.subscribed.drain().collect();
        inner.pending.extend(subscribed);
    }
}

#[async_trait]
impl RideChannel for WsRealtimeChannel {
    async fn connect(&self) {
        let generation = {
            let mut inner = self.lock_inner();
            if inner.state != ChannelState::Disconnected {
                tracing::debug!("Realtime connect ignored, channel already {:?}", inner.state);
                return;
            }
            inner.state = ChannelState::Connecting;
            inner.generation += 1;
            inner.generation
        };

        let Some(channel) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(run_channel_task(channel, generation));
    }

    async fn disconnect(&self) {
        let cmd_tx = {
            let mut inner = self.lock_inner();
            inner.state = ChannelState::Disconnected;
            inner.generation += 1;
            let subscribed: Vec<String> = inner.subscribed.drain().collect();
            inner.pending.extend(subscribed);
            inner.cmd_tx.take()
        };
        if let Some(cmd_tx) = cmd_tx {
            let _ = cmd_tx.send(ChannelCommand::Close);
        }
    }

    async fn subscribe_to_ride(&self, ride_id: &str) {
        let mut inner = self.lock_inner();
        match (&inner.cmd_tx, inner.state) {
            (Some(cmd_tx), ChannelState::Connected) => {
                let frame = ChannelFrame::Subscribe {
                    ride_id: ride_id.to_string(),
                };
                if cmd_tx.send(ChannelCommand::Send(frame)).is_ok() {
                    inner.subscribed.insert(ride_id.to_string());
                } else {
                    inner.pending.insert(ride_id.to_string());
                }
            }
            _ => {
                tracing::debug!("Buffering subscription for ride {}", ride_id);
                inner.pending.insert(ride_id.to_string());
            }
        }
    }

    async fn unsubscribe_from_ride(&self, ride_id: &str) {
        let mut inner = self.lock_inner();
        inner.pending.remove(ride_id);
        let was_subscribed = inner.subscribed.remove(ride_id);
        if was_subscribed {
            if let Some(cmd_tx) = &inner.cmd_tx {
                let frame = ChannelFrame::Unsubscribe {
                    ride_id: ride_id.to_string(),
                };
                let _ = cmd_tx.send(ChannelCommand::Send(frame));
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    fn note_driver_location(&self, point: GeoPoint) {
        self.set_driver_location(point);
    }
}

/// Own the socket for one connection's lifetime. Never retries on its own:
/// any failure flips the state flag and exits, leaving reconnection to an
/// explicit disconnect/connect from above.
async fn run_channel_task(channel: Arc<WsRealtimeChannel>, generation: u64) {
    let url = channel.connect_url();
    tracing::info!("Connecting realtime channel");

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(err) => {
            tracing::warn!("Realtime connection failed: {}", err);
            channel.mark_disconnected(generation);
            return;
        }
    };

    let (mut ws_sink, mut ws_source) = ws_stream.split();

    // Handshake: the server expects an auth frame as the first message.
    let auth = ChannelFrame::Auth {
        token: channel.config.token.clone(),
    };
    if let Ok(json) = serde_json::to_string(&auth) {
        if let Err(err) = ws_sink.send(WsMessage::Text(json.into())).await {
            tracing::warn!("Realtime auth frame failed: {}", err);
            channel.mark_disconnected(generation);
            return;
        }
    }

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();

    // Flush subscriptions buffered while the socket was down, each once. A
    // disconnect during the handshake makes this attempt stale; close the
    // socket instead of resurrecting the connection.
    let Some(flush) = channel.install_connection(generation, cmd_tx) else {
        let _ = ws_sink.send(WsMessage::Close(None)).await;
        let _ = ws_sink.close().await;
        return;
    };
    for ride_id in flush {
        let frame = ChannelFrame::Subscribe { ride_id };
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if let Err(err) = ws_sink.send(WsMessage::Text(json.into())).await {
                    tracing::warn!("Failed to flush pending subscription: {}", err);
                }
            }
            Err(err) => tracing::warn!("Failed to serialize subscription: {}", err),
        }
    }
    tracing::info!("Realtime channel connected");

    loop {
        tokio::select! {
            frame = ws_source.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<RealtimeEvent>(text.as_str()) {
                            Ok(event) => channel.forward(event),
                            Err(err) => {
                                tracing::debug!("Ignoring unreadable realtime frame: {}", err);
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::debug!("Realtime channel received close frame");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Binary, nothing to do
                    }
                    Some(Err(err)) => {
                        tracing::warn!("Realtime read error: {}", err);
                        break;
                    }
                    None => {
                        tracing::debug!("Realtime stream ended");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChannelCommand::Send(frame)) => {
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if let Err(err) = ws_sink.send(WsMessage::Text(json.into())).await {
                                    tracing::warn!("Realtime send failed: {}", err);
                                    break;
                                }
                            }
                            Err(err) => tracing::warn!("Failed to serialize frame: {}", err),
                        }
                    }
                    Some(ChannelCommand::Close) | None => {
                        let _ = ws_sink.send(WsMessage::Close(None)).await;
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
            }
        }
    }

    channel.mark_disconnected(generation);
    tracing::info!("Realtime channel disconnected");
}
