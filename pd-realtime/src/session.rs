//! Session binding.
//!
//! A [`RealtimeSession`] outlives identities: `bind` attaches it to one user,
//! spawning a driver task under a fresh epoch, and rebinding tears the old
//! driver down completely before the new one starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pd_core::config::AppConfig;
use pd_core::constants::DEFAULT_EVENT_CAPACITY;
use pd_core::error::{PdError, PdResult};
use pd_models::{FriendRequest, FriendRequestStatus, Identity, Message};

use crate::backoff::ReconnectConfig;
use crate::codec::{FrameCodec, JsonCodec, OutboundFrame};
use crate::dispatcher::StreamHub;
use crate::driver::{Command, Driver, DriverParts};
use crate::endpoint::socket_url;
use crate::epoch::EpochGuard;
use crate::events::{ConnectionState, RealtimeEvent};
use crate::hydration::FriendRequestSource;
use crate::machine::{ConnectionMachine, MachineConfig};
use crate::stores::{FriendRequestSet, MergeSummary, MessageLog, PresenceMap};
use crate::transport::Transport;

/// Everything a session needs besides the transport.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Page origin the socket endpoint is derived from.
    pub origin: String,
    pub ws_path: String,
    pub machine: MachineConfig,
    /// Show outbound messages before the server echoes them.
    pub local_echo: bool,
    pub event_capacity: usize,
    /// How long teardown waits for the old driver before aborting it.
    pub teardown_timeout: Duration,
}

impl SessionOptions {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ws_path: pd_core::constants::DEFAULT_WS_PATH.to_string(),
            machine: MachineConfig::default(),
            local_echo: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            teardown_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let realtime = &config.realtime;
        Self {
            origin: AppConfig::sanitize_origin(&config.server.origin),
            ws_path: realtime.ws_path.clone(),
            machine: MachineConfig {
                backoff: ReconnectConfig::from_config(realtime),
                auth_timeout: realtime.auth_timeout(),
                auth_failure_threshold: realtime.auth_failure_threshold,
            },
            local_echo: realtime.local_echo,
            event_capacity: realtime.event_capacity,
            teardown_timeout: Duration::from_secs(5),
        }
    }
}

struct Binding {
    identity: Identity,
    epoch: u64,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The realtime channel, bindable to one identity at a time.
pub struct RealtimeSession {
    options: SessionOptions,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn FrameCodec>,
    hub: Arc<StreamHub>,
    epoch: Arc<AtomicU64>,
    binding: Mutex<Option<Binding>>,
}

impl RealtimeSession {
    pub fn new(options: SessionOptions, transport: Arc<dyn Transport>) -> Self {
        let hub = Arc::new(StreamHub::new(options.event_capacity));
        Self {
            options,
            transport,
            codec: Arc::new(JsonCodec),
            hub,
            epoch: Arc::new(AtomicU64::new(0)),
            binding: Mutex::new(None),
        }
    }

    /// Swap the wire format.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Attach the session to `identity` and start connecting.
    ///
    /// Binding the user that is already bound is a no-op. Returns the epoch
    /// of the live binding.
    pub async fn bind(&self, identity: Identity) -> PdResult<u64> {
        let url = socket_url(&self.options.origin, &self.options.ws_path, &identity.user_id)?;

        let mut slot = self.binding.lock().await;
        if let Some(current) = slot.as_ref() {
            if current.identity.same_user(&identity) {
                debug!("already bound to {}, keeping epoch {}", identity.user_id, current.epoch);
                return Ok(current.epoch);
            }
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = slot.take() {
            info!("rebinding from {} to {}", previous.identity.user_id, identity.user_id);
            self.teardown(previous).await;
        }
        self.hub.reset();
        // The old driver's final state is suppressed by the epoch bump.
        self.hub.publish_state(ConnectionState::Disconnected);

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(DriverParts {
            identity: identity.clone(),
            url,
            epoch: EpochGuard::new(epoch, self.epoch.clone()),
            machine: ConnectionMachine::new(self.options.machine.clone()),
            transport: self.transport.clone(),
            codec: self.codec.clone(),
            hub: self.hub.clone(),
            local_echo: self.options.local_echo,
            commands: commands_rx,
        });
        let task = tokio::spawn(driver.run());

        info!("bound realtime session to {} (epoch {epoch})", identity.user_id);
        *slot = Some(Binding {
            identity,
            epoch,
            commands,
            task: Some(task),
        });
        Ok(epoch)
    }

    /// Tear down the current binding and publish `Closed`. Idempotent.
    pub async fn unbind(&self) {
        let mut slot = self.binding.lock().await;
        let Some(previous) = slot.take() else {
            debug!("unbind with nothing bound");
            return;
        };

        self.epoch.fetch_add(1, Ordering::SeqCst);
        let user_id = previous.identity.user_id.clone();
        self.teardown(previous).await;
        self.hub.reset();
        self.hub.publish_state(ConnectionState::Closed);
        info!("unbound realtime session from {user_id}");
    }

    /// Stop a driver and wait for it, aborting it if it will not stop.
    async fn teardown(&self, mut binding: Binding) {
        let _ = binding.commands.send(Command::Shutdown);
        if let Some(mut task) = binding.task.take() {
            match tokio::time::timeout(self.options.teardown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("realtime driver ended abnormally: {e}"),
                Err(_) => {
                    warn!("realtime driver did not stop in time, aborting");
                    task.abort();
                }
            }
        }
    }

    /// The identity currently bound, if any.
    pub async fn identity(&self) -> Option<Identity> {
        self.binding.lock().await.as_ref().map(|b| b.identity.clone())
    }

    /// Epoch of the live binding. Bumped on every bind and unbind.
    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        self.hub.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.hub.state_receiver()
    }

    pub fn messages(&self) -> watch::Receiver<MessageLog> {
        self.hub.messages()
    }

    pub fn friend_requests(&self) -> watch::Receiver<FriendRequestSet> {
        self.hub.friend_requests()
    }

    pub fn presence(&self) -> watch::Receiver<PresenceMap> {
        self.hub.presence()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.hub.events().subscribe()
    }

    /// Send a chat message to `to_user_id`.
    ///
    /// Fails with `NotConnected` unless the channel is connected; nothing is
    /// queued for later. Returns the message as sent.
    pub async fn send_message(&self, to_user_id: &str, content: &str) -> PdResult<Message> {
        let (commands, user_id) = self.live_binding().await?;
        if !self.is_connected() {
            return Err(PdError::NotConnected);
        }

        let message = Message::outbound(&user_id, to_user_id, content);
        let echo = self.options.local_echo.then(|| message.clone());
        self.request(&commands, OutboundFrame::from(&message), echo).await?;
        Ok(message)
    }

    /// Answer a friend request. The stored status changes once the server
    /// confirms with its own `friendRequestResponse`.
    pub async fn respond_to_friend_request(
        &self,
        request_id: &str,
        status: FriendRequestStatus,
    ) -> PdResult<()> {
        let (commands, _) = self.live_binding().await?;
        if !self.is_connected() {
            return Err(PdError::NotConnected);
        }

        let frame = OutboundFrame::FriendRequestResponse {
            request_id: request_id.to_string(),
            status,
        };
        self.request(&commands, frame, None).await
    }

    /// Merge a REST snapshot taken under `epoch`.
    ///
    /// Returns `None` when a newer binding has started since, in which case
    /// the snapshot is discarded.
    pub fn hydrate_friend_requests(
        &self,
        epoch: u64,
        snapshot: Vec<FriendRequest>,
    ) -> Option<MergeSummary> {
        let guard = EpochGuard::new(epoch, self.epoch.clone());
        let summary = self.hub.merge_snapshot_if(snapshot, || guard.is_current());
        match summary {
            Some(s) => debug!(
                "merged friend request snapshot: {} new, {} replaced",
                s.inserted, s.replaced
            ),
            None => debug!("discarding friend request snapshot from epoch {epoch}"),
        }
        summary
    }

    /// Fetch a snapshot from `source` for the bound identity and merge it.
    pub async fn hydrate_from(
        &self,
        source: &dyn FriendRequestSource,
    ) -> PdResult<Option<MergeSummary>> {
        let (identity, epoch) = {
            let slot = self.binding.lock().await;
            let binding = slot.as_ref().ok_or(PdError::NotBound)?;
            (binding.identity.clone(), binding.epoch)
        };

        let snapshot = source.pending_friend_requests(&identity).await?;
        Ok(self.hydrate_friend_requests(epoch, snapshot))
    }

    async fn live_binding(&self) -> PdResult<(mpsc::UnboundedSender<Command>, String)> {
        let slot = self.binding.lock().await;
        let binding = slot.as_ref().ok_or(PdError::NotBound)?;
        Ok((binding.commands.clone(), binding.identity.user_id.clone()))
    }

    async fn request(
        &self,
        commands: &mpsc::UnboundedSender<Command>,
        frame: OutboundFrame,
        echo: Option<Message>,
    ) -> PdResult<()> {
        let (reply, result) = oneshot::channel();
        commands
            .send(Command::Send { frame, echo, reply })
            .map_err(|_| PdError::NotConnected)?;
        result.await.map_err(|_| PdError::NotConnected)?
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // Dropping the binding aborts its driver, which closes the transport.
        self.binding.get_mut().take();
    }
}
