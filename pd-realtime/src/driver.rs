//! Per-binding driver task.
//!
//! Owns the state machine, the live connection and the single pending
//! timer. Commands, transport events and timer firings are handled one at a
//! time in a `select!` loop, so every transition runs to completion.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use pd_core::error::{PdError, PdResult};
use pd_models::{Identity, Message};

use crate::codec::{FrameCodec, InboundFrame, OutboundFrame};
use crate::dispatcher::{StreamDispatcher, StreamHub};
use crate::epoch::EpochGuard;
use crate::events::RealtimeEvent;
use crate::machine::{Action, ConnectionMachine, Input, TimerId};
use crate::transport::{ConnTag, Transport, TransportEvent, TransportHandle, TransportSink};

/// Requests from the session to its driver.
pub(crate) enum Command {
    Send {
        frame: OutboundFrame,
        echo: Option<Message>,
        reply: oneshot::Sender<PdResult<()>>,
    },
    Shutdown,
}

pub(crate) struct DriverParts {
    pub identity: Identity,
    pub url: String,
    pub epoch: EpochGuard,
    pub machine: ConnectionMachine,
    pub transport: Arc<dyn Transport>,
    pub codec: Arc<dyn FrameCodec>,
    pub hub: Arc<StreamHub>,
    pub local_echo: bool,
    pub commands: mpsc::UnboundedReceiver<Command>,
}

pub(crate) struct Driver {
    identity: Identity,
    url: String,
    epoch: EpochGuard,
    machine: ConnectionMachine,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn FrameCodec>,
    hub: Arc<StreamHub>,
    local_echo: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: TransportSink,
    events_rx: mpsc::UnboundedReceiver<(ConnTag, TransportEvent)>,
    conn: Option<Box<dyn TransportHandle>>,
    serial: u64,
    timer: Option<(TimerId, Pin<Box<Sleep>>)>,
}

impl Driver {
    pub(crate) fn new(parts: DriverParts) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            identity: parts.identity,
            url: parts.url,
            epoch: parts.epoch,
            machine: parts.machine,
            transport: parts.transport,
            codec: parts.codec,
            hub: parts.hub,
            local_echo: parts.local_echo,
            commands: parts.commands,
            events_tx,
            events_rx,
            conn: None,
            serial: 0,
            timer: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(
            "driver for {} started (epoch {}, {} transport)",
            self.identity.user_id,
            self.epoch.epoch(),
            self.transport.name()
        );
        self.step(Input::Connect);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send { frame, echo, reply }) => {
                        let result = self.send(&frame, echo);
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => {
                        self.step(Input::Unbind);
                        break;
                    }
                },
                Some((tag, event)) = self.events_rx.recv() => {
                    self.on_transport_event(tag, event);
                }
                id = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    self.step(Input::TimerFired(id));
                }
            }
        }

        debug!("driver for {} stopped (epoch {})", self.identity.user_id, self.epoch.epoch());
    }

    fn step(&mut self, input: Input) {
        for action in self.machine.handle(input) {
            self.execute(action);
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::OpenTransport => {
                self.close_conn();
                self.serial += 1;
                let tag = ConnTag {
                    epoch: self.epoch.epoch(),
                    serial: self.serial,
                };
                info!("opening realtime connection to {} ({tag:?})", self.url);
                self.conn = Some(self.transport.open(&self.url, tag, self.events_tx.clone()));
            }
            Action::SendAuth => {
                let frame = OutboundFrame::Auth {
                    user_id: self.identity.user_id.clone(),
                    token: self.identity.auth_token.clone(),
                };
                if let Err(e) = self.transmit(&frame) {
                    warn!("failed to send auth frame: {e}");
                }
            }
            Action::CloseTransport => self.close_conn(),
            Action::ScheduleTimer { id, kind, delay } => {
                debug!("timer {id} ({kind:?}) in {:.1}s", delay.as_secs_f64());
                self.timer = Some((id, Box::pin(tokio::time::sleep(delay))));
            }
            Action::CancelTimer { id } => {
                if self.timer.as_ref().is_some_and(|(pending, _)| *pending == id) {
                    self.timer = None;
                }
            }
            Action::Publish(state) => {
                if self.epoch.is_current() {
                    self.hub.publish_state(state);
                }
            }
            Action::ReportAuthRejected { reason, consecutive } => {
                let err = PdError::AuthFailed(reason.clone());
                error!("{err} ({consecutive} consecutive rejections for {})", self.identity.user_id);
                if self.epoch.is_current() {
                    self.hub
                        .events()
                        .dispatch(RealtimeEvent::AuthRejected { reason, consecutive });
                }
            }
        }
    }

    fn on_transport_event(&mut self, tag: ConnTag, event: TransportEvent) {
        let live = self.conn.as_ref().map(|c| c.tag());
        if live != Some(tag) || !self.epoch.is_current() {
            debug!("dropping {event:?} from stale connection {tag:?}");
            return;
        }

        match event {
            TransportEvent::Open => self.step(Input::TransportOpen),
            TransportEvent::Error(reason) => self.step(Input::TransportError(reason)),
            TransportEvent::Closed { code, reason } => {
                self.step(Input::TransportClosed { code, reason })
            }
            TransportEvent::Frame(raw) => self.on_frame(&raw),
        }
    }

    fn on_frame(&mut self, raw: &str) {
        let frame = match self.codec.decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping inbound frame: {e}");
                return;
            }
        };

        let state = self.machine.state();
        if !frame.is_handshake() && !state.is_connected() {
            debug!("dropping {} frame received while {state}", frame.kind());
            return;
        }

        match frame {
            InboundFrame::AuthAck {} => self.step(Input::AuthAck),
            InboundFrame::AuthError { reason } => {
                self.step(Input::AuthError(reason.unwrap_or_else(|| "rejected".into())))
            }
            frame => StreamDispatcher::new(&self.hub, &self.identity.user_id).apply(frame),
        }
    }

    /// Send an application frame. Only allowed while connected; nothing is queued.
    fn send(&mut self, frame: &OutboundFrame, echo: Option<Message>) -> PdResult<()> {
        if !self.machine.state().is_connected() {
            return Err(PdError::NotConnected);
        }
        self.transmit(frame)?;

        if self.local_echo {
            if let Some(message) = echo {
                StreamDispatcher::new(&self.hub, &self.identity.user_id).local_echo(message);
            }
        }
        Ok(())
    }

    fn transmit(&self, frame: &OutboundFrame) -> PdResult<()> {
        let conn = self.conn.as_ref().ok_or(PdError::NotConnected)?;
        let raw = self.codec.encode(frame)?;
        debug!("sending {} frame", frame.kind());
        conn.send(raw)
    }

    fn close_conn(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!("closing connection {:?}", conn.tag());
            conn.close();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.close_conn();
    }
}

async fn wait_timer(timer: &mut Option<(TimerId, Pin<Box<Sleep>>)>) -> TimerId {
    match timer {
        Some((id, sleep)) => {
            sleep.as_mut().await;
            *id
        }
        None => std::future::pending().await,
    }
}
