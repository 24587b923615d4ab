//! WebSocket transport over tokio-tungstenite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use pd_core::constants::CLOSE_ABNORMAL;
use pd_core::error::{PdError, PdResult};

use super::{ConnTag, Transport, TransportEvent, TransportHandle, TransportSink};

/// Opens one tokio task per connection.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    headers: HashMap<String, String>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra headers sent with the upgrade request (tunnel skip headers and such).
    pub fn with_headers(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    fn build_request(&self, url: &str) -> PdResult<Request<()>> {
        let mut request = url
            .into_client_request()
            .map_err(|e| PdError::Transport(format!("invalid socket url {url}: {e}")))?;

        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| PdError::Config(format!("invalid header name {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| PdError::Config(format!("invalid header value for {key}: {e}")))?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

impl Transport for WsTransport {
    fn open(&self, url: &str, tag: ConnTag, sink: TransportSink) -> Box<dyn TransportHandle> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let request = self.build_request(url);
        tokio::spawn(run_connection(
            request,
            tag,
            sink,
            out_rx,
            open.clone(),
            shutdown.clone(),
        ));

        Box::new(WsHandle {
            tag,
            out_tx,
            open,
            closed: AtomicBool::new(false),
            shutdown,
        })
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

struct WsHandle {
    tag: ConnTag,
    out_tx: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
    shutdown: Arc<Notify>,
}

impl TransportHandle for WsHandle {
    fn send(&self, raw: String) -> PdResult<()> {
        if !self.is_open() {
            return Err(PdError::Transport("socket is not open".into()));
        }
        self.out_tx
            .send(raw)
            .map_err(|_| PdError::Transport("socket task has exited".into()))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.open.store(false, Ordering::SeqCst);
        // notify_one keeps a permit, so a close issued mid-handshake still lands.
        self.shutdown.notify_one();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn tag(&self) -> ConnTag {
        self.tag
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    request: PdResult<Request<()>>,
    tag: ConnTag,
    sink: TransportSink,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    open: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let emit = |event: TransportEvent| {
        let _ = sink.send((tag, event));
    };
    let abnormal = |reason: String| TransportEvent::Closed {
        code: CLOSE_ABNORMAL,
        reason,
    };

    let request = match request {
        Ok(r) => r,
        Err(e) => {
            emit(TransportEvent::Error(e.to_string()));
            emit(abnormal(e.to_string()));
            return;
        }
    };
    let target = request.uri().to_string();

    let stream = tokio::select! {
        _ = shutdown.notified() => {
            debug!("socket {tag:?} closed before it opened");
            return;
        }
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("socket connect to {target} failed: {e}");
                emit(TransportEvent::Error(e.to_string()));
                emit(abnormal(e.to_string()));
                return;
            }
        },
    };

    info!("socket connected to {target}");
    open.store(true, Ordering::SeqCst);
    emit(TransportEvent::Open);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("socket {tag:?} closing on request");
                let _ = write.send(WsMessage::Close(None)).await;
                let _ = write.close().await;
                break;
            }
            outgoing = out_rx.recv() => {
                let Some(text) = outgoing else { break };
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    emit(TransportEvent::Error(e.to_string()));
                    emit(abnormal(e.to_string()));
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => emit(TransportEvent::Frame(text.as_str().to_string())),
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => emit(TransportEvent::Frame(text)),
                    Err(_) => warn!("dropping non-utf8 binary frame ({} bytes)", bytes.len()),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or((CLOSE_ABNORMAL, String::new()));
                    emit(TransportEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(e.to_string()));
                    emit(abnormal(e.to_string()));
                    break;
                }
                None => {
                    emit(abnormal("stream ended".into()));
                    break;
                }
            },
        }
    }

    open.store(false, Ordering::SeqCst);
    debug!("socket task {tag:?} exited");
}
