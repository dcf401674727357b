//! WebSocket bridge to the protocol sidecar.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock as StdRwLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD},
    bytes::Bytes,
    futures::{SinkExt, StreamExt},
    tokio::{
        net::TcpStream,
        sync::{Mutex, mpsc, oneshot},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {
    zenor_protocol::{
        ConnectionPhase, GatewayFrame, MessageKey, OutgoingContent, REQUEST_TIMEOUT_MS,
        SendOptions, SidecarFrame, TransportEvent, WebMessage,
    },
    zenor_session::CredentialBlob,
};

use crate::{
    error::{Error, Result},
    transport::{ConnectOptions, Connection, MediaStream, Socket, Transport},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_BUFFER: usize = 256;
const MEDIA_BUFFER: usize = 32;

/// A request waiting for its answer from the sidecar.
enum Pending {
    Ack(oneshot::Sender<Result<Option<String>>>),
    Media(mpsc::Sender<Result<Bytes>>),
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

/// [`Transport`] that talks to the protocol sidecar over WebSocket.
pub struct SidecarTransport {
    url: String,
    handshake_attempts: u32,
    request_timeout: Duration,
}

impl SidecarTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_attempts: 10,
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
        }
    }

    pub fn with_handshake_attempts(mut self, attempts: u32) -> Self {
        self.handshake_attempts = attempts.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn connect(
        &self,
        credentials: Option<&CredentialBlob>,
        options: &ConnectOptions,
    ) -> Result<Connection> {
        let ws = connect_with_retry(&self.url, self.handshake_attempts).await?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let me = Arc::new(StdRwLock::new(None));

        write_tx
            .send(GatewayFrame::Connect {
                credentials: credentials.map(|c| c.expose().to_string()),
                pairing: options.pairing,
                browser: options.browser.clone(),
            })
            .map_err(|_| Error::NotConnected)?;

        tokio::spawn(run_connection(
            ws,
            write_rx,
            event_tx,
            Arc::clone(&pending),
            Arc::clone(&me),
        ));

        let socket = SidecarSocket {
            write_tx,
            pending,
            me,
            request_timeout: self.request_timeout,
        };
        Ok(Connection {
            events: event_rx,
            socket: Arc::new(socket),
        })
    }
}

/// Connect to the sidecar, retrying while its server starts up.
pub async fn connect_with_retry(url: &str, attempts: u32) -> Result<WsStream> {
    let mut last_error = None;
    for attempt in 1..=attempts {
        match connect_async(url).await {
            Ok((ws, _response)) => {
                info!(url, attempt, "connected to sidecar");
                return Ok(ws);
            },
            Err(e) => {
                debug!(url, attempt, error = %e, "sidecar not reachable yet");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
            },
        }
    }
    Err(Error::Connection(match last_error {
        Some(e) => format!("{url}: {e}"),
        None => format!("{url}: no connection attempts made"),
    }))
}

/// Pump frames in both directions until either side goes away.
async fn run_connection(
    ws: WsStream,
    mut write_rx: mpsc::UnboundedReceiver<GatewayFrame>,
    event_tx: mpsc::Sender<TransportEvent>,
    pending: PendingMap,
    me: Arc<StdRwLock<Option<String>>>,
) {
    let (mut sink, mut reader) = ws.split();

    loop {
        tokio::select! {
            msg = reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SidecarFrame>(&text) {
                            Ok(frame) => {
                                if !handle_frame(frame, &event_tx, &pending, &me).await {
                                    debug!("event receiver dropped, closing sidecar connection");
                                    break;
                                }
                            },
                            Err(e) => warn!(error = %e, "invalid frame from sidecar"),
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            warn!(error = %e, "failed to answer ping");
                            break;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("sidecar closed the connection");
                        break;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!(error = %e, "sidecar connection error");
                        break;
                    },
                }
            },
            frame = write_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                debug!(?frame, "sending frame to sidecar");
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode frame");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!(error = %e, "failed to write to sidecar");
                    break;
                }
            },
        }
    }

    // Unblock everything still waiting on this connection.
    for (request_id, waiter) in pending.lock().await.drain() {
        debug!(%request_id, "failing pending request, connection gone");
        match waiter {
            Pending::Ack(tx) => {
                let _ = tx.send(Err(Error::NotConnected));
            },
            Pending::Media(tx) => {
                let _ = tx.send(Err(Error::NotConnected)).await;
            },
        }
    }
}

/// Route one inbound frame. Returns `false` once nobody listens for events.
async fn handle_frame(
    frame: SidecarFrame,
    event_tx: &mpsc::Sender<TransportEvent>,
    pending: &PendingMap,
    me: &StdRwLock<Option<String>>,
) -> bool {
    match frame {
        SidecarFrame::Event { event, data } => match TransportEvent::from_wire(&event, data) {
            Ok(Some(event)) => {
                if let TransportEvent::ConnectionUpdate(update) = &event
                    && update.connection == Some(ConnectionPhase::Open)
                    && let Some(id) = &update.me
                    && let Ok(mut slot) = me.write()
                {
                    *slot = Some(id.clone());
                }
                return event_tx.send(event).await.is_ok();
            },
            Ok(None) => debug!(%event, "ignoring unknown sidecar event"),
            Err(e) => warn!(%event, error = %e, "malformed sidecar event"),
        },
        SidecarFrame::Ack {
            request_id,
            success,
            message_id,
            error,
        } => {
            let Some(Pending::Ack(tx)) = pending.lock().await.remove(&request_id) else {
                debug!(%request_id, "ack for unknown request");
                return true;
            };
            let result = if success {
                Ok(message_id)
            } else {
                Err(Error::SendFailed(
                    error.unwrap_or_else(|| "unknown error".into()),
                ))
            };
            let _ = tx.send(result);
        },
        SidecarFrame::MediaChunk { request_id, data } => {
            let tx = match pending.lock().await.get(&request_id) {
                Some(Pending::Media(tx)) => tx.clone(),
                _ => return true,
            };
            let chunk = STANDARD
                .decode(data)
                .map(Bytes::from)
                .map_err(|e| Error::Media(e.to_string()));
            let _ = tx.send(chunk).await;
        },
        SidecarFrame::MediaEnd { request_id } => {
            pending.lock().await.remove(&request_id);
        },
        SidecarFrame::MediaError { request_id, error } => {
            if let Some(Pending::Media(tx)) = pending.lock().await.remove(&request_id) {
                let _ = tx.send(Err(Error::Media(error))).await;
            }
        },
        SidecarFrame::Error { error } => warn!(%error, "sidecar error"),
    }
    true
}

/// [`Socket`] backed by a sidecar connection.
pub struct SidecarSocket {
    write_tx: mpsc::UnboundedSender<GatewayFrame>,
    pending: PendingMap,
    me: Arc<StdRwLock<Option<String>>>,
    request_timeout: Duration,
}

impl SidecarSocket {
    async fn request(&self, build: impl FnOnce(String) -> GatewayFrame) -> Result<Option<String>> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), Pending::Ack(tx));

        if self.write_tx.send(build(request_id.clone())).is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(Error::NotConnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::Timeout { request_id })
            },
        }
    }
}

#[async_trait]
impl Socket for SidecarSocket {
    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
        options: SendOptions,
    ) -> Result<Option<String>> {
        let jid = jid.to_string();
        self.request(|request_id| GatewayFrame::SendMessage {
            request_id,
            jid,
            content,
            options,
        })
        .await
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()> {
        let keys = keys.to_vec();
        self.request(|request_id| GatewayFrame::ReadMessages { request_id, keys })
            .await
            .map(|_| ())
    }

    async fn download_media(&self, message: &WebMessage) -> Result<MediaStream> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(MEDIA_BUFFER);
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), Pending::Media(tx));

        let frame = GatewayFrame::DownloadMedia {
            request_id: request_id.clone(),
            message: message.clone(),
        };
        if self.write_tx.send(frame).is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(Error::NotConnected);
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    fn self_id(&self) -> Option<String> {
        self.me.read().ok().and_then(|me| me.clone())
    }
}
