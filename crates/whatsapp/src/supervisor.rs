//! Connection lifecycle: connect, observe, reconnect or give up.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use {
    tokio::sync::watch,
    tracing::{debug, error, info, warn},
};

use {
    zenor_config::WelcomeConfig,
    zenor_protocol::{
        ConnectionPhase, ConnectionUpdate, DisconnectReason, MediaSource, OutgoingContent,
        SendOptions, TransportEvent,
    },
    zenor_session::{CredentialBlob, CredentialHandle},
};

use crate::{
    context::AppContext,
    dispatch::Pipeline,
    error::{Error, Result},
    retry::RetryPolicy,
    transport::{ConnectOptions, Connection, Socket, Transport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Why [`Supervisor::run`] stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The session was revoked. Credentials were removed; pairing is required.
    LoggedOut,
}

/// How one connection ended.
struct Closed {
    reason: DisconnectReason,
    opened: bool,
}

pub struct Supervisor {
    ctx: AppContext,
    transport: Arc<dyn Transport>,
    pipeline: Arc<Pipeline>,
    policy: RetryPolicy,
    state: watch::Sender<ConnectionState>,
    qr: watch::Sender<Option<String>>,
    welcomed: AtomicBool,
    connects: AtomicU32,
}

impl Supervisor {
    pub fn new(ctx: AppContext, transport: Arc<dyn Transport>, pipeline: Arc<Pipeline>) -> Self {
        let policy = RetryPolicy::from(&ctx.config.reconnect);
        Self {
            ctx,
            transport,
            pipeline,
            policy,
            state: watch::Sender::new(ConnectionState::Disconnected),
            qr: watch::Sender::new(None),
            welcomed: AtomicBool::new(false),
            connects: AtomicU32::new(0),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Pairing code waiting to be scanned, if any.
    pub fn current_qr(&self) -> Option<String> {
        self.qr.borrow().clone()
    }

    pub fn subscribe_qr(&self) -> watch::Receiver<Option<String>> {
        self.qr.subscribe()
    }

    /// Number of `connect()` calls made so far.
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Keep a connection alive until the session is logged out.
    ///
    /// Returns an error when a connection cannot be constructed at all or the
    /// retry budget runs out.
    pub async fn run(&self, mut handle: CredentialHandle) -> Result<SupervisorExit> {
        let mut attempts: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);
            let options = ConnectOptions {
                pairing: handle.needs_pairing(),
                browser: self.ctx.config.bot.browser.clone(),
            };
            info!(pairing = options.pairing, attempt = attempts, "connecting");

            let conn = match self.transport.connect(handle.blob(), &options).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "could not create connection");
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                },
            };
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.ctx.set_socket(Some(Arc::clone(&conn.socket))).await;

            let closed = self.drive(conn, &mut handle).await;
            self.ctx.set_socket(None).await;

            if closed.reason.is_logged_out() {
                warn!("logged out, removing stored credentials; pairing required");
                if let Err(e) = self.ctx.store.clear().await {
                    warn!(error = %e, "failed to remove credentials");
                }
                self.set_state(ConnectionState::Disconnected);
                return Ok(SupervisorExit::LoggedOut);
            }

            if closed.opened {
                attempts = 0;
            }
            if !self.policy.should_retry(attempts) {
                error!(attempts, reason = %closed.reason, "reconnect budget exhausted");
                self.set_state(ConnectionState::Disconnected);
                return Err(Error::RetriesExhausted { attempts });
            }

            let delay = self.policy.delay_for(attempts);
            attempts += 1;
            warn!(
                reason = %closed.reason,
                delay_ms = delay.as_millis() as u64,
                attempt = attempts,
                "connection closed, reconnecting"
            );
            self.set_state(ConnectionState::Disconnected);
            tokio::time::sleep(delay).await;
        }
    }

    /// Process events of one connection in order until it closes.
    async fn drive(&self, mut conn: Connection, handle: &mut CredentialHandle) -> Closed {
        let mut opened = false;

        while let Some(event) = conn.events.recv().await {
            match event {
                TransportEvent::ConnectionUpdate(update) => {
                    if let Some(reason) = self.on_connection_update(&update, &conn.socket) {
                        self.set_state(ConnectionState::Closing);
                        return Closed { reason, opened };
                    }
                    opened |= update.connection == Some(ConnectionPhase::Open);
                },
                TransportEvent::CredentialsUpdate(creds) => {
                    match CredentialBlob::from_json(&creds) {
                        Ok(blob) => {
                            if let Err(e) = self.ctx.store.save(&blob).await {
                                warn!(error = %e, "failed to persist updated credentials");
                            }
                            *handle = CredentialHandle::authenticated(blob);
                        },
                        Err(e) => warn!(error = %e, "unserializable credential update"),
                    }
                },
                TransportEvent::MessagesUpsert(upsert) => {
                    let dispositions = self.pipeline.handle_upsert(upsert, &conn.socket);
                    debug!(?dispositions, "upsert processed");
                },
                TransportEvent::Call(calls) => self.pipeline.handle_call(calls),
                TransportEvent::GroupParticipantsUpdate(update) => {
                    self.pipeline.handle_group_update(update)
                },
            }
        }

        debug!("event stream ended without a close event");
        Closed {
            reason: DisconnectReason::ConnectionLost,
            opened,
        }
    }

    /// Returns the close reason when the update closes the connection.
    fn on_connection_update(
        &self,
        update: &ConnectionUpdate,
        socket: &Arc<dyn Socket>,
    ) -> Option<DisconnectReason> {
        if let Some(qr) = &update.qr {
            info!(qr = %qr, "pairing code received, scan it to link the device");
            self.qr.send_replace(Some(qr.clone()));
        }

        match update.connection {
            Some(ConnectionPhase::Connecting) => self.set_state(ConnectionState::Connecting),
            Some(ConnectionPhase::Open) => {
                self.qr.send_replace(None);
                self.set_state(ConnectionState::Open);
                if self.welcomed.swap(true, Ordering::SeqCst) {
                    info!("connection reestablished");
                } else {
                    info!(me = ?socket.self_id(), "connected");
                    if self.ctx.config.welcome.enabled {
                        tokio::spawn(send_welcome(
                            self.ctx.config.welcome.clone(),
                            Arc::clone(socket),
                        ));
                    }
                }
            },
            Some(ConnectionPhase::Close) => return update.close_reason(),
            None => {},
        }
        None
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state");
        }
    }
}

/// One-time greeting to the bot's own chat. Failures are logged only.
async fn send_welcome(welcome: WelcomeConfig, socket: Arc<dyn Socket>) {
    let Some(me) = socket.self_id() else {
        warn!("own id unknown, skipping welcome message");
        return;
    };
    let content = match welcome.image_url {
        Some(url) => OutgoingContent::Image {
            image: MediaSource { url },
            caption: Some(welcome.caption),
        },
        None => OutgoingContent::text(welcome.caption),
    };
    if let Err(e) = socket
        .send_message(&me, content, SendOptions::default())
        .await
    {
        warn!(error = %e, "failed to send welcome message");
    }
}
