//! TCP connection management for a TiVo device.
//!
//! Each device gets one background task that owns the socket, the line
//! framer and the [`DeviceState`]. Callers hold a [`TivoClient`] and talk to
//! the task over a channel, so every write is ordered with respect to socket
//! state changes and every state update happens on the task.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;

use tivo_protocol::{encode_command_into, ClientError, LineFramer, TIVO_PORT};

use crate::bridge::Bridge;
use crate::client::backoff::Backoff;
use crate::client::interpreter::{ResponseInterpreter, Transition};
use crate::client::state::{ConnectionState, DeviceState};
use crate::client::translator::{CommandTranslator, WireWriter};

/// Capacity of the request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Device identifier used in logs and bridge notifications.
    pub device: String,
    /// Device IP address or host name.
    pub ip: String,
    /// Remote-control port.
    pub port: u16,
    pub connect_timeout: Duration,
    /// First reconnect delay.
    pub backoff_initial: Duration,
    /// Upper bound for the reconnect delay.
    pub backoff_max: Duration,
}

impl ConnectionConfig {
    /// Configuration with default port and timings.
    pub fn new(device: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ip: ip.into(),
            port: TIVO_PORT,
            connect_timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }

    /// `ip:port` for display.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Work requested by a [`TivoClient`] handle.
#[derive(Debug)]
enum Action {
    Command { kind: String, arg: String },
    Channel { num: String, force: bool },
    IrCode { code: String },
    TuneLive { num: String, force: bool },
    Shutdown,
}

struct Request {
    action: Action,
    /// For `TuneLive`, whether the channel was keyed immediately.
    reply: oneshot::Sender<Result<bool, ClientError>>,
}

/// Handle to a device connection.
///
/// Cheap to clone. The connection task stops after [`TivoClient::shutdown`]
/// or once every handle is dropped.
#[derive(Clone)]
pub struct TivoClient {
    device: String,
    addr: String,
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<DeviceState>,
    connection: watch::Receiver<ConnectionState>,
}

impl TivoClient {
    /// Start the connection task for one device and register the returned
    /// handle with `bridge` as the device's command handler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ConnectionConfig, bridge: Arc<dyn Bridge>) -> Self {
        let (req_tx, req_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(DeviceState::default());
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Disconnected);

        let client = Self {
            device: config.device.clone(),
            addr: config.addr(),
            requests: req_tx,
            state: state_rx,
            connection: conn_rx,
        };

        let task = ConnectionTask {
            backoff: Backoff::new(config.backoff_initial, config.backoff_max),
            config,
            bridge: Arc::clone(&bridge),
            requests: req_rx,
            state: DeviceState::default(),
            state_tx,
            conn_tx,
            framer: LineFramer::new(),
        };
        tokio::spawn(task.run());

        bridge.on_command(&client.device, client.clone());
        client
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Snapshot of the device state.
    pub fn state(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    /// Receiver notified after every state update.
    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.state.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    /// Run a caller command: an IR code name or a zero-padded channel.
    pub async fn command(&self, kind: &str, arg: &str) -> Result<(), ClientError> {
        self.request(Action::Command {
            kind: kind.to_string(),
            arg: arg.to_string(),
        })
        .await
        .map(drop)
    }

    /// Key in a channel number followed by `ENTER`.
    pub async fn channel(&self, num: &str, force: bool) -> Result<(), ClientError> {
        self.request(Action::Channel {
            num: num.to_string(),
            force,
        })
        .await
        .map(drop)
    }

    /// Send one IR code.
    pub async fn ircode(&self, code: &str) -> Result<(), ClientError> {
        self.request(Action::IrCode {
            code: code.to_string(),
        })
        .await
        .map(drop)
    }

    /// Tune `num` once the device is on live TV, switching to live TV first
    /// if needed. Returns true if the channel was keyed immediately.
    pub async fn tune_live(&self, num: &str, force: bool) -> Result<bool, ClientError> {
        self.request(Action::TuneLive {
            num: num.to_string(),
            force,
        })
        .await
    }

    /// Stop the connection task.
    pub async fn shutdown(&self) {
        let _ = self.request(Action::Shutdown).await;
    }

    async fn request(&self, action: Action) -> Result<bool, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request { action, reply })
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    }
}

impl std::fmt::Debug for TivoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TivoClient")
            .field("device", &self.device)
            .field("addr", &self.addr)
            .field("connection", &self.connection_state())
            .finish()
    }
}

/// Outbound command buffer flushed by the connection task.
struct Outbound {
    buf: BytesMut,
    connected: bool,
}

impl Outbound {
    fn connected() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            connected: true,
        }
    }

    fn disconnected() -> Self {
        Self {
            buf: BytesMut::new(),
            connected: false,
        }
    }
}

impl WireWriter for Outbound {
    fn write_line(&mut self, command: &str) -> Result<(), ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        encode_command_into(command, &mut self.buf);
        Ok(())
    }
}

/// Why a connected session ended.
enum Served {
    Shutdown,
    Lost(io::Error),
}

/// Background task owning the socket and device state.
struct ConnectionTask {
    config: ConnectionConfig,
    bridge: Arc<dyn Bridge>,
    requests: mpsc::Receiver<Request>,
    state: DeviceState,
    state_tx: watch::Sender<DeviceState>,
    conn_tx: watch::Sender<ConnectionState>,
    framer: LineFramer,
    backoff: Backoff,
}

impl ConnectionTask {
    async fn run(mut self) {
        info!("[{}] Connecting to {}", self.config.device, self.config.addr());

        loop {
            self.conn_tx.send_replace(ConnectionState::Connecting);

            match self.connect().await {
                None => break,
                Some(Ok(stream)) => {
                    self.backoff.reset();
                    info!("[{}] Connected to {}", self.config.device, self.config.addr());
                    self.conn_tx.send_replace(ConnectionState::Connected);

                    let served = self.serve(stream).await;
                    if !self.framer.pending().is_empty() {
                        debug!(
                            "[{}] Dropping {} bytes of partial line",
                            self.config.device,
                            self.framer.pending().len()
                        );
                    }
                    self.framer.clear();
                    self.conn_tx.send_replace(ConnectionState::Disconnected);
                    match served {
                        Served::Shutdown => break,
                        Served::Lost(e) => {
                            warn!("[{}] Connection lost: {}", self.config.device, e);
                        }
                    }
                }
                Some(Err(e)) => {
                    self.conn_tx.send_replace(ConnectionState::Disconnected);
                    if self.backoff.attempt() == 0 {
                        info!(
                            "[{}] Connect to {} failed: {}",
                            self.config.device,
                            self.config.addr(),
                            e
                        );
                    } else {
                        debug!(
                            "[{}] Connect to {} failed (attempt {}): {}",
                            self.config.device,
                            self.config.addr(),
                            self.backoff.attempt() + 1,
                            e
                        );
                    }
                }
            }

            let delay = self.backoff.next_delay();
            debug!("[{}] Reconnecting in {:?}", self.config.device, delay);
            if self.wait_rejecting(time::sleep(delay)).await.is_none() {
                break;
            }
        }

        self.conn_tx.send_replace(ConnectionState::Disconnected);
        info!("[{}] Client stopped", self.config.device);
    }

    /// Attempt one TCP connect. `None` means the client was shut down.
    async fn connect(&mut self) -> Option<io::Result<TcpStream>> {
        let addr = (self.config.ip.clone(), self.config.port);
        let timeout = self.config.connect_timeout;
        let attempt = async move {
            match time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            }
        };
        self.wait_rejecting(attempt).await
    }

    /// Drive `fut` while answering requests as disconnected.
    ///
    /// Returns `None` if the client shut down first.
    async fn wait_rejecting<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Some(out),
                req = self.requests.recv() => {
                    let req = req?;
                    if matches!(req.action, Action::Shutdown) {
                        let _ = req.reply.send(Ok(true));
                        return None;
                    }
                    let result = self.perform(req.action, &mut Outbound::disconnected());
                    let _ = req.reply.send(result);
                }
            }
        }
    }

    /// Run the read/write loop on a connected socket.
    async fn serve(&mut self, stream: TcpStream) -> Served {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("[{}] set_nodelay failed: {}", self.config.device, e);
        }
        let (mut reader, mut writer) = stream.into_split();
        let mut read_buf = BytesMut::with_capacity(4096);
        let mut outbound = Outbound::connected();

        loop {
            tokio::select! {
                req = self.requests.recv() => {
                    let Some(Request { action, reply }) = req else {
                        return Served::Shutdown;
                    };
                    if matches!(action, Action::Shutdown) {
                        let _ = reply.send(Ok(true));
                        return Served::Shutdown;
                    }

                    let result = self.perform(action, &mut outbound);
                    if let Err(e) = flush(&mut writer, &mut outbound).await {
                        let _ = reply.send(Err(ClientError::WriteFailed(e.to_string())));
                        return Served::Lost(e);
                    }
                    let _ = reply.send(result);
                }

                result = reader.read_buf(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            return Served::Lost(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed by device",
                            ));
                        }
                        Ok(_) => {
                            let chunk = read_buf.split();
                            for line in self.framer.feed(&chunk) {
                                self.handle_line(&line, &mut outbound);
                            }
                            if let Err(e) = flush(&mut writer, &mut outbound).await {
                                return Served::Lost(e);
                            }
                        }
                        Err(e) => return Served::Lost(e),
                    }
                }
            }
        }
    }

    /// Interpret one line, relay it to the bridge and publish the new state.
    fn handle_line(&mut self, line: &str, outbound: &mut Outbound) {
        trace!("[{}] <- {}", self.config.device, line);

        let interpreter = ResponseInterpreter::new(&self.config.device);
        match interpreter.apply_line(&mut self.state, line, outbound) {
            Ok(outcome) => {
                if let Transition::NoTransition { command } = &outcome.transition {
                    trace!("[{}] Ignoring {}", self.config.device, command);
                }
            }
            Err(e) => warn!("[{}] Malformed line {:?}: {}", self.config.device, line, e),
        }

        self.bridge.publish(&self.config.device, line);
        self.publish_state();
    }

    /// Translate a caller action onto `outbound`.
    fn perform(&mut self, action: Action, outbound: &mut Outbound) -> Result<bool, ClientError> {
        let device = self.config.device.as_str();
        let result = match action {
            Action::Command { kind, arg } => {
                CommandTranslator::new(device, outbound).command(&kind, &arg).map(|_| true)
            }
            Action::Channel { num, force } => {
                CommandTranslator::new(device, outbound).channel(&num, force).map(|_| true)
            }
            Action::IrCode { code } => {
                CommandTranslator::new(device, outbound).ircode(&code).map(|_| true)
            }
            Action::TuneLive { num, force } => {
                ResponseInterpreter::new(device).tune_live(&mut self.state, &num, force, outbound)
            }
            Action::Shutdown => Ok(true),
        };

        if let Err(e) = &result {
            debug!("[{}] Request rejected: {}", self.config.device, e);
        }
        self.publish_state();
        result
    }

    fn publish_state(&self) {
        let state = &self.state;
        self.state_tx.send_if_modified(|current| {
            if current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
    }
}

/// Write everything queued on `outbound` to the socket.
async fn flush<W: AsyncWrite + Unpin>(writer: &mut W, outbound: &mut Outbound) -> io::Result<()> {
    if outbound.buf.is_empty() {
        return Ok(());
    }
    let data = outbound.buf.split();
    trace!("-> {:?}", String::from_utf8_lossy(&data));
    writer.write_all(&data).await?;
    writer.flush().await
}
