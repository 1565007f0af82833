use std::fmt;

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{E4Codec, Frame};
use crate::error::E4Error;
use crate::message::Command;

/// Port the bridge listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 28000;

const CHANNEL_CAPACITY: usize = 1024;

type Inbound = Result<Frame, E4Error>;

/// A line-framed TCP connection to the bridge.
///
/// A writer task drains outbound commands and a reader task forwards
/// decoded frames; both stop when the connection is closed.
#[derive(Debug)]
pub struct Connection {
    // Channel to send commands to background writer task
    tx: mpsc::Sender<Command>,
    // Channel to receive frames from background reader task
    rx: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (mut net_writer, mut net_reader) = Framed::new(stream, E4Codec::new()).split();
        let cancel = CancellationToken::new();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<Command>(CHANNEL_CAPACITY);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel::<Inbound>(CHANNEL_CAPACITY);

        // Writer task: User -> Network
        let writer_cancel = cancel.clone();
        let writer_err_tx = network_tx.clone();
        tokio::spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    next = network_rx.recv() => match next {
                        Some(command) => command,
                        None => break,
                    },
                };
                tracing::debug!(%command, "sending");
                if let Err(e) = net_writer.send(command).await {
                    tracing::error!("bridge write error: {e}");
                    let _ = writer_err_tx.send(Err(e)).await;
                    break;
                }
            }
            let _ = net_writer.close().await;
        });

        // Reader task: Network -> User
        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    next = net_reader.next() => next,
                };
                match next {
                    Some(Ok(frame)) => {
                        if network_tx.send(Ok(frame)).await.is_err() {
                            // user_rx was dropped, stop reading
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("bridge read error: {e}");
                        let _ = network_tx.send(Err(e)).await;
                        break;
                    }
                    None => {
                        tracing::debug!("bridge closed the connection");
                        break;
                    }
                }
            }
            // Peer gone: take the writer down with us.
            reader_cancel.cancel();
        });

        Self {
            tx: user_tx,
            rx: user_rx,
            cancel,
        }
    }

    /// Connect to the bridge. Failure here is fatal to client construction.
    pub async fn open(conn_info: &ConnectionInfo) -> Result<Self, E4Error> {
        let addr = conn_info.to_string();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| E4Error::ConnectFailure { addr, source })?;
        let _ = stream.set_nodelay(true);
        Ok(Self::new(stream))
    }

    pub async fn send(&self, command: Command) -> Result<(), E4Error> {
        send_on(&self.tx, &self.cancel, command).await
    }

    /// Next inbound frame.
    ///
    /// Fails with `ConnectionLost` on peer close, reset, or local close.
    pub async fn recv(&mut self) -> Result<Frame, E4Error> {
        match self.rx.recv().await {
            Some(inbound) => inbound,
            None => Err(E4Error::ConnectionLost),
        }
    }

    /// A cloneable handle for sending and closing from other tasks.
    pub fn sender(&self) -> ConnectionSender {
        ConnectionSender {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled by [`close`](Self::close).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

async fn send_on(
    tx: &mpsc::Sender<Command>,
    cancel: &CancellationToken,
    command: Command,
) -> Result<(), E4Error> {
    if cancel.is_cancelled() {
        return Err(E4Error::ConnectionLost);
    }
    tx.send(command).await?;
    Ok(())
}

/// Thread-safe send primitive shared by the command facade.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl ConnectionSender {
    pub async fn send(&self, command: Command) -> Result<(), E4Error> {
        send_on(&self.tx, &self.cancel, command).await
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
