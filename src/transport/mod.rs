//! Switch-facing side of the controller
//!
//! Accepts OpenFlow switch connections, runs the handshake and echo keepalive,
//! and hands decoded events to a [`SwitchApp`]. Everything the app sends goes
//! back out through the connection's [`Channel`].

mod channel;
mod connection;
mod echo_timer;

pub use channel::{Channel, SendError};
pub use connection::{Connection, ConnectionState};
use echo_timer::EchoTimer;

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::config::ControllerConfig;
use crate::openflow::{DatapathId, ErrorMsg, PacketIn, SwitchFeatures};

/// Application logic driven by switch events
///
/// Events for a single switch arrive in order from that switch's connection
/// task; events for different switches may be delivered concurrently.
#[async_trait]
pub trait SwitchApp: Send + Sync {
    /// Handshake finished, the switch is ready to be programmed
    async fn switch_connected(&self, dpid: DatapathId, features: &SwitchFeatures, channel: &Channel);

    async fn packet_in(&self, dpid: DatapathId, packet_in: &PacketIn, channel: &Channel);

    /// ERROR message reported by the switch
    async fn error(&self, dpid: DatapathId, error: &ErrorMsg);

    /// Connection to the switch ended; `channel` identifies which connection,
    /// since the same switch may already have reconnected
    async fn switch_disconnected(&self, dpid: DatapathId, channel: &Channel);
}

#[derive(Debug)]
pub enum ConnectionError {
    /// Switch closed the connection
    Closed,
    /// Switch doesn't speak OpenFlow 1.3. [offered version]
    IncompatibleVersion(u8),
    /// Nothing heard from the switch. [timeout seconds]
    EchoTimeout(u16),
    /// Something happened in transport. [reason]
    Transport(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Connection Error: ")?;
        use ConnectionError::*;
        match self {
            Closed => write!(f, "Closed by switch"),
            IncompatibleVersion(v) => write!(f, "Incompatible OpenFlow version {:#04x}", v),
            EchoTimeout(t) => write!(f, "No echo reply after {} seconds", t),
            Transport(r) => write!(f, "Transport error [{}]", r),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        ConnectionError::Transport(error.to_string())
    }
}

impl error::Error for ConnectionError {}

/// Listen for switches and run a connection task for each one
pub async fn serve(config: Arc<ControllerConfig>, app: Arc<dyn SwitchApp>) -> io::Result<()> {
    let socket = config.listen_socket();
    let listener = TcpListener::bind(socket).await?;
    info!("Listening for OpenFlow switches on {}", socket);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("Incoming connection from {}", addr);
        if let Err(err) = stream.set_nodelay(true) {
            warn!("[{}] Unable to set TCP_NODELAY: {}", addr, err);
        }
        let connection = Connection::new(
            addr.to_string(),
            stream,
            Arc::clone(&config),
            Arc::clone(&app),
        );
        tokio::spawn(async move {
            match connection.run().await {
                Ok(()) | Err(ConnectionError::Closed) => info!("[{}] Connection ended", addr),
                Err(err) => warn!("[{}] {}", addr, err),
            }
        });
    }
}
