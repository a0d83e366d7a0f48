use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use super::{Channel, ConnectionError, EchoTimer, SwitchApp};
use crate::config::ControllerConfig;
use crate::openflow::{
    DatapathId, Envelope, ErrorMsg, Hello, Message, OfpCodec, OfpProtocol, OFPET_HELLO_FAILED,
    OFPHFC_INCOMPATIBLE, OFP_VERSION,
};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ConnectionState {
    HelloSent,
    FeaturesRequested,
    Established,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            ConnectionState::HelloSent => "HelloSent",
            ConnectionState::FeaturesRequested => "FeaturesRequested",
            ConnectionState::Established => "Established",
        };
        write!(f, "{}", word)
    }
}

/// A single switch connection, from HELLO until the socket closes
pub struct Connection<T = TcpStream> {
    peer: String,
    protocol: OfpProtocol<T>,
    state: ConnectionState,
    dpid: Option<DatapathId>,
    echo_timer: EchoTimer,
    channel: Channel,
    outbound: mpsc::UnboundedReceiver<Message>,
    app: Arc<dyn SwitchApp>,
    next_xid: u32,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        peer: String,
        stream: T,
        config: Arc<ControllerConfig>,
        app: Arc<dyn SwitchApp>,
    ) -> Self {
        let (channel, outbound) = Channel::new();
        Self {
            peer,
            protocol: Framed::new(stream, OfpCodec::new()),
            state: ConnectionState::HelloSent,
            dpid: None,
            echo_timer: EchoTimer::new(config.echo_interval, config.echo_timeout),
            channel,
            outbound,
            app,
            next_xid: 0,
        }
    }

    /// Drive the connection until the switch goes away
    ///
    /// The app is told about the disconnect only if the switch had finished
    /// the handshake.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.process().await;
        if let (ConnectionState::Established, Some(dpid)) = (self.state, self.dpid) {
            self.app.switch_disconnected(dpid, &self.channel).await;
        }
        result
    }

    async fn process(&mut self) -> Result<(), ConnectionError> {
        let hello = Hello {
            version_bitmap: Some(1 << OFP_VERSION),
        };
        self.send(Message::Hello(hello)).await?;
        loop {
            self.poll().await?;
        }
    }

    /// Wait for either an incoming message, an outbound message, or an echo timer event
    async fn poll(&mut self) -> Result<(), ConnectionError> {
        tokio::select! {
            frame = self.protocol.next() => {
                match frame {
                    // Framed stream is exhausted, switch closed connection
                    None => Err(ConnectionError::Closed),
                    Some(Ok(envelope)) => {
                        self.echo_timer.received();
                        self.handle(envelope).await
                    }
                    // Error decoding message
                    Some(Err(err)) => Err(err.into()),
                }
            },
            Some(message) = self.outbound.recv() => self.send(message).await,
            echo = self.echo_timer.should_send_echo() => {
                if echo? && self.state == ConnectionState::Established {
                    trace!("[{}] Sending echo, {} until timeout", self.peer, self.echo_timer);
                    self.send(Message::EchoRequest(Bytes::new())).await?;
                    self.echo_timer.sent();
                }
                Ok(())
            },
        }
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<(), ConnectionError> {
        let Envelope {
            version,
            xid,
            message,
        } = envelope;
        trace!("[{}] Incoming: {}", self.peer, message.message_type());
        match message {
            Message::Hello(hello) => {
                if self.state != ConnectionState::HelloSent {
                    debug!("[{}] Ignoring HELLO in state {}", self.peer, self.state);
                    return Ok(());
                }
                if !negotiate(version, &hello) {
                    let error = ErrorMsg {
                        err_type: OFPET_HELLO_FAILED,
                        code: OFPHFC_INCOMPATIBLE,
                        data: Bytes::from_static(b"OpenFlow 1.3 required"),
                    };
                    self.send(Message::Error(error)).await?;
                    return Err(ConnectionError::IncompatibleVersion(version));
                }
                self.send(Message::FeaturesRequest).await?;
                self.update_state(ConnectionState::FeaturesRequested);
            }
            Message::EchoRequest(data) => {
                self.protocol
                    .send(Envelope::new(xid, Message::EchoReply(data)))
                    .await?;
            }
            Message::EchoReply(_) => (),
            Message::FeaturesReply(features) => {
                if self.state != ConnectionState::FeaturesRequested {
                    debug!("[{}] Ignoring FEATURES_REPLY in state {}", self.peer, self.state);
                    return Ok(());
                }
                let dpid = features.datapath_id;
                self.dpid = Some(dpid);
                self.update_state(ConnectionState::Established);
                info!(
                    "[{}] Switch {} connected ({} tables, {} buffers)",
                    self.peer, dpid, features.n_tables, features.n_buffers
                );
                self.app
                    .switch_connected(dpid, &features, &self.channel)
                    .await;
            }
            Message::PacketIn(packet_in) => match self.established() {
                Some(dpid) => self.app.packet_in(dpid, &packet_in, &self.channel).await,
                None => debug!("[{}] PACKET_IN before handshake", self.peer),
            },
            Message::Error(error) => match self.established() {
                Some(dpid) => self.app.error(dpid, &error).await,
                None => warn!("[{}] {}", self.peer, error),
            },
            Message::Malformed(code) => {
                debug!("[{}] Dropping malformed message type {}", self.peer, code)
            }
            other => trace!("[{}] Ignoring {}", self.peer, other.message_type()),
        }
        Ok(())
    }

    fn established(&self) -> Option<DatapathId> {
        match self.state {
            ConnectionState::Established => self.dpid,
            _ => None,
        }
    }

    fn update_state(&mut self, new_state: ConnectionState) {
        debug!("{} went from {} to {}", self.peer, self.state, new_state);
        self.state = new_state;
    }

    /// Send a controller-initiated message with a fresh transaction id
    async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        self.next_xid = self.next_xid.wrapping_add(1);
        trace!("[{}] Outgoing: {}", self.peer, message.message_type());
        self.protocol
            .send(Envelope::new(self.next_xid, message))
            .await?;
        Ok(())
    }
}

/// Both sides agree on OpenFlow 1.3, using the version bitmap when offered
fn negotiate(version: u8, hello: &Hello) -> bool {
    match hello.version_bitmap {
        Some(_) => hello.supports(OFP_VERSION),
        None => version >= OFP_VERSION,
    }
}
