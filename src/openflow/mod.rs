//! OpenFlow 1.3 messages used by the controller
//!
//! Only the subset of the protocol needed to bootstrap a switch, learn hosts
//! from packet-ins, and program flows/meters is modeled here.

mod codec;

pub use codec::{Envelope, OfpCodec, OfpProtocol};

use std::fmt;

use bytes::Bytes;
use itertools::Itertools;

use crate::packet::MacAddress;

pub const OFP_VERSION: u8 = 0x04;
pub const OFP_HEADER_LEN: usize = 8;

pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

// Reserved port numbers
pub const OFPP_FLOOD: u32 = 0xffff_fffb;
pub const OFPP_CONTROLLER: u32 = 0xffff_fffd;
pub const OFPP_ANY: u32 = 0xffff_ffff;
pub const OFPG_ANY: u32 = 0xffff_ffff;

// Error types (OFPET_*)
pub const OFPET_HELLO_FAILED: u16 = 0;
pub const OFPET_METER_MOD_FAILED: u16 = 12;
pub const OFPHFC_INCOMPATIBLE: u16 = 0;

/// Message type codes from the OpenFlow header
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    PacketIn = 10,
    PacketOut = 13,
    FlowMod = 14,
    MeterMod = 29,
}

/// Datapath (switch) identifier, supplied by the switch in FEATURES_REPLY
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatapathId(pub u64);

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Hello(Hello),
    Error(ErrorMsg),
    EchoRequest(Bytes),
    EchoReply(Bytes),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    PacketIn(PacketIn),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    MeterMod(MeterMod),
    /// A message type this controller doesn't handle [type code]
    Unsupported(u8),
    /// A handled message type whose body couldn't be decoded [type code]
    Malformed(u8),
}

impl Message {
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::Error(_) => "ERROR",
            Message::EchoRequest(_) => "ECHO_REQUEST",
            Message::EchoReply(_) => "ECHO_REPLY",
            Message::FeaturesRequest => "FEATURES_REQUEST",
            Message::FeaturesReply(_) => "FEATURES_REPLY",
            Message::PacketIn(_) => "PACKET_IN",
            Message::PacketOut(_) => "PACKET_OUT",
            Message::FlowMod(_) => "FLOW_MOD",
            Message::MeterMod(_) => "METER_MOD",
            Message::Unsupported(_) => "UNSUPPORTED",
            Message::Malformed(_) => "MALFORMED",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hello {
    /// Supported versions advertised in a VERSIONBITMAP element (bit N = version N)
    pub version_bitmap: Option<u32>,
}

impl Hello {
    pub fn supports(&self, version: u8) -> bool {
        match self.version_bitmap {
            Some(bitmap) => version < 32 && bitmap & (1 << version) != 0,
            None => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Bytes,
}

impl fmt::Display for ErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OpenFlow error type={} code={}", self.err_type, self.code)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: DatapathId,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub auxiliary_id: u8,
    pub capabilities: u32,
}

/// Match fields used by the controller (OXM basic class)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Match {
    pub in_port: Option<u32>,
    pub eth_dst: Option<MacAddress>,
    pub eth_src: Option<MacAddress>,
    pub eth_type: Option<u16>,
}

impl Match {
    /// Wildcard match (matches every packet)
    pub fn all() -> Self {
        Match::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Match::default()
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut fields: Vec<String> = Vec::with_capacity(4);
        if let Some(port) = self.in_port {
            fields.push(format!("in_port={}", port));
        }
        if let Some(dst) = self.eth_dst {
            fields.push(format!("eth_dst={}", dst));
        }
        if let Some(src) = self.eth_src {
            fields.push(format!("eth_src={}", src));
        }
        if let Some(eth_type) = self.eth_type {
            fields.push(format!("eth_type={:#06x}", eth_type));
        }
        if fields.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", fields.iter().join(","))
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Output to a port [port, max_len]
    Output(u32, u16),
}

impl Action {
    pub fn output(port: u32) -> Self {
        Action::Output(port, 0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    ApplyActions(Vec<Action>),
    Meter(u32),
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowModCommand {
    Add = 0,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowMod {
    pub cookie: u64,
    pub table_id: u8,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub flags: u16,
    pub matches: Match,
    pub instructions: Vec<Instruction>,
}

impl FlowMod {
    /// Add a flow to table 0, no timeouts
    pub fn add(priority: u16, matches: Match, instructions: Vec<Instruction>) -> Self {
        Self {
            cookie: 0,
            table_id: 0,
            command: FlowModCommand::Add,
            idle_timeout: 0,
            hard_timeout: 0,
            priority,
            buffer_id: OFP_NO_BUFFER,
            flags: 0,
            matches,
            instructions,
        }
    }

    /// Meter bound to this flow, if any
    pub fn meter_id(&self) -> Option<u32> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::Meter(id) => Some(*id),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub reason: u8,
    pub table_id: u8,
    pub cookie: u64,
    pub matches: Match,
    pub data: Bytes,
}

impl PacketIn {
    pub fn in_port(&self) -> Option<u32> {
        self.matches.in_port
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer_id != OFP_NO_BUFFER
    }

    pub fn is_truncated(&self) -> bool {
        self.data.len() < usize::from(self.total_len)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: u32,
    pub actions: Vec<Action>,
    /// Raw packet, only sent when the packet isn't buffered on the switch
    pub data: Option<Bytes>,
}

#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeterModCommand {
    Add = 0,
}

pub const OFPMF_KBPS: u16 = 1 << 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeterBand {
    /// Drop packets exceeding the rate [rate, burst_size]
    Drop(u32, u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeterMod {
    pub command: MeterModCommand,
    pub flags: u16,
    pub meter_id: u32,
    pub bands: Vec<MeterBand>,
}

impl MeterMod {
    /// Add a meter measured in kilobits/sec with a single drop band
    pub fn add_kbps_drop(meter_id: u32, rate: u32, burst_size: u32) -> Self {
        Self {
            command: MeterModCommand::Add,
            flags: OFPMF_KBPS,
            meter_id,
            bands: vec![MeterBand::Drop(rate, burst_size)],
        }
    }
}
