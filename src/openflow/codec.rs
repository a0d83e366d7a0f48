use std::io::{self, Cursor, Read};

use byteorder::{NetworkEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use log::debug;
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};

use super::*;

pub type OfpProtocol<T = TcpStream> = Framed<T, OfpCodec>;

const OFPMT_OXM: u16 = 1;
const OFPXMC_OPENFLOW_BASIC: u16 = 0x8000;
const OFPXMT_OFB_IN_PORT: u8 = 0;
const OFPXMT_OFB_ETH_DST: u8 = 3;
const OFPXMT_OFB_ETH_SRC: u8 = 4;
const OFPXMT_OFB_ETH_TYPE: u8 = 5;

const OFPIT_APPLY_ACTIONS: u16 = 4;
const OFPIT_METER: u16 = 6;
const OFPAT_OUTPUT: u16 = 0;
const OFPMBT_DROP: u16 = 1;
const OFPHET_VERSIONBITMAP: u16 = 1;

const ACTION_OUTPUT_LEN: u16 = 16;
const METER_BAND_DROP_LEN: u16 = 16;

/// A decoded OpenFlow message along with its header fields
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub version: u8,
    pub xid: u32,
    pub message: Message,
}

impl Envelope {
    pub fn new(xid: u32, message: Message) -> Self {
        Self {
            version: OFP_VERSION,
            xid,
            message,
        }
    }
}

#[derive(Debug, Default)]
pub struct OfpCodec;

impl OfpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for OfpCodec {
    type Item = Envelope;
    type Error = io::Error;

    // Frame by the length in the OpenFlow header, then decode the body
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        if buf.len() < OFP_HEADER_LEN {
            return Ok(None);
        }
        let length = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        if length < OFP_HEADER_LEN {
            return Err(invalid_data(format!(
                "Message length {} is shorter than the OpenFlow header",
                length
            )));
        }
        if buf.len() < length {
            buf.reserve(length - buf.len());
            return Ok(None);
        }
        let frame = buf.split_to(length).freeze();
        decode_message(frame).map(Some)
    }
}

impl Encoder<Envelope> for OfpCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Envelope, buf: &mut BytesMut) -> Result<(), io::Error> {
        let msg_type = type_code(&item.message)?;
        let start = buf.len();
        buf.put_u8(item.version);
        buf.put_u8(msg_type);
        buf.put_u16(0); // length, filled in below
        buf.put_u32(item.xid);
        encode_body(&item.message, buf)?;
        let length = buf.len() - start;
        if length > usize::from(u16::MAX) {
            buf.truncate(start);
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} exceeds max message length", item.message.message_type()),
            ));
        }
        buf[start + 2..start + 4].copy_from_slice(&(length as u16).to_be_bytes());
        Ok(())
    }
}

fn invalid_data(reason: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason)
}

fn type_code(message: &Message) -> Result<u8, io::Error> {
    let code = match message {
        Message::Hello(_) => MessageType::Hello,
        Message::Error(_) => MessageType::Error,
        Message::EchoRequest(_) => MessageType::EchoRequest,
        Message::EchoReply(_) => MessageType::EchoReply,
        Message::FeaturesRequest => MessageType::FeaturesRequest,
        Message::FeaturesReply(_) => MessageType::FeaturesReply,
        Message::PacketIn(_) => MessageType::PacketIn,
        Message::PacketOut(_) => MessageType::PacketOut,
        Message::FlowMod(_) => MessageType::FlowMod,
        Message::MeterMod(_) => MessageType::MeterMod,
        Message::Unsupported(code) | Message::Malformed(code) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Can't encode {} message type {}", message.message_type(), code),
            ))
        }
    };
    Ok(code as u8)
}

/// Round a length up to the 8-byte alignment OpenFlow uses for matches & elements
fn padded(len: usize) -> usize {
    (len + 7) / 8 * 8
}

fn skip(cursor: &mut Cursor<&[u8]>, len: usize) -> io::Result<()> {
    let pos = cursor.position() as usize;
    if pos + len > cursor.get_ref().len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Field extends past end of message",
        ));
    }
    cursor.set_position((pos + len) as u64);
    Ok(())
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor
        .get_ref()
        .len()
        .saturating_sub(cursor.position() as usize)
}

fn read_mac(cursor: &mut Cursor<&[u8]>) -> io::Result<MacAddress> {
    let mut octets = [0u8; 6];
    cursor.read_exact(&mut octets)?;
    Ok(MacAddress::new(octets))
}

fn decode_message(frame: Bytes) -> Result<Envelope, io::Error> {
    let mut header = Cursor::new(&frame[..OFP_HEADER_LEN]);
    let version = header.read_u8()?;
    let msg_type = header.read_u8()?;
    let _length = header.read_u16::<NetworkEndian>()?;
    let xid = header.read_u32::<NetworkEndian>()?;
    let body = frame.slice(OFP_HEADER_LEN..);

    // The frame is consumed either way, a bad body only loses this message
    let message = match decode_body(msg_type, body) {
        Ok(message) => message,
        Err(err) => {
            debug!("Unable to decode message type {} [xid={}]: {}", msg_type, xid, err);
            Message::Malformed(msg_type)
        }
    };
    Ok(Envelope {
        version,
        xid,
        message,
    })
}

fn decode_body(msg_type: u8, body: Bytes) -> io::Result<Message> {
    let message = match msg_type {
        t if t == MessageType::Hello as u8 => Message::Hello(decode_hello(&body)?),
        t if t == MessageType::Error as u8 => {
            let mut cursor = Cursor::new(&body[..]);
            let err_type = cursor.read_u16::<NetworkEndian>()?;
            let code = cursor.read_u16::<NetworkEndian>()?;
            Message::Error(ErrorMsg {
                err_type,
                code,
                data: body.slice(4..),
            })
        }
        t if t == MessageType::EchoRequest as u8 => Message::EchoRequest(body),
        t if t == MessageType::EchoReply as u8 => Message::EchoReply(body),
        t if t == MessageType::FeaturesRequest as u8 => Message::FeaturesRequest,
        t if t == MessageType::FeaturesReply as u8 => {
            Message::FeaturesReply(decode_features(&body)?)
        }
        t if t == MessageType::PacketIn as u8 => Message::PacketIn(decode_packet_in(&body)?),
        // Controller-to-switch messages, only decoded by the simulated switch in tests
        #[cfg(test)]
        t if t == MessageType::PacketOut as u8 => Message::PacketOut(decode_packet_out(&body)?),
        #[cfg(test)]
        t if t == MessageType::FlowMod as u8 => Message::FlowMod(decode_flow_mod(&body)?),
        #[cfg(test)]
        t if t == MessageType::MeterMod as u8 => Message::MeterMod(decode_meter_mod(&body)?),
        other => Message::Unsupported(other),
    };
    Ok(message)
}

fn decode_hello(body: &[u8]) -> io::Result<Hello> {
    let mut hello = Hello::default();
    let mut cursor = Cursor::new(body);
    while remaining(&cursor) >= 4 {
        let start = cursor.position() as usize;
        let element_type = cursor.read_u16::<NetworkEndian>()?;
        let element_len = usize::from(cursor.read_u16::<NetworkEndian>()?);
        if element_len < 4 {
            return Err(invalid_data(format!(
                "Invalid HELLO element length {}",
                element_len
            )));
        }
        if element_type == OFPHET_VERSIONBITMAP && element_len >= 8 {
            hello.version_bitmap = Some(cursor.read_u32::<NetworkEndian>()?);
        }
        // Trailing padding on the last element may be missing
        let end = (start + padded(element_len)).min(body.len());
        cursor.set_position(end as u64);
    }
    Ok(hello)
}

fn decode_features(body: &[u8]) -> io::Result<SwitchFeatures> {
    let mut cursor = Cursor::new(body);
    let datapath_id = DatapathId(cursor.read_u64::<NetworkEndian>()?);
    let n_buffers = cursor.read_u32::<NetworkEndian>()?;
    let n_tables = cursor.read_u8()?;
    let auxiliary_id = cursor.read_u8()?;
    skip(&mut cursor, 2)?;
    let capabilities = cursor.read_u32::<NetworkEndian>()?;
    Ok(SwitchFeatures {
        datapath_id,
        n_buffers,
        n_tables,
        auxiliary_id,
        capabilities,
    })
}

fn decode_match(cursor: &mut Cursor<&[u8]>) -> io::Result<Match> {
    let start = cursor.position() as usize;
    let match_type = cursor.read_u16::<NetworkEndian>()?;
    let length = usize::from(cursor.read_u16::<NetworkEndian>()?);
    if match_type != OFPMT_OXM || length < 4 {
        return Err(invalid_data(format!(
            "Unsupported match [type={}, length={}]",
            match_type, length
        )));
    }
    let mut matches = Match::default();
    let end = start + length;
    while (cursor.position() as usize) + 4 <= end {
        let header = cursor.read_u32::<NetworkEndian>()?;
        let class = (header >> 16) as u16;
        let field = ((header >> 9) & 0x7f) as u8;
        let has_mask = (header >> 8) & 1 == 1;
        let len = (header & 0xff) as usize;
        if class != OFPXMC_OPENFLOW_BASIC || has_mask {
            skip(cursor, len)?;
            continue;
        }
        match (field, len) {
            (OFPXMT_OFB_IN_PORT, 4) => matches.in_port = Some(cursor.read_u32::<NetworkEndian>()?),
            (OFPXMT_OFB_ETH_DST, 6) => matches.eth_dst = Some(read_mac(cursor)?),
            (OFPXMT_OFB_ETH_SRC, 6) => matches.eth_src = Some(read_mac(cursor)?),
            (OFPXMT_OFB_ETH_TYPE, 2) => {
                matches.eth_type = Some(cursor.read_u16::<NetworkEndian>()?)
            }
            _ => skip(cursor, len)?,
        }
    }
    cursor.set_position(start as u64);
    skip(cursor, padded(length))?;
    Ok(matches)
}

#[cfg(test)]
fn decode_actions(cursor: &mut Cursor<&[u8]>, len: usize) -> io::Result<Vec<Action>> {
    let end = cursor.position() as usize + len;
    let mut actions = Vec::with_capacity(1);
    while (cursor.position() as usize) + 4 <= end {
        let action_type = cursor.read_u16::<NetworkEndian>()?;
        let action_len = usize::from(cursor.read_u16::<NetworkEndian>()?);
        let min_len = if action_type == OFPAT_OUTPUT {
            usize::from(ACTION_OUTPUT_LEN)
        } else {
            8
        };
        if action_len < min_len {
            return Err(invalid_data(format!(
                "Invalid action length {} [type={}]",
                action_len, action_type
            )));
        }
        if action_type == OFPAT_OUTPUT {
            let port = cursor.read_u32::<NetworkEndian>()?;
            let max_len = cursor.read_u16::<NetworkEndian>()?;
            skip(cursor, action_len - 10)?;
            actions.push(Action::Output(port, max_len));
        } else {
            skip(cursor, action_len - 4)?;
        }
    }
    Ok(actions)
}

#[cfg(test)]
fn decode_instructions(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<Instruction>> {
    let mut instructions = Vec::with_capacity(2);
    while remaining(cursor) >= 4 {
        let instruction_type = cursor.read_u16::<NetworkEndian>()?;
        let len = usize::from(cursor.read_u16::<NetworkEndian>()?);
        if len < 8 {
            return Err(invalid_data(format!("Invalid instruction length {}", len)));
        }
        match instruction_type {
            OFPIT_APPLY_ACTIONS => {
                skip(cursor, 4)?;
                instructions.push(Instruction::ApplyActions(decode_actions(cursor, len - 8)?));
            }
            OFPIT_METER => {
                instructions.push(Instruction::Meter(cursor.read_u32::<NetworkEndian>()?));
            }
            _ => skip(cursor, len - 4)?,
        }
    }
    Ok(instructions)
}

fn decode_packet_in(body: &Bytes) -> io::Result<PacketIn> {
    let mut cursor = Cursor::new(&body[..]);
    let buffer_id = cursor.read_u32::<NetworkEndian>()?;
    let total_len = cursor.read_u16::<NetworkEndian>()?;
    let reason = cursor.read_u8()?;
    let table_id = cursor.read_u8()?;
    let cookie = cursor.read_u64::<NetworkEndian>()?;
    let matches = decode_match(&mut cursor)?;
    skip(&mut cursor, 2)?;
    let data = body.slice(cursor.position() as usize..);
    Ok(PacketIn {
        buffer_id,
        total_len,
        reason,
        table_id,
        cookie,
        matches,
        data,
    })
}

#[cfg(test)]
fn decode_packet_out(body: &Bytes) -> io::Result<PacketOut> {
    let mut cursor = Cursor::new(&body[..]);
    let buffer_id = cursor.read_u32::<NetworkEndian>()?;
    let in_port = cursor.read_u32::<NetworkEndian>()?;
    let actions_len = usize::from(cursor.read_u16::<NetworkEndian>()?);
    skip(&mut cursor, 6)?;
    let actions = decode_actions(&mut cursor, actions_len)?;
    let position = cursor.position() as usize;
    let data = if position < body.len() {
        Some(body.slice(position..))
    } else {
        None
    };
    Ok(PacketOut {
        buffer_id,
        in_port,
        actions,
        data,
    })
}

#[cfg(test)]
fn decode_flow_mod(body: &Bytes) -> io::Result<FlowMod> {
    let mut cursor = Cursor::new(&body[..]);
    let cookie = cursor.read_u64::<NetworkEndian>()?;
    let _cookie_mask = cursor.read_u64::<NetworkEndian>()?;
    let table_id = cursor.read_u8()?;
    let command = match cursor.read_u8()? {
        0 => FlowModCommand::Add,
        other => return Err(invalid_data(format!("Unknown FLOW_MOD command {}", other))),
    };
    let idle_timeout = cursor.read_u16::<NetworkEndian>()?;
    let hard_timeout = cursor.read_u16::<NetworkEndian>()?;
    let priority = cursor.read_u16::<NetworkEndian>()?;
    let buffer_id = cursor.read_u32::<NetworkEndian>()?;
    let _out_port = cursor.read_u32::<NetworkEndian>()?;
    let _out_group = cursor.read_u32::<NetworkEndian>()?;
    let flags = cursor.read_u16::<NetworkEndian>()?;
    skip(&mut cursor, 2)?;
    let matches = decode_match(&mut cursor)?;
    let instructions = decode_instructions(&mut cursor)?;
    Ok(FlowMod {
        cookie,
        table_id,
        command,
        idle_timeout,
        hard_timeout,
        priority,
        buffer_id,
        flags,
        matches,
        instructions,
    })
}

#[cfg(test)]
fn decode_meter_mod(body: &Bytes) -> io::Result<MeterMod> {
    let mut cursor = Cursor::new(&body[..]);
    let command = match cursor.read_u16::<NetworkEndian>()? {
        0 => MeterModCommand::Add,
        other => return Err(invalid_data(format!("Unknown METER_MOD command {}", other))),
    };
    let flags = cursor.read_u16::<NetworkEndian>()?;
    let meter_id = cursor.read_u32::<NetworkEndian>()?;
    let mut bands = Vec::with_capacity(1);
    while remaining(&cursor) >= 4 {
        let band_type = cursor.read_u16::<NetworkEndian>()?;
        let band_len = usize::from(cursor.read_u16::<NetworkEndian>()?);
        if band_len < 12 {
            return Err(invalid_data(format!("Invalid meter band length {}", band_len)));
        }
        let rate = cursor.read_u32::<NetworkEndian>()?;
        let burst_size = cursor.read_u32::<NetworkEndian>()?;
        skip(&mut cursor, band_len - 12)?;
        if band_type == OFPMBT_DROP {
            bands.push(MeterBand::Drop(rate, burst_size));
        }
    }
    Ok(MeterMod {
        command,
        flags,
        meter_id,
        bands,
    })
}

fn encode_body(message: &Message, buf: &mut BytesMut) -> io::Result<()> {
    match message {
        Message::Hello(hello) => {
            if let Some(bitmap) = hello.version_bitmap {
                buf.put_u16(OFPHET_VERSIONBITMAP);
                buf.put_u16(8);
                buf.put_u32(bitmap);
            }
        }
        Message::Error(error) => {
            buf.put_u16(error.err_type);
            buf.put_u16(error.code);
            buf.put_slice(&error.data);
        }
        Message::EchoRequest(data) | Message::EchoReply(data) => buf.put_slice(data),
        Message::FeaturesRequest => (),
        Message::FeaturesReply(features) => {
            buf.put_u64(features.datapath_id.0);
            buf.put_u32(features.n_buffers);
            buf.put_u8(features.n_tables);
            buf.put_u8(features.auxiliary_id);
            buf.put_bytes(0, 2);
            buf.put_u32(features.capabilities);
            buf.put_u32(0); // reserved
        }
        Message::PacketIn(packet_in) => {
            buf.put_u32(packet_in.buffer_id);
            buf.put_u16(packet_in.total_len);
            buf.put_u8(packet_in.reason);
            buf.put_u8(packet_in.table_id);
            buf.put_u64(packet_in.cookie);
            encode_match(&packet_in.matches, buf);
            buf.put_bytes(0, 2);
            buf.put_slice(&packet_in.data);
        }
        Message::PacketOut(packet_out) => {
            buf.put_u32(packet_out.buffer_id);
            buf.put_u32(packet_out.in_port);
            buf.put_u16(ACTION_OUTPUT_LEN * packet_out.actions.len() as u16);
            buf.put_bytes(0, 6);
            encode_actions(&packet_out.actions, buf);
            if let Some(data) = &packet_out.data {
                buf.put_slice(data);
            }
        }
        Message::FlowMod(flow_mod) => {
            buf.put_u64(flow_mod.cookie);
            buf.put_u64(0); // cookie_mask
            buf.put_u8(flow_mod.table_id);
            buf.put_u8(flow_mod.command as u8);
            buf.put_u16(flow_mod.idle_timeout);
            buf.put_u16(flow_mod.hard_timeout);
            buf.put_u16(flow_mod.priority);
            buf.put_u32(flow_mod.buffer_id);
            buf.put_u32(OFPP_ANY);
            buf.put_u32(OFPG_ANY);
            buf.put_u16(flow_mod.flags);
            buf.put_bytes(0, 2);
            encode_match(&flow_mod.matches, buf);
            for instruction in &flow_mod.instructions {
                encode_instruction(instruction, buf);
            }
        }
        Message::MeterMod(meter_mod) => {
            buf.put_u16(meter_mod.command as u16);
            buf.put_u16(meter_mod.flags);
            buf.put_u32(meter_mod.meter_id);
            for band in &meter_mod.bands {
                match band {
                    MeterBand::Drop(rate, burst_size) => {
                        buf.put_u16(OFPMBT_DROP);
                        buf.put_u16(METER_BAND_DROP_LEN);
                        buf.put_u32(*rate);
                        buf.put_u32(*burst_size);
                        buf.put_bytes(0, 4);
                    }
                }
            }
        }
        Message::Unsupported(_) | Message::Malformed(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Can't encode {}", message.message_type()),
            ))
        }
    }
    Ok(())
}

fn put_oxm_header(buf: &mut BytesMut, field: u8, len: u8) {
    buf.put_u16(OFPXMC_OPENFLOW_BASIC);
    buf.put_u8(field << 1);
    buf.put_u8(len);
}

fn encode_match(matches: &Match, buf: &mut BytesMut) {
    let start = buf.len();
    buf.put_u16(OFPMT_OXM);
    buf.put_u16(0); // length, filled in below
    if let Some(port) = matches.in_port {
        put_oxm_header(buf, OFPXMT_OFB_IN_PORT, 4);
        buf.put_u32(port);
    }
    if let Some(dst) = matches.eth_dst {
        put_oxm_header(buf, OFPXMT_OFB_ETH_DST, 6);
        buf.put_slice(&dst.octets());
    }
    if let Some(src) = matches.eth_src {
        put_oxm_header(buf, OFPXMT_OFB_ETH_SRC, 6);
        buf.put_slice(&src.octets());
    }
    if let Some(eth_type) = matches.eth_type {
        put_oxm_header(buf, OFPXMT_OFB_ETH_TYPE, 2);
        buf.put_u16(eth_type);
    }
    let length = buf.len() - start;
    buf[start + 2..start + 4].copy_from_slice(&(length as u16).to_be_bytes());
    buf.put_bytes(0, padded(length) - length);
}

fn encode_actions(actions: &[Action], buf: &mut BytesMut) {
    for action in actions {
        match action {
            Action::Output(port, max_len) => {
                buf.put_u16(OFPAT_OUTPUT);
                buf.put_u16(ACTION_OUTPUT_LEN);
                buf.put_u32(*port);
                buf.put_u16(*max_len);
                buf.put_bytes(0, 6);
            }
        }
    }
}

fn encode_instruction(instruction: &Instruction, buf: &mut BytesMut) {
    match instruction {
        Instruction::ApplyActions(actions) => {
            buf.put_u16(OFPIT_APPLY_ACTIONS);
            buf.put_u16(8 + ACTION_OUTPUT_LEN * actions.len() as u16);
            buf.put_bytes(0, 4);
            encode_actions(actions, buf);
        }
        Instruction::Meter(meter_id) => {
            buf.put_u16(OFPIT_METER);
            buf.put_u16(8);
            buf.put_u32(*meter_id);
        }
    }
}
