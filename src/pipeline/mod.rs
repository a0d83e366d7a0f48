//! Packet-in handling for the learning switch
//!
//! Each packet-in teaches the switch's host table where the source lives, then
//! either floods the packet (destination unknown) or forwards it to the learned
//! port and installs a flow (bound to the switch's meter) so later packets
//! between the two hosts stay in the datapath.

mod host_table;

pub use host_table::{HostTable, MacTable};

use std::fmt;

use log::{debug, trace};

use crate::config::ControllerConfig;
use crate::openflow::{
    Action, FlowMod, Instruction, Match, PacketIn, PacketOut, OFPCML_NO_BUFFER, OFPP_CONTROLLER,
    OFPP_FLOOD,
};
use crate::packet::EthernetHeader;
use crate::session::SwitchSession;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutPort {
    Port(u32),
    Flood,
}

impl OutPort {
    pub fn port_no(&self) -> u32 {
        match self {
            OutPort::Port(port) => *port,
            OutPort::Flood => OFPP_FLOOD,
        }
    }
}

impl fmt::Display for OutPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutPort::Port(port) => write!(f, "port {}", port),
            OutPort::Flood => write!(f, "FLOOD"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ForwardingDecision {
    pub out_port: OutPort,
    pub install_rule: bool,
}

/// Messages to send the switch in response to a packet-in
#[derive(Clone, Debug, PartialEq)]
pub struct Forwarding {
    pub decision: ForwardingDecision,
    /// Flow for subsequent packets, only when the destination is known
    pub flow: Option<FlowMod>,
    /// Delivers the packet that triggered the packet-in
    pub packet_out: PacketOut,
}

/// Catch-all rule sending unmatched packets (unbuffered) to the controller
pub fn table_miss_flow(priority: u16) -> FlowMod {
    FlowMod::add(
        priority,
        Match::all(),
        vec![Instruction::ApplyActions(vec![Action::Output(
            OFPP_CONTROLLER,
            OFPCML_NO_BUFFER,
        )])],
    )
}

/// Learn from a packet-in and decide how to forward it
///
/// Returns None for packets that are ignored (LLDP) or can't be parsed, in which
/// case the session is left untouched.
pub fn process_packet_in(
    session: &mut SwitchSession,
    packet_in: &PacketIn,
    config: &ControllerConfig,
) -> Option<Forwarding> {
    if packet_in.is_truncated() {
        debug!(
            "[{}] packet truncated: only {} of {} bytes",
            session.dpid,
            packet_in.data.len(),
            packet_in.total_len
        );
    }
    let eth = match EthernetHeader::parse(&packet_in.data) {
        Some(eth) => eth,
        None => {
            debug!(
                "[{}] Dropping packet-in without an Ethernet header ({} bytes)",
                session.dpid,
                packet_in.data.len()
            );
            return None;
        }
    };
    if eth.is_lldp() {
        trace!("[{}] Ignoring LLDP from {}", session.dpid, eth.src);
        return None;
    }
    let in_port = match packet_in.in_port() {
        Some(port) => port,
        None => {
            debug!("[{}] Dropping packet-in without in_port", session.dpid);
            return None;
        }
    };
    debug!(
        "[{}] packet in {} {} {}",
        session.dpid, eth.src, eth.dst, in_port
    );

    session.hosts.learn(eth.src, in_port);

    let decision = match session.hosts.lookup(&eth.dst) {
        Some(port) => ForwardingDecision {
            out_port: OutPort::Port(port),
            install_rule: true,
        },
        None => ForwardingDecision {
            out_port: OutPort::Flood,
            install_rule: false,
        },
    };
    let actions = vec![Action::output(decision.out_port.port_no())];

    let flow = if decision.install_rule {
        let matches = Match {
            in_port: Some(in_port),
            eth_dst: Some(eth.dst),
            eth_src: Some(eth.src),
            eth_type: None,
        };
        let mut instructions = Vec::with_capacity(2);
        if let Some(meter_id) = session.provisioned_meter {
            instructions.push(Instruction::Meter(meter_id));
        }
        instructions.push(Instruction::ApplyActions(actions.clone()));
        let mut flow = FlowMod::add(config.learned_flow_priority, matches, instructions);
        flow.idle_timeout = config.flow_idle_timeout;
        flow.hard_timeout = config.flow_hard_timeout;
        Some(flow)
    } else {
        None
    };

    let data = if packet_in.is_buffered() {
        None
    } else {
        Some(packet_in.data.clone())
    };
    let packet_out = PacketOut {
        buffer_id: packet_in.buffer_id,
        in_port,
        actions,
        data,
    };

    Some(Forwarding {
        decision,
        flow,
        packet_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::openflow::{DatapathId, OFP_NO_BUFFER};
    use crate::packet::{build_frame, MacAddress, ETH_TYPE_LLDP};

    const HOST_A: MacAddress = MacAddress::new([0, 0, 0, 0, 0, 0xa]);
    const HOST_B: MacAddress = MacAddress::new([0, 0, 0, 0, 0, 0xb]);

    fn packet_in(src: MacAddress, dst: MacAddress, in_port: u32) -> PacketIn {
        let data = Bytes::from(build_frame(dst, src, 0x0800));
        PacketIn {
            buffer_id: OFP_NO_BUFFER,
            total_len: data.len() as u16,
            reason: 0,
            table_id: 0,
            cookie: 0,
            matches: Match {
                in_port: Some(in_port),
                ..Match::default()
            },
            data,
        }
    }

    fn session_with_meter(meter: Option<u32>) -> SwitchSession {
        let mut session = SwitchSession::new(DatapathId(1));
        session.provisioned_meter = meter;
        session
    }

    #[test]
    fn test_flood_unknown_destination() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(Some(1));
        let forwarding = process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 1), &config)
            .unwrap();
        assert_eq!(forwarding.decision.out_port, OutPort::Flood);
        assert!(!forwarding.decision.install_rule);
        assert!(forwarding.flow.is_none());
        assert_eq!(forwarding.packet_out.actions, vec![Action::output(OFPP_FLOOD)]);
        assert_eq!(forwarding.packet_out.in_port, 1);
        assert_eq!(session.hosts.lookup(&HOST_A), Some(1));
    }

    #[test]
    fn test_learned_destination_installs_metered_flow() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(Some(1));
        process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 1), &config).unwrap();
        let forwarding = process_packet_in(&mut session, &packet_in(HOST_B, HOST_A, 2), &config)
            .unwrap();
        assert_eq!(
            forwarding.decision,
            ForwardingDecision {
                out_port: OutPort::Port(1),
                install_rule: true
            }
        );
        let flow = forwarding.flow.unwrap();
        assert_eq!(flow.priority, 1);
        assert_eq!(
            flow.matches,
            Match {
                in_port: Some(2),
                eth_dst: Some(HOST_A),
                eth_src: Some(HOST_B),
                eth_type: None,
            }
        );
        assert_eq!(flow.meter_id(), Some(1));
        assert!(flow
            .instructions
            .contains(&Instruction::ApplyActions(vec![Action::output(1)])));
        assert_eq!(forwarding.packet_out.actions, vec![Action::output(1)]);
    }

    #[test]
    fn test_flow_without_meter() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(None);
        process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 1), &config).unwrap();
        let forwarding = process_packet_in(&mut session, &packet_in(HOST_B, HOST_A, 2), &config)
            .unwrap();
        let flow = forwarding.flow.unwrap();
        assert_eq!(flow.meter_id(), None);
        assert_eq!(
            flow.instructions,
            vec![Instruction::ApplyActions(vec![Action::output(1)])]
        );
    }

    #[test]
    fn test_relearn_moves_host() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(Some(1));
        process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 1), &config).unwrap();
        process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 1), &config).unwrap();
        assert_eq!(session.hosts.lookup(&HOST_A), Some(1));
        process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 3), &config).unwrap();
        assert_eq!(session.hosts.lookup(&HOST_A), Some(3));
        assert_eq!(session.hosts.len(), 1);
    }

    #[test]
    fn test_ignores_lldp() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(Some(1));
        let mut lldp = packet_in(HOST_A, HOST_B, 1);
        lldp.data = Bytes::from(build_frame(HOST_B, HOST_A, ETH_TYPE_LLDP));
        assert!(process_packet_in(&mut session, &lldp, &config).is_none());
        assert!(session.hosts.is_empty());
    }

    #[test]
    fn test_drops_malformed() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(Some(1));
        let mut short = packet_in(HOST_A, HOST_B, 1);
        short.data = Bytes::from_static(&[0, 1, 2, 3]);
        assert!(process_packet_in(&mut session, &short, &config).is_none());

        let mut no_port = packet_in(HOST_A, HOST_B, 1);
        no_port.matches = Match::all();
        assert!(process_packet_in(&mut session, &no_port, &config).is_none());
        assert!(session.hosts.is_empty());
    }

    #[test]
    fn test_buffered_packet_out() {
        let config = ControllerConfig::default();
        let mut session = session_with_meter(Some(1));
        let mut buffered = packet_in(HOST_A, HOST_B, 1);
        buffered.buffer_id = 42;
        let forwarding = process_packet_in(&mut session, &buffered, &config).unwrap();
        assert_eq!(forwarding.packet_out.buffer_id, 42);
        assert!(forwarding.packet_out.data.is_none());

        let unbuffered = packet_in(HOST_A, HOST_B, 1);
        let forwarding = process_packet_in(&mut session, &unbuffered, &config).unwrap();
        assert_eq!(forwarding.packet_out.buffer_id, OFP_NO_BUFFER);
        assert_eq!(forwarding.packet_out.data, Some(unbuffered.data.clone()));
    }

    #[test]
    fn test_flow_timeouts_from_config() {
        let config = ControllerConfig {
            learned_flow_priority: 10,
            flow_idle_timeout: 30,
            flow_hard_timeout: 300,
            ..ControllerConfig::default()
        };
        let mut session = session_with_meter(Some(1));
        process_packet_in(&mut session, &packet_in(HOST_A, HOST_B, 1), &config).unwrap();
        let flow = process_packet_in(&mut session, &packet_in(HOST_B, HOST_A, 2), &config)
            .unwrap()
            .flow
            .unwrap();
        assert_eq!(flow.priority, 10);
        assert_eq!(flow.idle_timeout, 30);
        assert_eq!(flow.hard_timeout, 300);
    }

    #[test]
    fn test_table_miss_flow() {
        let flow = table_miss_flow(0);
        assert_eq!(flow.priority, 0);
        assert!(flow.matches.is_empty());
        assert_eq!(
            flow.instructions,
            vec![Instruction::ApplyActions(vec![Action::Output(
                OFPP_CONTROLLER,
                OFPCML_NO_BUFFER
            )])]
        );
    }
}
