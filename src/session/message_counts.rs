use std::fmt;

/// Per-switch totals of handled events and issued messages
#[derive(Debug, Default)]
pub struct MessageCounts {
    packet_ins: u64,
    flows_installed: u64,
    packet_outs: u64,
    send_failures: u64,
}

impl MessageCounts {
    pub fn new() -> Self {
        MessageCounts::default()
    }

    pub fn packet_ins(&self) -> u64 {
        self.packet_ins
    }
    pub fn increment_packet_ins(&mut self) {
        self.packet_ins += 1;
    }

    pub fn flows_installed(&self) -> u64 {
        self.flows_installed
    }
    pub fn increment_flows_installed(&mut self) {
        self.flows_installed += 1;
    }

    pub fn packet_outs(&self) -> u64 {
        self.packet_outs
    }
    pub fn increment_packet_outs(&mut self) {
        self.packet_outs += 1;
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }
    pub fn increment_send_failures(&mut self) {
        self.send_failures += 1;
    }
}

impl fmt::Display for MessageCounts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "packet_ins={} flows={} packet_outs={} failed={}",
            self.packet_ins, self.flows_installed, self.packet_outs, self.send_failures
        )
    }
}
