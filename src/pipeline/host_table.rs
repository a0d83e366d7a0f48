use std::collections::HashMap;
use std::fmt;

use crate::packet::MacAddress;

/// Where hosts (by MAC address) were last seen on a switch
///
/// Implementations decide retention; the pipeline only learns and looks up.
pub trait HostTable: fmt::Debug + Send {
    /// Record that `mac` was seen on `port`, returns the previously known port
    fn learn(&mut self, mac: MacAddress, port: u32) -> Option<u32>;

    fn lookup(&self, mac: &MacAddress) -> Option<u32>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host table without aging: entries live as long as the switch session
#[derive(Debug, Default)]
pub struct MacTable {
    entries: HashMap<MacAddress, u32>,
}

impl MacTable {
    pub fn new() -> Self {
        MacTable::default()
    }
}

impl HostTable for MacTable {
    fn learn(&mut self, mac: MacAddress, port: u32) -> Option<u32> {
        self.entries.insert(mac, port)
    }

    fn lookup(&self, mac: &MacAddress) -> Option<u32> {
        self.entries.get(mac).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
