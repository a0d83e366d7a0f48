use std::fmt;

use chrono::{DateTime, Utc};

use super::MessageCounts;
use crate::meter::MeterAllocator;
use crate::openflow::DatapathId;
use crate::pipeline::{HostTable, MacTable};
use crate::utils::format_time_as_elapsed;

/// State kept for a connected switch
///
/// Only the connection task for `dpid` touches a session, so the fields
/// need no synchronization of their own.
#[derive(Debug)]
pub struct SwitchSession {
    pub(crate) dpid: DatapathId,
    /// Channel id of the connection that bootstrapped this session,
    /// None for sessions created lazily by an event
    pub(crate) connection: Option<u64>,
    pub(crate) hosts: Box<dyn HostTable>,
    pub(crate) meters: MeterAllocator,
    /// Meter installed at bootstrap, None if it couldn't be provisioned
    pub(crate) provisioned_meter: Option<u32>,
    pub(crate) connect_time: DateTime<Utc>,
    pub(crate) counts: MessageCounts,
}

impl SwitchSession {
    pub fn new(dpid: DatapathId) -> Self {
        Self {
            dpid,
            connection: None,
            hosts: Box::new(MacTable::new()),
            meters: MeterAllocator::new(),
            provisioned_meter: None,
            connect_time: Utc::now(),
            counts: MessageCounts::new(),
        }
    }

    /// Fresh session owned by the connection behind `channel_id`
    pub fn for_connection(dpid: DatapathId, channel_id: u64) -> Self {
        Self {
            connection: Some(channel_id),
            ..Self::new(dpid)
        }
    }

    /// Whether events from the connection `channel_id` belong to this session
    pub fn is_owned_by(&self, channel_id: u64) -> bool {
        self.connection.map_or(true, |id| id == channel_id)
    }

    pub fn hosts(&self) -> &dyn HostTable {
        self.hosts.as_ref()
    }

    pub fn provisioned_meter(&self) -> Option<u32> {
        self.provisioned_meter
    }

    pub fn counts(&self) -> &MessageCounts {
        &self.counts
    }
}

impl fmt::Display for SwitchSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let meter = match self.provisioned_meter {
            Some(id) => id.to_string(),
            None => "none".to_string(),
        };
        write!(
            f,
            "<SwitchSession {} uptime={} hosts={} meter={} {}>",
            self.dpid,
            format_time_as_elapsed(self.connect_time),
            self.hosts.len(),
            meter,
            self.counts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = SwitchSession::new(DatapathId(1));
        assert!(session.hosts().is_empty());
        assert_eq!(session.meters.current(), 0);
        assert_eq!(session.provisioned_meter(), None);
        assert_eq!(
            session.to_string(),
            "<SwitchSession 0000000000000001 uptime=00:00:00 hosts=0 meter=none \
             packet_ins=0 flows=0 packet_outs=0 failed=0>"
        );
    }

    #[test]
    fn test_connection_ownership() {
        let lazy = SwitchSession::new(DatapathId(1));
        assert!(lazy.is_owned_by(7));

        let owned = SwitchSession::for_connection(DatapathId(1), 7);
        assert!(owned.is_owned_by(7));
        assert!(!owned.is_owned_by(8));
    }
}
