use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, RwLock};

use super::SwitchSession;
use crate::config::ControllerConfig;
use crate::openflow::{
    DatapathId, ErrorMsg, Message, MeterMod, PacketIn, SwitchFeatures, OFPET_METER_MOD_FAILED,
};
use crate::packet::MacAddress;
use crate::pipeline::{process_packet_in, table_miss_flow};
use crate::policy::BandwidthPolicy;
use crate::transport::{Channel, SwitchApp};
use crate::utils::format_time_as_elapsed;

/// Source of the wall-clock time used for bandwidth policy evaluation
pub type Clock = fn() -> NaiveDateTime;

fn local_time() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Registry of connected switches and the controller's reaction to their events
pub struct SessionManager {
    // Active Sessions                     dpid: session
    pub(crate) sessions: RwLock<HashMap<DatapathId, Arc<Mutex<SwitchSession>>>>,
    config: Arc<ControllerConfig>,
    clock: Clock,
}

impl SessionManager {
    pub fn new(config: Arc<ControllerConfig>) -> Self {
        Self::with_clock(config, local_time)
    }

    pub fn with_clock(config: Arc<ControllerConfig>, clock: Clock) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Get the session for a switch, creating it if this is the first event seen
    pub async fn session(&self, dpid: DatapathId) -> Arc<Mutex<SwitchSession>> {
        if let Some(session) = self.sessions.read().await.get(&dpid) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(dpid).or_insert_with(|| {
            debug!("New session for switch {}", dpid);
            Arc::new(Mutex::new(SwitchSession::new(dpid)))
        });
        Arc::clone(session)
    }

    pub async fn next_meter_id(&self, dpid: DatapathId) -> u32 {
        let session = self.session(dpid).await;
        let mut session = session.lock().await;
        session.meters.next_meter_id()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn provisioned_meter(&self, dpid: DatapathId) -> Option<u32> {
        let session = Arc::clone(self.sessions.read().await.get(&dpid)?);
        let session = session.lock().await;
        session.provisioned_meter
    }

    /// Port a host was last seen on, for a connected switch
    pub async fn lookup_host(&self, dpid: DatapathId, mac: &MacAddress) -> Option<u32> {
        let session = Arc::clone(self.sessions.read().await.get(&dpid)?);
        let session = session.lock().await;
        session.hosts.lookup(mac)
    }
}

#[async_trait]
impl SwitchApp for SessionManager {
    /// Install the table-miss rule and this switch's rate-limiting meter
    ///
    /// Always starts a fresh session; whatever a previous connection from the
    /// same switch left behind is replaced.
    async fn switch_connected(&self, dpid: DatapathId, _features: &SwitchFeatures, channel: &Channel) {
        let session = Arc::new(Mutex::new(SwitchSession::for_connection(dpid, channel.id())));
        let replaced = self
            .sessions
            .write()
            .await
            .insert(dpid, Arc::clone(&session));
        if let Some(replaced) = replaced {
            info!("[{}] Reconnected, replacing {}", dpid, *replaced.lock().await);
        }
        let mut session = session.lock().await;

        let table_miss = table_miss_flow(self.config.table_miss_priority);
        match channel.send(Message::FlowMod(table_miss)) {
            Ok(()) => session.counts.increment_flows_installed(),
            Err(err) => {
                session.counts.increment_send_failures();
                warn!("[{}] Table-miss rule: {}", dpid, err);
            }
        }

        let policy = BandwidthPolicy::at(&(self.clock)());
        info!("[{}] Bandwidth limit {}", dpid, policy);

        let meter_id = session.meters.next_meter_id();
        let meter_mod = MeterMod::add_kbps_drop(meter_id, policy.max_rate_kbps, policy.burst_size);
        match channel.send(Message::MeterMod(meter_mod)) {
            Ok(()) => {
                session.provisioned_meter = Some(meter_id);
                info!("[{}] Meter {} installed at {}", dpid, meter_id, policy);
            }
            Err(err) => {
                session.counts.increment_send_failures();
                error!(
                    "[{}] Failed to install meter {}, forwarding without rate limit: {}",
                    dpid, meter_id, err
                );
            }
        }
        debug!("{}", *session);
    }

    async fn packet_in(&self, dpid: DatapathId, packet_in: &PacketIn, channel: &Channel) {
        let session = self.session(dpid).await;
        let mut session = session.lock().await;
        if !session.is_owned_by(channel.id()) {
            debug!("[{}] Ignoring packet-in from a replaced connection", dpid);
            return;
        }
        session.counts.increment_packet_ins();

        let forwarding = match process_packet_in(&mut session, packet_in, &self.config) {
            Some(forwarding) => forwarding,
            None => return,
        };
        if let Some(flow) = forwarding.flow {
            debug!(
                "[{}] Installing flow {} -> {}",
                dpid, flow.matches, forwarding.decision.out_port
            );
            match channel.send(Message::FlowMod(flow)) {
                Ok(()) => session.counts.increment_flows_installed(),
                Err(err) => {
                    session.counts.increment_send_failures();
                    warn!("[{}] {}", dpid, err);
                }
            }
        }
        match channel.send(Message::PacketOut(forwarding.packet_out)) {
            Ok(()) => session.counts.increment_packet_outs(),
            Err(err) => {
                session.counts.increment_send_failures();
                warn!("[{}] {}", dpid, err);
            }
        }
    }

    async fn error(&self, dpid: DatapathId, error: &ErrorMsg) {
        if error.err_type != OFPET_METER_MOD_FAILED {
            warn!("[{}] Switch reported {}", dpid, error);
            return;
        }
        let session = self.session(dpid).await;
        let mut session = session.lock().await;
        match session.provisioned_meter.take() {
            Some(meter_id) => warn!(
                "[{}] Meter {} rejected (code {}), forwarding without rate limit",
                dpid, meter_id, error.code
            ),
            None => warn!("[{}] Switch reported {}", dpid, error),
        }
    }

    async fn switch_disconnected(&self, dpid: DatapathId, channel: &Channel) {
        let mut sessions = self.sessions.write().await;
        let session = match sessions.get(&dpid) {
            Some(session) => Arc::clone(session),
            None => {
                debug!("Switch {} disconnected without a session", dpid);
                return;
            }
        };
        let session = session.lock().await;
        if !session.is_owned_by(channel.id()) {
            debug!("Switch {} stale connection closed, keeping current session", dpid);
            return;
        }
        sessions.remove(&dpid);
        info!(
            "Switch {} disconnected after {} [{}]",
            dpid,
            format_time_as_elapsed(session.connect_time),
            session.counts
        );
    }
}
