use std::fs::File;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;

struct Defaults {}

impl Defaults {
    fn listen_address() -> IpAddr {
        IpAddr::from(Ipv4Addr::UNSPECIFIED)
    }

    fn listen_port() -> u16 {
        6633
    }

    fn echo_interval() -> u16 {
        5
    }

    fn echo_timeout() -> u16 {
        15
    }

    fn table_miss_priority() -> u16 {
        0
    }

    fn learned_flow_priority() -> u16 {
        1
    }

    fn flow_timeout() -> u16 {
        0
    }
}

/// Config (toml) representation of the controller config
#[derive(Debug, Deserialize)]
pub(super) struct ControllerConfigSpec {
    // Southbound (OpenFlow) listener
    #[serde(default = "Defaults::listen_address")]
    pub(super) listen_address: IpAddr,
    #[serde(default = "Defaults::listen_port")]
    pub(super) listen_port: u16,

    // Send an ECHO_REQUEST after this many seconds without hearing from the switch
    #[serde(default = "Defaults::echo_interval")]
    pub(super) echo_interval: u16,
    // Drop the switch after this many seconds without hearing from it
    #[serde(default = "Defaults::echo_timeout")]
    pub(super) echo_timeout: u16,

    // Catch-all rule sending unmatched packets to the controller
    #[serde(default = "Defaults::table_miss_priority")]
    pub(super) table_miss_priority: u16,
    // Rules installed for learned hosts (must be above the table-miss rule)
    #[serde(default = "Defaults::learned_flow_priority")]
    pub(super) learned_flow_priority: u16,
    // Timeouts for learned rules, 0 means the rule never expires
    #[serde(default = "Defaults::flow_timeout")]
    pub(super) flow_idle_timeout: u16,
    #[serde(default = "Defaults::flow_timeout")]
    pub(super) flow_hard_timeout: u16,
}

impl ControllerConfigSpec {
    pub(super) fn from_file(path: &str) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_toml(&contents)
    }

    pub(super) fn from_toml(contents: &str) -> io::Result<Self> {
        toml::from_str(contents).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl Default for ControllerConfigSpec {
    fn default() -> Self {
        Self {
            listen_address: Defaults::listen_address(),
            listen_port: Defaults::listen_port(),
            echo_interval: Defaults::echo_interval(),
            echo_timeout: Defaults::echo_timeout(),
            table_miss_priority: Defaults::table_miss_priority(),
            learned_flow_priority: Defaults::learned_flow_priority(),
            flow_idle_timeout: Defaults::flow_timeout(),
            flow_hard_timeout: Defaults::flow_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = ControllerConfigSpec::from_file("./conf/sdnd.toml").unwrap();
        assert_eq!(config.listen_address, IpAddr::from(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(config.listen_port, 6633);
        assert_eq!(config.echo_interval, 5);
        assert_eq!(config.echo_timeout, 15);
        assert_eq!(config.learned_flow_priority, 1);
        assert_eq!(config.flow_idle_timeout, 0);
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfigSpec::from_toml("listen_port = 6653").unwrap();
        assert_eq!(config.listen_address, Defaults::listen_address());
        assert_eq!(config.listen_port, 6653);
        assert_eq!(config.echo_interval, 5);
        assert_eq!(config.echo_timeout, 15);
        assert_eq!(config.table_miss_priority, 0);
        assert_eq!(config.learned_flow_priority, 1);
        assert_eq!(config.flow_hard_timeout, 0);
    }

    #[test]
    fn test_invalid_config() {
        let err = ControllerConfigSpec::from_toml("listen_port = \"not a port\"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
