mod file;

use std::io::Result;
use std::net::{IpAddr, SocketAddr};

/// Parse a TOML config file and return a ControllerConfig
pub fn from_file(path: &str) -> Result<ControllerConfig> {
    let spec = file::ControllerConfigSpec::from_file(path)?;
    Ok(ControllerConfig::from_spec(spec))
}

/// In-Memory representation of the controller config
///   Has missing config file items defaulted
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    pub listen_address: IpAddr,
    pub listen_port: u16,
    pub echo_interval: u16,
    pub echo_timeout: u16,
    pub table_miss_priority: u16,
    pub learned_flow_priority: u16,
    pub flow_idle_timeout: u16,
    pub flow_hard_timeout: u16,
}

impl ControllerConfig {
    fn from_spec(spec: file::ControllerConfigSpec) -> Self {
        let echo_interval = spec.echo_interval.max(1);
        Self {
            listen_address: spec.listen_address,
            listen_port: spec.listen_port,
            echo_interval,
            // Never shorter than the interval, or every idle switch is dropped
            echo_timeout: spec.echo_timeout.max(echo_interval),
            table_miss_priority: spec.table_miss_priority,
            learned_flow_priority: spec.learned_flow_priority,
            flow_idle_timeout: spec.flow_idle_timeout,
            flow_hard_timeout: spec.flow_hard_timeout,
        }
    }

    pub fn listen_socket(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_spec(file::ControllerConfigSpec::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(
            config.listen_socket(),
            SocketAddr::new(IpAddr::from(Ipv4Addr::UNSPECIFIED), 6633)
        );
        assert_eq!(config.echo_interval, 5);
        assert_eq!(config.echo_timeout, 15);
        assert!(config.learned_flow_priority > config.table_miss_priority);
    }

    #[test]
    fn test_from_file() {
        let config = from_file("./conf/sdnd.toml").unwrap();
        assert_eq!(config.listen_address, IpAddr::from(Ipv4Addr::LOCALHOST));
        assert!(from_file("./conf/missing.toml").is_err());
    }

    #[test]
    fn test_echo_settings_clamped() {
        let spec = file::ControllerConfigSpec::from_toml("echo_interval = 0\necho_timeout = 0").unwrap();
        let config = ControllerConfig::from_spec(spec);
        assert_eq!(config.echo_interval, 1);
        assert_eq!(config.echo_timeout, 1);

        let spec = file::ControllerConfigSpec::from_toml("echo_interval = 10\necho_timeout = 3").unwrap();
        let config = ControllerConfig::from_spec(spec);
        assert_eq!(config.echo_interval, 10);
        assert_eq!(config.echo_timeout, 10);
    }
}
