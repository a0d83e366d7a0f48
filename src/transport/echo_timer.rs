use std::fmt;
use std::time;

use chrono::{DateTime, Duration, Utc};
use tokio::time::{interval, Interval};

use super::ConnectionError;
use crate::utils::{format_elapsed_time, get_elapsed_time};

/// Liveness tracking for a switch connection
///
/// An ECHO_REQUEST is due once the switch has been quiet for `interval`
/// seconds, and the connection is considered dead after `timeout` seconds
/// with nothing received.
#[derive(Debug)]
pub struct EchoTimer {
    pub(crate) interval: u16,
    pub(crate) timeout: u16,
    timer: Interval,
    pub(crate) last_sent: DateTime<Utc>,
    pub(crate) last_received: DateTime<Utc>,
}

impl EchoTimer {
    pub fn new(interval_secs: u16, timeout_secs: u16) -> EchoTimer {
        EchoTimer {
            interval: interval_secs,
            timeout: timeout_secs,
            timer: interval(time::Duration::from_millis(100)),
            last_sent: Utc::now(),
            last_received: Utc::now(),
        }
    }

    /// Waits for the next tick, then reports whether an echo should be sent
    pub async fn should_send_echo(&mut self) -> Result<bool, ConnectionError> {
        self.timer.tick().await;
        if self.is_expired() {
            return Err(ConnectionError::EchoTimeout(self.timeout));
        }
        let interval = Duration::seconds(self.interval.into());
        Ok(get_elapsed_time(self.last_received) >= interval
            && get_elapsed_time(self.last_sent) >= interval)
    }

    /// Bump the last received to now
    pub fn received(&mut self) {
        self.last_received = Utc::now();
    }
    /// Bump the last sent to now
    pub fn sent(&mut self) {
        self.last_sent = Utc::now();
    }

    // Time left before the connection expires, never less than 0
    fn get_remaining(&self) -> Duration {
        let timeout = Duration::seconds(self.timeout.into());
        let elapsed = get_elapsed_time(self.last_received);
        if elapsed > timeout {
            Duration::seconds(0)
        } else {
            timeout - elapsed
        }
    }

    fn is_expired(&self) -> bool {
        get_elapsed_time(self.last_received) >= Duration::seconds(self.timeout.into())
    }
}

impl fmt::Display for EchoTimer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format_elapsed_time(self.get_remaining()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_interval() {
        let mut et = EchoTimer::new(5, 15);
        assert!(!et.is_expired());
        et.timer = interval(time::Duration::from_millis(1));
        assert!(!et.should_send_echo().await.unwrap());

        // Quiet for longer than the interval, echo is due
        et.last_received = et.last_received - Duration::seconds(6);
        et.last_sent = et.last_sent - Duration::seconds(6);
        et.timer = interval(time::Duration::from_millis(1));
        assert!(et.should_send_echo().await.unwrap());

        // Just sent one, wait for the reply
        et.sent();
        et.timer = interval(time::Duration::from_millis(1));
        assert!(!et.should_send_echo().await.unwrap());

        // Nothing received within the timeout
        et.last_received = et.last_received - Duration::seconds(15);
        et.timer = interval(time::Duration::from_millis(1));
        match et.should_send_echo().await {
            Err(ConnectionError::EchoTimeout(15)) => (),
            other => panic!("Expected echo timeout, got {:?}", other),
        }
    }

}
