use std::fmt;

use chrono::{Datelike, Timelike, Weekday};

/// Rate limit applied to a switch meter, derived from the time of day
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BandwidthPolicy {
    pub max_rate_kbps: u32,
    pub burst_size: u32,
}

impl BandwidthPolicy {
    fn from_rate(max_rate_kbps: u32) -> Self {
        Self {
            max_rate_kbps,
            burst_size: max_rate_kbps / 10,
        }
    }

    /// Evaluate the bandwidth schedule for a given instant
    ///
    /// Weekends:  500 kbps before noon, 1000 kbps after
    /// Weekdays:  300 kbps during work hours [09:00, 18:00), 1000 kbps otherwise
    ///
    /// Burst size is always a tenth of the rate (truncated)
    pub fn at<T>(time: &T) -> Self
    where
        T: Datelike + Timelike,
    {
        let hour = time.hour();
        let rate = match time.weekday() {
            Weekday::Sat | Weekday::Sun => {
                if hour < 12 {
                    500
                } else {
                    1000
                }
            }
            _ => {
                if hour < 9 || hour >= 18 {
                    1000
                } else {
                    300
                }
            }
        };
        Self::from_rate(rate)
    }
}

impl fmt::Display for BandwidthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} kbps (burst {})", self.max_rate_kbps, self.burst_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    // 2024-06-01 is a Saturday
    fn at(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd(2024, 6, day).and_hms(hour, min, 0)
    }

    #[test]
    fn test_weekend_schedule() {
        assert_eq!(BandwidthPolicy::at(&at(1, 0, 0)).max_rate_kbps, 500);
        assert_eq!(BandwidthPolicy::at(&at(1, 10, 0)).max_rate_kbps, 500);
        assert_eq!(BandwidthPolicy::at(&at(1, 11, 59)).max_rate_kbps, 500);
        assert_eq!(BandwidthPolicy::at(&at(1, 12, 0)).max_rate_kbps, 1000);
        assert_eq!(BandwidthPolicy::at(&at(2, 8, 0)).max_rate_kbps, 500);
        assert_eq!(BandwidthPolicy::at(&at(2, 23, 59)).max_rate_kbps, 1000);
    }

    #[test]
    fn test_weekday_schedule() {
        // Monday through Friday
        for day in 3..=7 {
            assert_eq!(BandwidthPolicy::at(&at(day, 0, 0)).max_rate_kbps, 1000);
            assert_eq!(BandwidthPolicy::at(&at(day, 8, 59)).max_rate_kbps, 1000);
            assert_eq!(BandwidthPolicy::at(&at(day, 9, 0)).max_rate_kbps, 300);
            assert_eq!(BandwidthPolicy::at(&at(day, 17, 59)).max_rate_kbps, 300);
            assert_eq!(BandwidthPolicy::at(&at(day, 18, 0)).max_rate_kbps, 1000);
        }
    }

    #[test]
    fn test_burst_is_tenth_of_rate() {
        assert_eq!(
            BandwidthPolicy::at(&at(1, 10, 0)),
            BandwidthPolicy {
                max_rate_kbps: 500,
                burst_size: 50
            }
        );
        assert_eq!(BandwidthPolicy::at(&at(3, 10, 0)).burst_size, 30);
        assert_eq!(BandwidthPolicy::at(&at(3, 20, 0)).burst_size, 100);
        assert_eq!(BandwidthPolicy::from_rate(305).burst_size, 30);
    }

    #[test]
    fn test_deterministic() {
        let time = Utc.ymd(2024, 6, 5).and_hms(13, 30, 0);
        assert_eq!(BandwidthPolicy::at(&time), BandwidthPolicy::at(&time));
        assert_eq!(BandwidthPolicy::at(&time).to_string(), "300 kbps (burst 30)");
    }
}
