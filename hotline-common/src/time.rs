//! Hotline 8-byte timestamps
//!
//! Layout: big-endian u16 year, u16 milliseconds, u32 seconds elapsed since
//! January 1st of that year. All conversions here are in UTC.

use std::time::SystemTime;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Timestamp as carried in the INFO fork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HotlineTime(pub [u8; 8]);

impl HotlineTime {
    /// Encode a UTC instant
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let year = u16::try_from(dt.year()).unwrap_or(0);
        let start_of_year = Utc
            .with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(dt);
        let seconds = u32::try_from((dt - start_of_year).num_seconds()).unwrap_or(0);
        let millis = dt.timestamp_subsec_millis().min(999) as u16;

        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&year.to_be_bytes());
        bytes[2..4].copy_from_slice(&millis.to_be_bytes());
        bytes[4..8].copy_from_slice(&seconds.to_be_bytes());
        Self(bytes)
    }

    /// Encode a filesystem timestamp
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_datetime(DateTime::<Utc>::from(time))
    }

    pub fn year(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Decode back to a UTC instant
    ///
    /// Returns `None` for the all-zero "unset" value.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let year = self.year();
        if year == 0 {
            return None;
        }
        let millis = u16::from_be_bytes([self.0[2], self.0[3]]);
        let seconds = u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]]);

        let start_of_year = Utc
            .with_ymd_and_hms(i32::from(year), 1, 1, 0, 0, 0)
            .single()?;
        Some(
            start_of_year
                + Duration::seconds(i64::from(seconds))
                + Duration::milliseconds(i64::from(millis)),
        )
    }
}
