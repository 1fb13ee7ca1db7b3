//! MS-DOS date/time handling for ZIP entries.
//!
//! ZIP headers store modification times as a pair of 16-bit MS-DOS values:
//!
//! - date: `(year - 1980) << 9 | month << 5 | day`
//! - time: `hour << 11 | minute << 5 | second / 2`
//!
//! The format has two-second resolution, no time zone, and covers the years
//! 1980 through 2107. This crate writes and reads these fields as UTC so that
//! a pack/extract round trip restores the same modification time on any host.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds per day.
const SECS_PER_DAY: i64 = 86_400;

/// Earliest representable instant: 1980-01-01T00:00:00Z.
const DOS_EPOCH_UNIX_SECS: i64 = 315_532_800;

/// A modification time as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// Packed MS-DOS date.
    pub date: u16,
    /// Packed MS-DOS time.
    pub time: u16,
}

impl Default for DosDateTime {
    /// 1980-01-01 00:00:00, the DOS epoch.
    fn default() -> Self {
        Self {
            date: (1 << 5) | 1,
            time: 0,
        }
    }
}

impl DosDateTime {
    /// Creates a value from raw header fields.
    pub const fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Converts Unix seconds (UTC) to DOS date/time.
    ///
    /// Values before 1980 clamp to the DOS epoch and values after 2107
    /// clamp to the last representable second. Odd seconds round down.
    pub fn from_unix_secs(secs: i64) -> Self {
        if secs < DOS_EPOCH_UNIX_SECS {
            return Self::default();
        }

        let days = secs.div_euclid(SECS_PER_DAY);
        let rem = secs.rem_euclid(SECS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        if year > 2107 {
            return Self {
                date: (127 << 9) | (12 << 5) | 31,
                time: (23 << 11) | (59 << 5) | 29,
            };
        }

        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;

        Self {
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
            time: (hour << 11) | (minute << 5) | (second / 2),
        }
    }

    /// Converts to Unix seconds (UTC).
    ///
    /// Out-of-range fields (month 0, day 0) written by sloppy archivers are
    /// clamped to the nearest valid value.
    pub fn as_unix_secs(&self) -> i64 {
        let year = 1980 + i64::from(self.date >> 9);
        let month = u32::from((self.date >> 5) & 0x0F).clamp(1, 12);
        let day = u32::from(self.date & 0x1F).max(1);
        let hour = i64::from(self.time >> 11);
        let minute = i64::from((self.time >> 5) & 0x3F);
        let second = i64::from(self.time & 0x1F) * 2;

        days_from_civil(year, month, day) * SECS_PER_DAY + hour * 3600 + minute * 60 + second
    }

    /// Creates a value from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => Self::from_unix_secs(duration.as_secs() as i64),
            Err(_) => Self::default(),
        }
    }

    /// Converts to a `SystemTime`.
    pub fn as_system_time(&self) -> SystemTime {
        // DOS times are never before the Unix epoch.
        UNIX_EPOCH + Duration::from_secs(self.as_unix_secs() as u64)
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Proleptic Gregorian date for a number of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dos_epoch() {
        let dt = DosDateTime::from_unix_secs(DOS_EPOCH_UNIX_SECS);
        assert_eq!(dt, DosDateTime::default());
        assert_eq!(dt.as_unix_secs(), DOS_EPOCH_UNIX_SECS);
    }

    #[test]
    fn test_known_date() {
        // 2024-02-29T13:45:30Z
        let secs = 1_709_214_330;
        let dt = DosDateTime::from_unix_secs(secs);
        assert_eq!(dt.date >> 9, 44);
        assert_eq!((dt.date >> 5) & 0x0F, 2);
        assert_eq!(dt.date & 0x1F, 29);
        assert_eq!(dt.time >> 11, 13);
        assert_eq!((dt.time >> 5) & 0x3F, 45);
        assert_eq!((dt.time & 0x1F) * 2, 30);
        assert_eq!(dt.as_unix_secs(), secs);
    }

    #[test]
    fn test_two_second_resolution() {
        let secs = 1_709_214_331;
        assert_eq!(DosDateTime::from_unix_secs(secs).as_unix_secs(), secs - 1);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(DosDateTime::from_unix_secs(0), DosDateTime::default());
        assert_eq!(DosDateTime::from_unix_secs(-5), DosDateTime::default());

        let far = DosDateTime::from_unix_secs(10_000_000_000);
        assert_eq!(far.date >> 9, 127);
    }

    #[test]
    fn test_sloppy_fields() {
        // Month 0 and day 0 clamp instead of producing garbage.
        let dt = DosDateTime::new(44 << 9, 0);
        let expected = DosDateTime::new((44 << 9) | (1 << 5) | 1, 0);
        assert_eq!(dt.as_unix_secs(), expected.as_unix_secs());
    }

    #[test]
    fn test_civil_roundtrip_over_range() {
        for days in (3_652..50_000).step_by(97) {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days);
        }
    }

    #[test]
    fn test_system_time_roundtrip() {
        let time = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let dt = DosDateTime::from_system_time(time);
        assert_eq!(dt.as_system_time(), time);
    }
}
