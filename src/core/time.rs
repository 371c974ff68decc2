//! Timestamps and durations
//!
//! Every sample flowing through a stream carries a [`Timestamp`]: signed
//! microseconds since the Unix epoch, UTC. Subtracting two timestamps gives
//! a signed [`Duration`]. The internal unit is microseconds everywhere; the
//! wall clock behind [`Timestamp::now`] is the operating system clock, so
//! accuracy varies between platforms.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Monotonic per-stream counter identifying entries within one open/close
/// cycle. `-1` means "never read".
pub type SequenceId = i64;

/// Sentinel sequence id for a reader that has not read anything yet.
pub const NO_SEQUENCE: SequenceId = -1;

/// A relative time period in microseconds. Can be negative.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub fn seconds(sec: f64) -> Duration {
        Duration((sec * 1e6) as i64)
    }

    pub fn millis(msec: f64) -> Duration {
        Duration((msec * 1e3) as i64)
    }

    pub fn micros(usec: i64) -> Duration {
        Duration(usec)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_millis(self) -> i64 {
        self.0 / 1000
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 * 1e-6
    }

    pub fn abs(self) -> Duration {
        Duration(self.0.abs())
    }

    /// Pause the current thread for at least this duration. Expect a few
    /// milliseconds of slack from the scheduler; callers that need a short
    /// and accurate wait should poll [`Timestamp::now`] instead.
    pub fn sleep(self) {
        if self.0 > 0 {
            std::thread::sleep(std::time::Duration::from_micros(self.0 as u64));
        }
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Neg for Duration {
    type Output = Duration;
    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;
    fn mul(self, factor: f64) -> Duration {
        Duration((self.0 as f64 * factor) as i64)
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;
    fn mul(self, factor: i64) -> Duration {
        Duration(self.0 * factor)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// The time and date at which an event occurred, in microseconds elapsed
/// since Jan. 1st 1970, UTC.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Jan. 1st 1970, the zero timestamp and the initial seek position of
    /// every reader.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// The current wall-clock time.
    pub fn now() -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Timestamp(elapsed.as_micros() as i64),
            // Clock set before 1970; keep the order intact anyway.
            Err(err) => Timestamp(-(err.duration().as_micros() as i64)),
        }
    }

    pub fn from_micros(epoch_micros: i64) -> Timestamp {
        Timestamp(epoch_micros)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_micros())
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;
    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 - rhs.as_micros())
    }
}

impl Sub for Timestamp {
    type Output = Duration;
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration::micros(self.0 - rhs.0)
    }
}

impl AddAssign<Duration> for Timestamp {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.as_micros();
    }
}

impl SubAssign<Duration> for Timestamp {
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.as_micros();
    }
}

impl fmt::Display for Timestamp {
    /// UTC date and time, microsecond precision.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_micros(self.0) {
            Some(utc) => write!(f, "{}", utc.format("%Y.%m.%d - %H:%M:%S%.6f")),
            None => write!(f, "{}us", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_constructors_agree() {
        assert_eq!(Duration::seconds(1.0), Duration::micros(1_000_000));
        assert_eq!(Duration::millis(1.0), Duration::micros(1_000));
        assert_eq!(Duration::millis(2.5).as_micros(), 2_500);
    }

    #[test]
    fn duration_arithmetic() {
        let a = Duration::millis(10.0);
        let b = Duration::millis(4.0);
        assert_eq!(a - b, Duration::millis(6.0));
        assert_eq!(a + b, Duration::millis(14.0));
        assert_eq!((b - a).abs(), Duration::millis(6.0));
        assert_eq!(a * 2i64, Duration::millis(20.0));
        assert_eq!(a * 0.5, Duration::millis(5.0));
        assert!(b < a);
    }

    #[test]
    fn timestamp_ordering_and_arithmetic() {
        let t = Timestamp::from_micros(1_000);
        let later = t + Duration::micros(5);
        assert!(t < later);
        assert_eq!(later - t, Duration::micros(5));
        assert_eq!(later - Duration::micros(5), t);

        let mut moving = t;
        moving += Duration::micros(10);
        assert_eq!(moving.as_micros(), 1_010);
        moving -= Duration::micros(10);
        assert_eq!(moving, t);
    }

    #[test]
    fn now_does_not_go_backwards() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
        assert!(a > Timestamp::EPOCH);
    }

    #[test]
    fn sleep_waits_at_least_requested() {
        let before = Timestamp::now();
        Duration::millis(5.0).sleep();
        assert!(Timestamp::now() - before >= Duration::millis(5.0));
    }

    #[test]
    fn display_is_utc() {
        let t = Timestamp::from_micros(0);
        assert_eq!(t.to_string(), "1970.01.01 - 00:00:00.000000");
    }
}
