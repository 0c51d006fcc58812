//! Bar interval strings of the form `<integer><unit>`, unit one of m/h/d/w.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::SigtraderError;

/// Intervals the primary exchange publishes klines for.
const PRIMARY_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
}

impl IntervalUnit {
    fn suffix(self) -> char {
        match self {
            IntervalUnit::Minute => 'm',
            IntervalUnit::Hour => 'h',
            IntervalUnit::Day => 'd',
            IntervalUnit::Week => 'w',
        }
    }

    fn millis(self) -> i64 {
        match self {
            IntervalUnit::Minute => 60_000,
            IntervalUnit::Hour => 3_600_000,
            IntervalUnit::Day => 86_400_000,
            IntervalUnit::Week => 7 * 86_400_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub count: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn millis(&self) -> i64 {
        self.count as i64 * self.unit.millis()
    }

    /// The exchange notation for this interval, if the primary source serves it.
    pub fn primary_notation(&self) -> Option<String> {
        let s = self.to_string();
        PRIMARY_INTERVALS.contains(&s.as_str()).then_some(s)
    }
}

impl FromStr for Interval {
    type Err = SigtraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let invalid = || SigtraderError::invalid_request(format!("unrecognized interval '{s}'"));

        let unit = match s.chars().last() {
            Some('m') => IntervalUnit::Minute,
            Some('h') => IntervalUnit::Hour,
            Some('d') => IntervalUnit::Day,
            Some('w') => IntervalUnit::Week,
            _ => return Err(invalid()),
        };
        let digits = &s[..s.len() - 1];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u32 = digits.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }
        Ok(Interval { count, unit })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!("15m".parse::<Interval>().unwrap().millis(), 15 * 60_000);
        assert_eq!("4h".parse::<Interval>().unwrap().millis(), 4 * 3_600_000);
        assert_eq!("1d".parse::<Interval>().unwrap().millis(), 86_400_000);
        assert_eq!("2w".parse::<Interval>().unwrap().millis(), 14 * 86_400_000);
    }

    #[test]
    fn case_insensitive_and_trimmed() {
        let iv: Interval = " 4H ".parse().unwrap();
        assert_eq!(iv.to_string(), "4h");
    }

    #[test]
    fn rejects_bad_patterns() {
        for bad in ["", "h", "4", "4x", "-1h", "0h", "1.5h", "4hh", "1M"] {
            assert!(bad.parse::<Interval>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn primary_notation_only_for_supported() {
        assert_eq!(
            "4h".parse::<Interval>().unwrap().primary_notation(),
            Some("4h".to_string())
        );
        assert_eq!("7m".parse::<Interval>().unwrap().primary_notation(), None);
        assert_eq!("2d".parse::<Interval>().unwrap().primary_notation(), None);
    }
}
