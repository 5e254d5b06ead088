use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named rolling window made of the trailing `buckets` buckets, current one included.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TimePeriod {
    pub name: String,
    pub buckets: usize,
}

impl TimePeriod {
    pub fn new<N: Into<String>>(name: N, buckets: usize) -> Self {
        Self {
            name: name.into(),
            buckets,
        }
    }

    /// A period covering at least `window`, rounded up to whole buckets.
    pub fn spanning<N: Into<String>>(
        name: N,
        window: Duration,
        bucket_duration: Duration,
    ) -> Result<Self> {
        let bucket_nanos = bucket_duration.as_nanos();
        if bucket_nanos == 0 {
            return Err(Error::config("bucket duration must be greater than zero"));
        }
        let buckets = window.as_nanos().div_ceil(bucket_nanos);
        let buckets = usize::try_from(buckets)
            .map_err(|_| Error::config(format!("window {:?} is too long", window)))?;
        Ok(Self::new(name, buckets.max(1)))
    }

    /// The ten second, five minute, hour and day windows, for 10 second buckets.
    pub fn defaults() -> Vec<TimePeriod> {
        const PER_MINUTE: usize = 60 / 10;
        vec![
            TimePeriod::new("last ten seconds", 1),
            TimePeriod::new("last five minutes", PER_MINUTE * 5),
            TimePeriod::new("last hour", PER_MINUTE * 60),
            TimePeriod::new("last day", PER_MINUTE * 60 * 24),
        ]
    }
}

/// Checks that `periods` is non-empty, uniquely named and strictly increasing in span, and
/// returns the ring capacity they need.
pub(crate) fn validate(periods: &[TimePeriod]) -> Result<usize> {
    if periods.is_empty() {
        return Err(Error::config("at least one time period is required"));
    }
    let mut names = HashSet::new();
    let mut prev: Option<&TimePeriod> = None;
    for p in periods {
        if p.buckets == 0 {
            return Err(Error::config(format!(
                "time period {:?} must span at least one bucket",
                p.name
            )));
        }
        if !names.insert(p.name.as_str()) {
            return Err(Error::config(format!(
                "duplicate time period name {:?}",
                p.name
            )));
        }
        if let Some(prev) = prev {
            if p.buckets <= prev.buckets {
                return Err(Error::config(format!(
                    "time periods must be sorted by strictly increasing span, {:?} ({}) follows {:?} ({})",
                    p.name, p.buckets, prev.name, prev.buckets
                )));
            }
        }
        prev = Some(p);
    }
    Ok(periods.iter().map(|p| p.buckets).max().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_to_a_day_of_buckets() {
        assert_eq!(validate(&TimePeriod::defaults()).unwrap(), 8640);
    }

    #[test]
    fn rejects_unsorted_periods() {
        let periods = vec![TimePeriod::new("5m", 30), TimePeriod::new("10s", 1)];
        assert!(matches!(validate(&periods), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_equal_spans() {
        let periods = vec![TimePeriod::new("a", 3), TimePeriod::new("b", 3)];
        assert!(validate(&periods).is_err());
    }

    #[test]
    fn rejects_empty_zero_and_duplicates() {
        assert!(validate(&[]).is_err());
        assert!(validate(&[TimePeriod::new("zero", 0)]).is_err());
        let dup = vec![TimePeriod::new("x", 1), TimePeriod::new("x", 2)];
        assert!(validate(&dup).is_err());
    }

    #[test]
    fn spanning_rounds_up() {
        let bucket = Duration::from_secs(10);
        let p = TimePeriod::spanning("5m", Duration::from_secs(300), bucket).unwrap();
        assert_eq!(p.buckets, 30);
        let p = TimePeriod::spanning("15s", Duration::from_secs(15), bucket).unwrap();
        assert_eq!(p.buckets, 2);
        let p = TimePeriod::spanning("tiny", Duration::from_millis(1), bucket).unwrap();
        assert_eq!(p.buckets, 1);
        assert!(TimePeriod::spanning("x", bucket, Duration::ZERO).is_err());
    }
}
