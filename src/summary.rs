use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::bucket::BucketRing;
use crate::period::TimePeriod;

/// Counts for one time period.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodCount {
    pub name: String,
    /// Buckets actually summed; less than the period's span early in process life.
    pub buckets: usize,
    pub total: u64,
    pub per_label: BTreeMap<String, u64>,
}

impl PeriodCount {
    #[inline]
    pub fn count(&self, label: &str) -> u64 {
        self.per_label.get(label).copied().unwrap_or(0)
    }

    /// Share of `total` carried by `label`, `0.0` when nothing was recorded.
    #[inline]
    pub fn fraction(&self, label: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(label) as f64 / self.total as f64
    }
}

/// Rolling counts for every configured period, in configuration order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub periods: Vec<PeriodCount>,
}

impl Summary {
    pub fn period(&self, name: &str) -> Option<&PeriodCount> {
        self.periods.iter().find(|p| p.name == name)
    }

    /// Every label seen in any period, sorted.
    pub fn labels(&self) -> Vec<&str> {
        self.periods
            .iter()
            .flat_map(|p| p.per_label.keys())
            .map(|l| l.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Sums the trailing buckets of `ring` for each of `periods`.
pub struct Summarizer<'a> {
    periods: &'a [TimePeriod],
}

impl<'a> Summarizer<'a> {
    pub fn new(periods: &'a [TimePeriod]) -> Self {
        Self { periods }
    }

    pub fn summarize(&self, ring: &BucketRing) -> Summary {
        let periods = self
            .periods
            .iter()
            .map(|p| Self::sum_period(p, ring))
            .collect();
        Summary { periods }
    }

    fn sum_period(period: &TimePeriod, ring: &BucketRing) -> PeriodCount {
        let mut count = PeriodCount {
            name: period.name.clone(),
            ..Default::default()
        };
        for b in ring.last_n(period.buckets) {
            count.buckets += 1;
            count.total += b.total;
            for p in b.counter.iter() {
                *count.per_label.entry(p.value.clone()).or_insert(0) += p.count;
            }
        }
        count
    }
}
