//! Live request metrics over rolling time windows.
//!
//! Events (typically a response status per finished request) are counted into a fixed
//! ring of equal-duration buckets. A single task owns the ring: it applies events,
//! rotates to a fresh bucket on a timer, and answers summary queries, so memory stays
//! bounded by the longest configured period regardless of traffic.
//!
//! ```rust,ignore
//! let (recorder, _handle) = Stats::new(Config::default())?.start();
//! recorder.record(Event::status(200)).await?;
//! let summary = recorder.summary().await?;
//! println!("{:?}", summary.period("last five minutes"));
//! ```

use std::time::Duration;

pub use crate::bucket::{Bucket, BucketRing};
pub use crate::counter::{DiscreteCounter, DiscretePoint, LINEAR_SCAN_LIMIT};
pub use crate::error::{Error, Result};
pub use crate::message::{Event, Status};
pub use crate::period::TimePeriod;
pub use crate::stats::{Recorder, Stats};
pub use crate::summary::{PeriodCount, Summarizer, Summary};

mod bucket;
mod counter;
mod error;
mod message;
mod period;
mod processor;
mod stats;
mod summary;

#[derive(Clone, Debug)]
pub struct Config {
    //Length of one bucket, and the rotation interval
    pub bucket_duration: Duration,
    //Rolling windows, sorted by strictly increasing span
    pub periods: Vec<TimePeriod>,
    //Mailbox depth, producers wait when it is full
    pub queue_size: usize,
    //None waits for mailbox space indefinitely
    pub submit_timeout: Option<Duration>,
    //Summary and status round trips
    pub query_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_duration: Duration::from_secs(10),
            periods: TimePeriod::defaults(),
            queue_size: 16,
            submit_timeout: None,
            query_timeout: Duration::from_secs(6),
        }
    }
}

impl Config {
    /// Checks the configuration and returns the ring capacity it calls for, i.e. the span
    /// of the longest period.
    pub fn validate(&self) -> Result<usize> {
        if self.bucket_duration.is_zero() {
            return Err(Error::config("bucket duration must be greater than zero"));
        }
        if self.queue_size == 0 {
            return Err(Error::config("queue size must be greater than zero"));
        }
        period::validate(&self.periods)
    }
}
