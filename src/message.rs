use serde::{Deserialize, Serialize};
use tokio::sync::oneshot::Sender;

use crate::summary::Summary;

/// One completed unit of work, identified by its outcome label.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub label: String,
}

impl Event {
    #[inline]
    pub fn new<L: Into<String>>(label: L) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// An event labelled with a response status code, e.g. `"404"`.
    #[inline]
    pub fn status(code: u16) -> Self {
        Self {
            label: code.to_string(),
        }
    }
}

impl From<&str> for Event {
    fn from(label: &str) -> Self {
        Event::new(label)
    }
}

impl From<String> for Event {
    fn from(label: String) -> Self {
        Event::new(label)
    }
}

pub(crate) enum Message {
    Record(Event),
    Summary { chan: Sender<Summary> },
    Status { chan: Sender<Status> },
    Rotate { chan: Sender<()> },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub capacity: usize,
    pub current: usize,
    pub full: bool,
    pub rotations: u64,
    /// Events recorded since start, including those already rotated out.
    pub events: u64,
    pub bucket_duration_ms: u64,
    pub started_at: i64,
    pub last_rotation_at: Option<i64>,
}

impl Status {
    /// Buckets currently holding readable data.
    #[inline]
    pub fn available(&self) -> usize {
        if self.full {
            self.capacity
        } else {
            self.current + 1
        }
    }
}
