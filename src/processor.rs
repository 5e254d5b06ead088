use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::bucket::BucketRing;
use crate::message::{Event, Message, Status};
use crate::summary::Summarizer;
use crate::Config;

/// Sole owner of the bucket ring.
///
/// Events, summary and status requests arrive through one bounded mailbox and are handled
/// strictly in arrival order. Rotation is driven by a deadline checked after every message
/// and whenever the mailbox stays quiet until the deadline, so the ring is never touched
/// from two places at once. An event arriving at the same instant as a rotation deadline
/// may land on either side of the boundary.
pub(crate) struct EventProcessor {
    rcv: mpsc::Receiver<Message>,
    ring: BucketRing,
    cfg: Arc<Config>,
    events: u64,
    started_at: i64,
    last_rotation_at: Option<i64>,
}

impl EventProcessor {
    pub fn new(rcv: mpsc::Receiver<Message>, capacity: usize, cfg: Arc<Config>) -> Self {
        Self {
            rcv,
            ring: BucketRing::new(capacity),
            cfg,
            events: 0,
            started_at: chrono::Local::now().timestamp_millis(),
            last_rotation_at: None,
        }
    }

    pub async fn run(mut self) -> crate::Result<()> {
        let bucket_duration = self.cfg.bucket_duration;
        let mut next_rotation = Instant::now() + bucket_duration;
        info!(
            "event processor started, bucket_duration: {:?}, capacity: {}, periods: {:?}",
            bucket_duration,
            self.ring.capacity(),
            self.cfg.periods
        );

        loop {
            match timeout_at(next_rotation, self.rcv.recv()).await {
                Ok(Some(msg)) => {
                    let now = Instant::now();
                    self.handle(msg);
                    if now.elapsed() > bucket_duration {
                        warn!("event processor message elapsed: {:?}", now.elapsed());
                    }
                }
                Ok(None) => {
                    info!(
                        "all recorders dropped, stopping event processor, events: {}, rotations: {}",
                        self.events,
                        self.ring.rotations()
                    );
                    return Ok(());
                }
                Err(_) => {}
            }
            next_rotation = self.rotate_due(next_rotation);
        }
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::Record(Event { label }) => {
                self.ring.record(&label);
                self.events += 1;
            }
            Message::Summary { chan } => {
                let summary = Summarizer::new(&self.cfg.periods).summarize(&self.ring);
                if chan.send(summary).is_err() {
                    debug!("summary requester went away");
                }
            }
            Message::Status { chan } => {
                if chan.send(self.status()).is_err() {
                    debug!("status requester went away");
                }
            }
            Message::Rotate { chan } => {
                self.rotate(1);
                let _ = chan.send(());
            }
        }
    }

    /// Rotates once for every bucket boundary passed since `deadline` and returns the next
    /// boundary. Boundaries keep to the schedule set at startup, even after a stall.
    fn rotate_due(&mut self, deadline: Instant) -> Instant {
        let now = Instant::now();
        if now < deadline {
            return deadline;
        }
        let bucket_nanos = self.cfg.bucket_duration.as_nanos().max(1);
        let lag = now.duration_since(deadline).as_nanos();
        let missed = lag / bucket_nanos + 1;
        if missed > 1 {
            warn!(
                "event processor fell behind by {:?}, rotating {} buckets at once",
                now.duration_since(deadline),
                missed
            );
        }
        // Beyond a full lap every slot has been cleared anyway.
        let rotations = missed.min(self.ring.capacity() as u128) as usize;
        self.rotate(rotations);
        now + Duration::from_nanos((bucket_nanos - lag % bucket_nanos) as u64)
    }

    fn rotate(&mut self, n: usize) {
        for _ in 0..n {
            self.ring.rotate();
        }
        self.last_rotation_at = Some(chrono::Local::now().timestamp_millis());
        debug!(
            "rotated {} bucket(s), current: {}, full: {}",
            n,
            self.ring.current_index(),
            self.ring.is_full()
        );
    }

    fn status(&self) -> Status {
        Status {
            capacity: self.ring.capacity(),
            current: self.ring.current_index(),
            full: self.ring.is_full(),
            rotations: self.ring.rotations(),
            events: self.events,
            bucket_duration_ms: self.cfg.bucket_duration.as_millis() as u64,
            started_at: self.started_at,
            last_rotation_at: self.last_rotation_at,
        }
    }
}
