use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::message::{Event, Message, Status};
use crate::period::TimePeriod;
use crate::processor::EventProcessor;
use crate::summary::Summary;
use crate::Config;

/// A handle for recording events into, and querying, a running [`Stats`] processor.
///
/// Cloning is cheap; every clone feeds the same mailbox.
#[derive(Clone)]
pub struct Recorder {
    sender: mpsc::Sender<Message>,
    cfg: Arc<Config>,
    pending: Arc<AtomicIsize>,
}

impl Recorder {
    /// Records one event against the current bucket.
    ///
    /// Waits while the mailbox is full; events are never dropped. With
    /// [`Config::submit_timeout`] set, gives up with [`Error::Elapsed`] instead of waiting
    /// past it. Fails with [`Error::SendError`] only once the processor has stopped.
    #[inline]
    pub async fn record<E: Into<Event>>(&self, event: E) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        scopeguard::defer! {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        let msg = Message::Record(event.into());
        let sent = match self.cfg.submit_timeout {
            Some(t) => timeout(t, self.sender.send(msg)).await?,
            None => self.sender.send(msg).await,
        };
        Ok(sent?)
    }

    /// Like [`record`](Self::record), but blocks the calling thread. Must not be called
    /// from inside an async context.
    pub fn record_blocking<E: Into<Event>>(&self, event: E) -> Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        scopeguard::defer! {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(self.sender.blocking_send(Message::Record(event.into()))?)
    }

    /// Rolling counts for every configured period, computed by the processor itself so
    /// the ring is never read while it is being written.
    #[inline]
    pub async fn summary(&self) -> Result<Summary> {
        self.request(|chan| Message::Summary { chan }).await
    }

    #[inline]
    pub async fn status(&self) -> Result<Status> {
        self.request(|chan| Message::Status { chan }).await
    }

    /// Starts a new bucket now, without waiting for the timer. The timer schedule is left
    /// unchanged.
    #[inline]
    pub async fn rotate(&self) -> Result<()> {
        self.request(|chan| Message::Rotate { chan }).await
    }

    /// Producers currently waiting for mailbox space or a send to complete.
    #[inline]
    pub fn pending_submits(&self) -> isize {
        self.pending.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn periods(&self) -> &[TimePeriod] {
        &self.cfg.periods
    }

    async fn request<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Message,
    {
        let exchange = async {
            let (tx, rx) = oneshot::channel();
            self.sender.send(f(tx)).await?;
            Ok::<_, Error>(rx.await?)
        };
        timeout(self.cfg.query_timeout, exchange).await?
    }
}

/// Rolling-window event counts over a fixed ring of time buckets.
pub struct Stats {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
    capacity: usize,
    cfg: Arc<Config>,
    pending: Arc<AtomicIsize>,
}

impl Stats {
    /// Validates `cfg` and sizes the ring from its longest period.
    pub fn new(cfg: Config) -> Result<Self> {
        let capacity = cfg.validate()?;
        let (tx, rx) = mpsc::channel(cfg.queue_size);
        Ok(Self {
            tx,
            rx,
            capacity,
            cfg: Arc::new(cfg),
            pending: Arc::new(AtomicIsize::new(0)),
        })
    }

    /// gets a `Recorder` feeding this instance.
    pub fn recorder(&self) -> Recorder {
        Recorder {
            sender: self.tx.clone(),
            cfg: self.cfg.clone(),
            pending: self.pending.clone(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Processes events and rotations until every `Recorder` has been dropped.
    pub async fn run(self) -> Result<()> {
        let Stats {
            tx, rx, capacity, cfg, ..
        } = self;
        drop(tx);
        EventProcessor::new(rx, capacity, cfg).run().await?;
        info!("leaving event processor");
        Ok(())
    }

    /// Spawns [`run`](Self::run) on the current tokio runtime.
    pub fn start(self) -> (Recorder, JoinHandle<Result<()>>) {
        let recorder = self.recorder();
        let handle = tokio::spawn(self.run());
        (recorder, handle)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(bucket_duration: Duration, periods: Vec<TimePeriod>) -> Config {
        Config {
            bucket_duration,
            periods,
            ..Default::default()
        }
    }

    fn scenario_config() -> Config {
        config(
            Duration::from_secs(10),
            vec![TimePeriod::new("10s", 1), TimePeriod::new("5m", 30)],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_scenario() {
        let (recorder, _handle) = Stats::new(scenario_config()).unwrap().start();
        for _ in 0..5 {
            recorder.record("200").await.unwrap();
        }
        for _ in 0..2 {
            recorder.record(Event::status(404)).await.unwrap();
        }

        let summary = recorder.summary().await.unwrap();
        for name in ["10s", "5m"] {
            let p = summary.period(name).unwrap();
            assert_eq!(p.total, 7);
            assert_eq!(p.count("200"), 5);
            assert_eq!(p.count("404"), 2);
            assert_eq!(p.per_label.len(), 2);
        }

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        recorder.record("200").await.unwrap();

        let summary = recorder.summary().await.unwrap();
        let short = summary.period("10s").unwrap();
        assert_eq!(short.total, 1);
        assert_eq!(short.per_label.len(), 1);
        assert_eq!(short.count("200"), 1);
        let long = summary.period("5m").unwrap();
        assert_eq!(long.total, 8);
        assert_eq!(long.count("200"), 6);
        assert_eq!(long.count("404"), 2);
        assert_eq!(recorder.status().await.unwrap().rotations, 1);
    }

    #[tokio::test]
    async fn manual_rotation_scenario() {
        let cfg = config(
            Duration::from_secs(3600),
            vec![TimePeriod::new("10s", 1), TimePeriod::new("5m", 30)],
        );
        let (recorder, _handle) = Stats::new(cfg).unwrap().start();
        for label in ["200", "200", "404"] {
            recorder.record(label).await.unwrap();
        }
        recorder.rotate().await.unwrap();
        recorder.record("200").await.unwrap();

        let summary = recorder.summary().await.unwrap();
        assert_eq!(summary.period("10s").unwrap().total, 1);
        assert_eq!(summary.period("5m").unwrap().total, 4);
        assert_eq!(summary.period("5m").unwrap().buckets, 2);
    }

    #[tokio::test]
    async fn cold_start_summary_is_empty() {
        let (recorder, _handle) = Stats::new(Config::default()).unwrap().start();
        let summary = recorder.summary().await.unwrap();
        assert_eq!(summary.periods.len(), 4);
        assert!(summary
            .periods
            .iter()
            .all(|p| p.total == 0 && p.per_label.is_empty() && p.buckets == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_without_traffic() {
        let (recorder, _handle) = Stats::new(scenario_config()).unwrap().start();
        recorder.record("200").await.unwrap();
        tokio::time::sleep(Duration::from_secs(35)).await;

        let status = recorder.status().await.unwrap();
        assert_eq!(status.rotations, 3);
        assert_eq!(status.available(), 4);
        assert!(status.last_rotation_at.is_some());

        let summary = recorder.summary().await.unwrap();
        assert_eq!(summary.period("10s").unwrap().total, 0);
        assert_eq!(summary.period("5m").unwrap().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn old_data_ages_out_after_wrapping() {
        let cfg = config(
            Duration::from_secs(10),
            vec![TimePeriod::new("10s", 1), TimePeriod::new("30s", 3)],
        );
        let (recorder, _handle) = Stats::new(cfg).unwrap().start();
        recorder.record("500").await.unwrap();
        // more than two laps of a three bucket ring
        tokio::time::sleep(Duration::from_secs(75)).await;
        recorder.record("200").await.unwrap();

        let summary = recorder.summary().await.unwrap();
        for p in &summary.periods {
            assert_eq!(p.count("500"), 0);
            assert_eq!(p.total, 1);
        }
        assert!(recorder.status().await.unwrap().full);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 250;
        let cfg = Config {
            bucket_duration: Duration::from_secs(3600),
            periods: vec![TimePeriod::new("now", 1), TimePeriod::new("all", 1000)],
            queue_size: 4,
            ..Default::default()
        };
        let (recorder, _handle) = Stats::new(cfg).unwrap().start();

        let mut producers = Vec::new();
        for i in 0..PRODUCERS {
            let recorder = recorder.clone();
            producers.push(tokio::spawn(async move {
                for j in 0..PER_PRODUCER {
                    let code = if (i + j) % 5 == 0 { 500 } else { 200 };
                    recorder.record(Event::status(code)).await.unwrap();
                }
            }));
        }
        let rotator = {
            let recorder = recorder.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    recorder.rotate().await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        for r in futures::future::join_all(producers).await {
            r.unwrap();
        }
        rotator.await.unwrap();

        let total = (PRODUCERS * PER_PRODUCER) as u64;
        let summary = recorder.summary().await.unwrap();
        let all = summary.period("all").unwrap();
        assert_eq!(all.total, total);
        assert_eq!(all.count("200") + all.count("500"), total);
        assert_eq!(all.buckets, 21);
        let status = recorder.status().await.unwrap();
        assert_eq!(status.events, total);
        assert_eq!(status.rotations, 20);
        assert_eq!(recorder.pending_submits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_mailbox_blocks_producers() {
        let cfg = Config {
            queue_size: 2,
            ..scenario_config()
        };
        let stats = Stats::new(cfg).unwrap();
        let recorder = stats.recorder();
        recorder.record("200").await.unwrap();
        recorder.record("200").await.unwrap();

        let blocked = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.record("503").await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!blocked.is_finished());
        assert_eq!(recorder.pending_submits(), 1);

        tokio::spawn(stats.run());
        blocked.await.unwrap().unwrap();
        assert_eq!(recorder.pending_submits(), 0);
        let summary = recorder.summary().await.unwrap();
        assert_eq!(summary.period("10s").unwrap().total, 3);
        assert_eq!(summary.period("10s").unwrap().count("503"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_timeout_reports_elapsed() {
        let cfg = Config {
            queue_size: 1,
            submit_timeout: Some(Duration::from_millis(50)),
            ..scenario_config()
        };
        let stats = Stats::new(cfg).unwrap();
        let recorder = stats.recorder();
        recorder.record("200").await.unwrap();
        assert!(matches!(recorder.record("200").await, Err(Error::Elapsed)));
        assert_eq!(recorder.pending_submits(), 0);
    }

    #[test]
    fn blocking_producers_on_plain_threads() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let (recorder, handle) = rt.block_on(async {
            Stats::new(Config {
                queue_size: 2,
                ..scenario_config()
            })
            .unwrap()
            .start()
        });

        let threads = (0..4)
            .map(|_| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        recorder.record_blocking("200").unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for t in threads {
            t.join().unwrap();
        }

        let summary = rt.block_on(recorder.summary()).unwrap();
        assert_eq!(summary.period("10s").unwrap().total, 400);
        drop(recorder);
        rt.block_on(handle).unwrap().unwrap();
    }

    #[tokio::test]
    async fn stops_when_recorders_are_dropped() {
        let (recorder, handle) = Stats::new(Config::default()).unwrap().start();
        let second = recorder.clone();
        recorder.record("200").await.unwrap();
        drop(recorder);
        drop(second);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_after_stop_fails() {
        let stats = Stats::new(Config::default()).unwrap();
        let recorder = stats.recorder();
        drop(stats);
        assert!(matches!(
            recorder.record("200").await,
            Err(Error::SendError(_))
        ));
        assert!(matches!(recorder.summary().await, Err(Error::SendError(_))));
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = config(
            Duration::from_secs(10),
            vec![TimePeriod::new("5m", 30), TimePeriod::new("10s", 1)],
        );
        assert!(matches!(Stats::new(cfg), Err(Error::InvalidConfig(_))));
    }
}
