//! Frame-batched chart updates.
//!
//! Samples queued for a chart are not drawn immediately. The first pending
//! sample schedules a frame; everything queued until the frame fires is
//! applied together, and each affected chart is redrawn once.

mod handle;

pub use handle::{ChartHandle, RedrawMode};

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::ChartConfig;
use crate::frame::{next_frame, FrameTimer};

enum ChartCommand {
    Register {
        chart_id: String,
        handle: Box<dyn ChartHandle>,
    },
    Update {
        chart_id: String,
        sample: f64,
    },
    Clear {
        chart_id: String,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Snapshot {
        chart_id: String,
        reply: oneshot::Sender<Option<Vec<f64>>>,
    },
}

/// Handle to the chart batching task.
#[derive(Clone)]
pub struct ChartUpdateBatcher {
    tx: mpsc::UnboundedSender<ChartCommand>,
}

impl ChartUpdateBatcher {
    /// Spawn the batching task on the current tokio runtime.
    pub fn spawn(config: ChartConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = ChartBatchLoop {
            frame: FrameTimer::new(config.frame_interval),
            config,
            charts: HashMap::new(),
            pending: Vec::new(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Register a chart, replacing any previous handle and starting from an
    /// empty buffer.
    pub fn register(&self, chart_id: impl Into<String>, handle: impl ChartHandle + 'static) {
        self.send(ChartCommand::Register {
            chart_id: chart_id.into(),
            handle: Box::new(handle),
        });
    }

    /// Queue a sample for the next frame.
    pub fn queue_update(&self, chart_id: impl Into<String>, sample: f64) {
        self.send(ChartCommand::Update {
            chart_id: chart_id.into(),
            sample,
        });
    }

    /// Empty a chart's buffer, keeping its registration.
    pub fn clear(&self, chart_id: impl Into<String>) {
        self.send(ChartCommand::Clear {
            chart_id: chart_id.into(),
        });
    }

    /// Apply pending updates now instead of waiting for the frame.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        self.send(ChartCommand::Flush { done });
        let _ = rx.await;
    }

    /// Current buffer of a chart, `None` if it is not registered.
    pub async fn snapshot(&self, chart_id: impl Into<String>) -> Option<Vec<f64>> {
        let (reply, rx) = oneshot::channel();
        self.send(ChartCommand::Snapshot {
            chart_id: chart_id.into(),
            reply,
        });
        rx.await.ok().flatten()
    }

    fn send(&self, command: ChartCommand) {
        if self.tx.send(command).is_err() {
            debug!("Chart batcher task is gone, dropping command");
        }
    }
}

struct RegisteredChart {
    handle: Box<dyn ChartHandle>,
    buffer: VecDeque<f64>,
}

impl RegisteredChart {
    fn push(&mut self, sample: f64, max_points: usize) {
        self.buffer.push_back(sample);
        while self.buffer.len() > max_points {
            self.buffer.pop_front();
        }
    }

    fn repaint(&mut self, mode: RedrawMode) {
        let values = self.buffer.make_contiguous();
        let labels: Vec<usize> = (0..values.len()).collect();
        self.handle.set_data(&labels, values);
        self.handle.redraw(mode);
    }
}

struct ChartBatchLoop {
    config: ChartConfig,
    frame: FrameTimer,
    charts: HashMap<String, RegisteredChart>,
    pending: Vec<(String, f64)>,
}

impl ChartBatchLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ChartCommand>) {
        loop {
            let deadline = self.frame.deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = next_frame(deadline) => self.flush(),
            }
        }
        self.flush();
        debug!("Chart batcher stopped");
    }

    fn handle(&mut self, command: ChartCommand) {
        match command {
            ChartCommand::Register { chart_id, handle } => {
                debug!(chart_id = %chart_id, "Chart registered");
                self.charts.insert(
                    chart_id,
                    RegisteredChart {
                        handle,
                        buffer: VecDeque::with_capacity(self.config.max_points),
                    },
                );
            }
            ChartCommand::Update { chart_id, sample } => {
                self.pending.push((chart_id, sample));
                self.frame.arm();
            }
            ChartCommand::Clear { chart_id } => {
                if let Some(chart) = self.charts.get_mut(&chart_id) {
                    chart.buffer.clear();
                }
            }
            ChartCommand::Flush { done } => {
                self.flush();
                let _ = done.send(());
            }
            ChartCommand::Snapshot { chart_id, reply } => {
                let buffer = self
                    .charts
                    .get(&chart_id)
                    .map(|chart| chart.buffer.iter().copied().collect());
                let _ = reply.send(buffer);
            }
        }
    }

    fn flush(&mut self) {
        self.frame.disarm();
        let updates = std::mem::take(&mut self.pending);
        if updates.is_empty() {
            return;
        }

        let count = updates.len();
        let mut touched: Vec<String> = Vec::new();
        for (chart_id, sample) in updates {
            let Some(chart) = self.charts.get_mut(&chart_id) else {
                debug!(chart_id = %chart_id, "Skipping update for unregistered chart");
                continue;
            };
            chart.push(sample, self.config.max_points);
            if !touched.contains(&chart_id) {
                touched.push(chart_id);
            }
        }

        let mode = if self.config.animate {
            RedrawMode::Animated
        } else {
            RedrawMode::Immediate
        };
        for chart_id in &touched {
            if let Some(chart) = self.charts.get_mut(chart_id) {
                chart.repaint(mode);
            }
        }

        debug!(
            updates = count,
            charts = touched.len(),
            "Flushed chart updates"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct ChartLog {
        labels: Vec<usize>,
        values: Vec<f64>,
        redraws: Vec<RedrawMode>,
    }

    #[derive(Clone, Default)]
    struct RecordingChart {
        log: Arc<Mutex<ChartLog>>,
    }

    impl RecordingChart {
        fn redraws(&self) -> Vec<RedrawMode> {
            self.log.lock().unwrap().redraws.clone()
        }

        fn values(&self) -> Vec<f64> {
            self.log.lock().unwrap().values.clone()
        }
    }

    impl ChartHandle for RecordingChart {
        fn set_data(&mut self, labels: &[usize], values: &[f64]) {
            let mut log = self.log.lock().unwrap();
            log.labels = labels.to_vec();
            log.values = values.to_vec();
        }

        fn redraw(&mut self, mode: RedrawMode) {
            self.log.lock().unwrap().redraws.push(mode);
        }
    }

    const PAST_FRAME: Duration = Duration::from_millis(50);

    #[tokio::test(start_paused = true)]
    async fn test_same_frame_updates_redraw_once() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        let chart = RecordingChart::default();
        batcher.register("bitrate", chart.clone());

        batcher.queue_update("bitrate", 1.0);
        batcher.queue_update("bitrate", 2.0);
        sleep(PAST_FRAME).await;

        assert_eq!(chart.redraws(), vec![RedrawMode::Immediate]);
        assert_eq!(chart.values(), vec![1.0, 2.0]);
        assert_eq!(chart.log.lock().unwrap().labels, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_in_separate_frames_redraw_separately() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        let chart = RecordingChart::default();
        batcher.register("latency", chart.clone());

        batcher.queue_update("latency", 1.0);
        sleep(PAST_FRAME).await;
        batcher.queue_update("latency", 2.0);
        sleep(PAST_FRAME).await;

        assert_eq!(chart.redraws().len(), 2);
        assert_eq!(chart.values(), vec![1.0, 2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_drawn_before_frame() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig {
            frame_interval: Duration::from_millis(100),
            ..ChartConfig::default()
        });
        let chart = RecordingChart::default();
        batcher.register("bitrate", chart.clone());

        batcher.queue_update("bitrate", 1.0);
        sleep(Duration::from_millis(50)).await;
        assert!(chart.redraws().is_empty());

        sleep(Duration::from_millis(60)).await;
        assert_eq!(chart.redraws().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_keeps_last_twenty_samples() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        let chart = RecordingChart::default();
        batcher.register("bitrate", chart.clone());

        for i in 1..=25 {
            batcher.queue_update("bitrate", i as f64);
        }
        batcher.flush().await;

        let expected: Vec<f64> = (6..=25).map(|i| i as f64).collect();
        assert_eq!(batcher.snapshot("bitrate").await, Some(expected.clone()));
        assert_eq!(chart.values(), expected);
        assert_eq!(chart.redraws().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_keeps_registration() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        batcher.register("bitrate", RecordingChart::default());
        batcher.queue_update("bitrate", 1.0);
        batcher.flush().await;

        batcher.clear("bitrate");
        assert_eq!(batcher.snapshot("bitrate").await, Some(vec![]));

        batcher.queue_update("bitrate", 7.0);
        batcher.flush().await;
        assert_eq!(batcher.snapshot("bitrate").await, Some(vec![7.0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_resets_buffer() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        let first = RecordingChart::default();
        let second = RecordingChart::default();

        batcher.register("bitrate", first.clone());
        batcher.queue_update("bitrate", 1.0);
        batcher.flush().await;

        batcher.register("bitrate", second.clone());
        assert_eq!(batcher.snapshot("bitrate").await, Some(vec![]));

        batcher.queue_update("bitrate", 2.0);
        batcher.flush().await;
        assert_eq!(second.values(), vec![2.0]);
        assert_eq!(first.redraws().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_chart_is_ignored() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        batcher.queue_update("missing", 1.0);
        batcher.flush().await;
        assert_eq!(batcher.snapshot("missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_chart_redrawn_once_per_flush() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig::default());
        let bitrate = RecordingChart::default();
        let latency = RecordingChart::default();
        batcher.register("bitrate", bitrate.clone());
        batcher.register("latency", latency.clone());

        batcher.queue_update("bitrate", 1.0);
        batcher.queue_update("latency", 10.0);
        batcher.queue_update("bitrate", 2.0);
        sleep(PAST_FRAME).await;

        assert_eq!(bitrate.redraws().len(), 1);
        assert_eq!(latency.redraws().len(), 1);
        assert_eq!(bitrate.values(), vec![1.0, 2.0]);
        assert_eq!(latency.values(), vec![10.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_animated_redraw_mode() {
        let batcher = ChartUpdateBatcher::spawn(ChartConfig {
            animate: true,
            ..ChartConfig::default()
        });
        let chart = RecordingChart::default();
        batcher.register("bitrate", chart.clone());
        batcher.queue_update("bitrate", 1.0);
        batcher.flush().await;

        assert_eq!(chart.redraws(), vec![RedrawMode::Animated]);
    }
}
