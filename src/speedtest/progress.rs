//! Progress events and the run-scoped graph buffer.

use serde::Serialize;
use tokio::time::Instant;

use super::TestPhase;

/// A transient snapshot of where the run is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestProgress {
    pub phase: TestPhase,
    /// Percent of the current phase, 0-100.
    pub progress: f64,
    /// Mbps; 0 when the phase has no rate.
    pub current_speed: f64,
    /// Seconds since the run started.
    pub elapsed_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraphDataPoint {
    /// Milliseconds since the run started.
    pub time: f64,
    /// Mbps.
    pub speed: f64,
    pub phase: TestPhase,
    pub ping: Option<f64>,
}

/// Receives run updates. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: TestProgress);

    /// Called with the whole accumulated sequence on every append.
    fn on_graph_update(&self, points: &[GraphDataPoint]);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _progress: TestProgress) {}
    fn on_graph_update(&self, _points: &[GraphDataPoint]) {}
}

/// Owns the per-run graph buffer and forwards updates to the sink.
///
/// Only one holder can write at a time: components receive it as
/// `&mut RunRecorder`, and throughput phases hand it to connection 0 alone.
pub struct RunRecorder<'a> {
    sink: &'a dyn ProgressSink,
    graph: Vec<GraphDataPoint>,
    started: Instant,
}

impl<'a> RunRecorder<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            graph: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn progress(&mut self, phase: TestPhase, progress: f64, current_speed: f64) {
        let event = TestProgress {
            phase,
            progress: if progress.is_finite() {
                progress.clamp(0.0, 100.0)
            } else {
                0.0
            },
            current_speed: if current_speed.is_finite() {
                current_speed.max(0.0)
            } else {
                0.0
            },
            elapsed_time: self.elapsed_secs(),
        };
        self.sink.on_progress(event);
    }

    /// Append a point and rebroadcast the whole sequence.
    pub fn graph_point(&mut self, phase: TestPhase, speed: f64, ping: Option<f64>) {
        let now = self.started.elapsed().as_secs_f64() * 1000.0;
        let time = self.graph.last().map_or(now, |last| now.max(last.time));
        self.graph.push(GraphDataPoint {
            time,
            speed: if speed.is_finite() { speed.max(0.0) } else { 0.0 },
            phase,
            ping,
        });
        self.sink.on_graph_update(&self.graph);
    }

    pub fn graph(&self) -> &[GraphDataPoint] {
        &self.graph
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps everything it receives.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub progress: Mutex<Vec<TestProgress>>,
        pub graph_lengths: Mutex<Vec<usize>>,
        pub last_graph: Mutex<Vec<GraphDataPoint>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, progress: TestProgress) {
            self.progress.lock().unwrap().push(progress);
        }

        fn on_graph_update(&self, points: &[GraphDataPoint]) {
            self.graph_lengths.lock().unwrap().push(points.len());
            *self.last_graph.lock().unwrap() = points.to_vec();
        }
    }

    #[test]
    fn progress_is_clamped_at_the_sink() {
        let sink = RecordingSink::default();
        let mut recorder = RunRecorder::new(&sink);
        recorder.progress(TestPhase::Ping, 140.0, -3.0);
        recorder.progress(TestPhase::Ping, -5.0, f64::NAN);

        let events = sink.progress.lock().unwrap();
        assert_eq!(events[0].progress, 100.0);
        assert_eq!(events[0].current_speed, 0.0);
        assert_eq!(events[1].progress, 0.0);
        assert_eq!(events[1].current_speed, 0.0);
    }

    #[test]
    fn graph_updates_rebroadcast_full_sequence() {
        let sink = RecordingSink::default();
        let mut recorder = RunRecorder::new(&sink);
        recorder.graph_point(TestPhase::Download, 10.0, None);
        recorder.graph_point(TestPhase::Download, 20.0, None);
        recorder.graph_point(TestPhase::Download, 30.0, None);

        assert_eq!(*sink.graph_lengths.lock().unwrap(), vec![1, 2, 3]);
        let graph = sink.last_graph.lock().unwrap();
        assert!(graph.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(recorder.graph().len(), 3);
    }
}
