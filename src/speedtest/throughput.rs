//! Parallel download and upload measurement.

use futures::future::join_all;
use serde::Serialize;
use std::ops::Range;

use super::download::download_task;
use super::measurement::{
    aggregate_tag, mean, round1, synthesize, synthesize_rounded, EstimateReason, Sample,
};
use super::probe::{cache_busted, Prober};
use super::progress::RunRecorder;
use super::upload::{random_payload, upload_task, UPLOAD_PAYLOAD_BYTES};
use super::TestPhase;
use crate::error::ProbeFailure;
use crate::settings::TestConfig;

/// Plausible per-connection rates used when a connection fails, in Mbps.
pub const FALLBACK_DOWNLOAD_MBPS: Range<f64> = 50.0..150.0;
pub const FALLBACK_UPLOAD_MBPS: Range<f64> = 10.0..50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn phase(self) -> TestPhase {
        match self {
            Direction::Download => TestPhase::Download,
            Direction::Upload => TestPhase::Upload,
        }
    }

    pub fn fallback_range(self) -> Range<f64> {
        match self {
            Direction::Download => FALLBACK_DOWNLOAD_MBPS,
            Direction::Upload => FALLBACK_UPLOAD_MBPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputResult {
    pub direction: Direction,
    /// Mean of the usable per-connection rates, one decimal.
    pub speed: Sample<f64>,
    /// Per-connection rates in connection order; failed connections are
    /// Estimated, and connections with no usable rate are absent.
    pub connections: Vec<Sample<f64>>,
}

pub struct ThroughputMeasurer<'a> {
    prober: &'a Prober,
    config: &'a TestConfig,
    download_urls: &'a [String],
    upload_urls: &'a [String],
}

impl<'a> ThroughputMeasurer<'a> {
    pub fn new(
        prober: &'a Prober,
        config: &'a TestConfig,
        download_urls: &'a [String],
        upload_urls: &'a [String],
    ) -> Self {
        Self {
            prober,
            config,
            download_urls,
            upload_urls,
        }
    }

    pub async fn measure_download(&self, recorder: &mut RunRecorder<'_>) -> ThroughputResult {
        self.measure(Direction::Download, recorder).await
    }

    pub async fn measure_upload(&self, recorder: &mut RunRecorder<'_>) -> ThroughputResult {
        self.measure(Direction::Upload, recorder).await
    }

    /// Run `parallel_connections` transfers at once and wait for all of them.
    ///
    /// Connection 0 alone reports progress. A failed connection contributes
    /// a synthesized rate; if every connection fails the phase reports one
    /// synthesized aggregate instead.
    async fn measure(
        &self,
        direction: Direction,
        recorder: &mut RunRecorder<'_>,
    ) -> ThroughputResult {
        let connections = self.config.parallel_connections.max(1);
        let deadline = self.config.duration();
        tracing::info!(?direction, connections, ?deadline, "throughput phase started");

        let mut slot = Some(&mut *recorder);
        let tasks = (0..connections).map(|i| {
            let reporter = if i == 0 { slot.take() } else { None };
            async move {
                match direction {
                    Direction::Upload => {
                        if self.upload_urls.is_empty() {
                            let reason = "no upload endpoints".to_string();
                            return Err(ProbeFailure::Transport(reason));
                        }
                        let url = cache_busted(&self.upload_urls[i % self.upload_urls.len()]);
                        let payload = random_payload(UPLOAD_PAYLOAD_BYTES);
                        upload_task(self.prober, &url, payload, deadline, reporter).await
                    }
                    Direction::Download => {
                        download_task(self.prober, self.download_urls, i, deadline, reporter).await
                    }
                }
            }
        });
        let outcomes = join_all(tasks).await;

        let result = aggregate(direction, outcomes);
        recorder.progress(direction.phase(), 100.0, result.speed.get());
        tracing::info!(
            ?direction,
            speed = result.speed.get(),
            measured = result.speed.is_measured(),
            "throughput phase finished"
        );
        result
    }
}

/// Combine per-connection outcomes into the phase result.
pub(crate) fn aggregate(
    direction: Direction,
    outcomes: Vec<Result<f64, ProbeFailure>>,
) -> ThroughputResult {
    if outcomes.iter().all(Result::is_err) {
        tracing::warn!(?direction, "every connection failed, using an estimated speed");
        let estimate = Sample::estimated(
            synthesize_rounded(direction.fallback_range()),
            EstimateReason::AllFailed,
        );
        return ThroughputResult {
            direction,
            speed: estimate.clone(),
            connections: vec![estimate],
        };
    }

    let connections: Vec<Sample<f64>> = outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            Ok(rate) if rate.is_finite() && rate > 0.0 => Some(Sample::measured(rate)),
            Ok(_) => None,
            Err(e) => Some(Sample::estimated(
                synthesize(direction.fallback_range()),
                EstimateReason::from(&e),
            )),
        })
        .collect();

    let speed = match mean(&connections.iter().map(Sample::get).collect::<Vec<_>>()) {
        Some(avg) => aggregate_tag(round1(avg), &connections),
        None => Sample::estimated(
            synthesize_rounded(direction.fallback_range()),
            EstimateReason::InsufficientSamples(0),
        ),
    };

    ThroughputResult {
        direction,
        speed,
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::probe::tests::{prober, Behavior, ScriptedClient};
    use crate::speedtest::progress::tests::RecordingSink;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn aggregate_averages_valid_rates() {
        let result = aggregate(Direction::Download, vec![Ok(100.0), Ok(50.0), Ok(0.0)]);
        assert!(result.speed.is_measured());
        assert_eq!(result.speed.get(), 75.0);
        assert_eq!(result.connections.len(), 2);
    }

    #[test]
    fn aggregate_fills_failed_connections() {
        let result = aggregate(
            Direction::Upload,
            vec![Ok(20.0), Err(ProbeFailure::Timeout), Ok(30.0)],
        );
        assert_eq!(result.connections.len(), 3);
        assert!(FALLBACK_UPLOAD_MBPS.contains(&result.connections[1].get()));
        assert_eq!(
            result.speed.reason(),
            Some(&EstimateReason::PartialFailure { failed: 1, total: 3 })
        );
    }

    #[test]
    fn aggregate_all_failed_is_single_estimate() {
        let result = aggregate(
            Direction::Download,
            vec![Err(ProbeFailure::Timeout), Err(ProbeFailure::HttpStatus(502))],
        );
        assert_eq!(result.speed.reason(), Some(&EstimateReason::AllFailed));
        assert_eq!(result.connections.len(), 1);
        assert!((50.0..=150.0).contains(&result.speed.get()));
    }

    fn config(connections: usize, duration_secs: u64) -> TestConfig {
        TestConfig {
            duration_secs,
            parallel_connections: connections,
            ..TestConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn download_runs_all_connections_round_robin() {
        let (prober, client) = prober(ScriptedClient::new(Behavior::Stream {
            chunks: 10,
            size: 125_000,
            every: Duration::from_millis(100),
        }));
        let config = config(4, 1);
        let downloads = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let sink = RecordingSink::default();
        let mut recorder = RunRecorder::new(&sink);

        let result = ThroughputMeasurer::new(&prober, &config, &downloads, &[])
            .measure_download(&mut recorder)
            .await;

        assert_eq!(result.connections.len(), 4);
        assert!(result.speed.is_measured());
        assert!(client.call_count("https://a.example") >= 2);
        assert!(client.call_count("https://b.example") >= 2);
        let last = *sink.progress.lock().unwrap().last().unwrap();
        assert_eq!(last.progress, 100.0);
        assert_eq!(last.phase, TestPhase::Download);
    }

    #[tokio::test(start_paused = true)]
    async fn each_upload_connection_sends_its_own_payload() {
        let (prober, client) =
            prober(ScriptedClient::new(Behavior::Respond(Duration::from_millis(200))));
        let config = config(3, 2);
        let uploads = vec!["https://up.example".to_string()];
        let sink = RecordingSink::default();
        let mut recorder = RunRecorder::new(&sink);

        let result = ThroughputMeasurer::new(&prober, &config, &[], &uploads)
            .measure_upload(&mut recorder)
            .await;

        assert!(result.speed.is_measured());
        let bodies = client.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|b| b.len() == UPLOAD_PAYLOAD_BYTES));
        assert_ne!(bodies[0], bodies[1]);
        assert_ne!(bodies[1], bodies[2]);
        assert_ne!(bodies[0].as_ptr(), bodies[1].as_ptr());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_without_endpoints_is_estimated() {
        let (prober, _) = prober(ScriptedClient::new(Behavior::Respond(Duration::from_millis(10))));
        let config = config(2, 1);
        let sink = RecordingSink::default();
        let mut recorder = RunRecorder::new(&sink);
        let result = ThroughputMeasurer::new(&prober, &config, &[], &[])
            .measure_upload(&mut recorder)
            .await;
        assert_eq!(result.speed.reason(), Some(&EstimateReason::AllFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_settles_download_before_deadline() {
        let (prober, _) = prober(ScriptedClient::new(Behavior::Hang));
        let config = config(3, 30);
        let downloads = vec!["https://a.example".to_string()];
        let sink = RecordingSink::default();
        let mut recorder = RunRecorder::new(&sink);

        let token = prober.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        });

        let start = Instant::now();
        let result = ThroughputMeasurer::new(&prober, &config, &downloads, &[])
            .measure_download(&mut recorder)
            .await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!result.speed.is_measured());
    }
}
