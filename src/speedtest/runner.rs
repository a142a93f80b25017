//! Sequences one full run and assembles the final report.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::bufferbloat::{BufferbloatAnalyzer, BufferbloatResult};
use super::geo::{GeoLocator, IpInfoLocator, UserLocation};
use super::measurement::{aggregate_tag, round1, synthesize_rounded, EstimateReason, Sample};
use super::packet_loss::{PacketLossEstimator, PacketLossResult};
use super::ping::{
    measure_jitter, LatencyMeter, LatencySummary, FALLBACK_JITTER_MS, FALLBACK_PING_MS,
    PING_COUNT, QUICK_PING_COUNT,
};
use super::probe::{HttpProbeClient, ProbeClient, Prober};
use super::progress::{NoopSink, ProgressSink, RunRecorder};
use super::server::{ServerSelector, TestServer};
use super::throughput::{ThroughputMeasurer, FALLBACK_DOWNLOAD_MBPS, FALLBACK_UPLOAD_MBPS};
use super::{SpeedTestResult, TestPhase};
use crate::error::SpeedTestError;
use crate::settings::{Endpoints, TestConfig};

pub const GEOLOCATION_DEADLINE: Duration = Duration::from_secs(2);

/// Entry point for the enclosing application.
///
/// One `SpeedTest` may serve many runs; each run gets a fresh cancellation
/// token and a fresh graph buffer. `abort()` only affects the run in flight.
pub struct SpeedTest {
    config: TestConfig,
    endpoints: Endpoints,
    client: Arc<dyn ProbeClient>,
    locator: Arc<dyn GeoLocator>,
    sink: Arc<dyn ProgressSink>,
    cancel: Mutex<RunToken>,
}

/// Cancellation state shared by `abort` and the run in flight.
#[derive(Default)]
struct RunToken {
    token: CancellationToken,
    /// Installed by `prepare_run` and not yet taken by a run.
    prepared: bool,
}

impl SpeedTest {
    pub fn new(
        config: TestConfig,
        endpoints: Endpoints,
        client: Arc<dyn ProbeClient>,
        locator: Arc<dyn GeoLocator>,
    ) -> Self {
        Self {
            config: config.normalized(),
            endpoints,
            client,
            locator,
            sink: Arc::new(NoopSink),
            cancel: Mutex::new(RunToken::default()),
        }
    }

    /// Real HTTP probing against the default public endpoints.
    pub fn with_defaults(config: TestConfig) -> Result<Self, SpeedTestError> {
        let endpoints = Endpoints::default();
        let http = HttpProbeClient::new()?;
        let locator = IpInfoLocator::new(http.client().clone(), endpoints.geolocation.clone());
        Ok(Self::new(config, endpoints, Arc::new(http), Arc::new(locator)))
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Cancel the run in flight. Extra calls, or calls with no run in
    /// flight, do nothing.
    pub fn abort(&self) {
        let state = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.token.is_cancelled() {
            tracing::info!("speed test abort requested");
            state.token.cancel();
        }
    }

    /// Install the token for the next run before that run is polled.
    ///
    /// Callers that spawn `run_speed_test` call this first, so an `abort`
    /// issued before the task starts still stops that run.
    pub fn prepare_run(&self) {
        let mut state = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        state.token = CancellationToken::new();
        state.prepared = true;
    }

    /// Token for a starting run: the prepared one, or a fresh one.
    fn take_run_token(&self) -> CancellationToken {
        let mut state = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if !std::mem::take(&mut state.prepared) {
            state.token = CancellationToken::new();
        }
        state.token.clone()
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    /// Short latency check against the best server, without a full run.
    pub async fn quick_ping(&self) -> LatencySummary {
        let prober = Prober::new(self.client.clone(), self.current_token());
        let server = ServerSelector::new(&prober, &self.endpoints.servers)
            .select_best_server()
            .await;
        LatencyMeter::new(&prober, &server.url)
            .measure_latency(QUICK_PING_COUNT, None)
            .await
    }

    /// Run every phase and return the report.
    ///
    /// Always yields a result: component failures are folded into Estimated
    /// values, and a panic anywhere in the pipeline produces a fully
    /// synthesized report. The final progress event is `complete` at 100.
    pub async fn run_speed_test(&self) -> SpeedTestResult {
        let prober = Prober::new(self.client.clone(), self.take_run_token());
        let mut recorder = RunRecorder::new(self.sink.as_ref());
        recorder.progress(TestPhase::Idle, 0.0, 0.0);

        let outcome = AssertUnwindSafe(self.run_phases(&prober, &mut recorder))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let err = SpeedTestError::Panicked(panic_message(payload.as_ref()));
                tracing::error!(error = %err, "speed test pipeline failed, reporting estimates");
                self.synthesized_result(&err, recorder.elapsed_secs())
            }
        };

        recorder.progress(TestPhase::Complete, 100.0, 0.0);
        tracing::debug!(points = recorder.graph().len(), "graph buffer closed");
        tracing::info!(
            id = %result.id,
            download = result.download_speed.get(),
            upload = result.upload_speed.get(),
            ping = result.ping.get(),
            estimated = ?result.estimated_fields(),
            "speed test complete"
        );
        result
    }

    async fn run_phases(
        &self,
        prober: &Prober,
        recorder: &mut RunRecorder<'_>,
    ) -> SpeedTestResult {
        recorder.progress(TestPhase::Ping, 0.0, 0.0);
        let server = ServerSelector::new(prober, &self.endpoints.servers)
            .select_best_server()
            .await;

        let latency = LatencyMeter::new(prober, &server.url)
            .measure_latency(PING_COUNT, Some(&mut *recorder))
            .await;
        let jitter = jitter_for(&latency);

        let throughput = ThroughputMeasurer::new(
            prober,
            &self.config,
            &self.endpoints.download,
            &self.endpoints.upload,
        );
        recorder.progress(TestPhase::Download, 0.0, 0.0);
        let download = throughput.measure_download(recorder).await;
        recorder.progress(TestPhase::Upload, 0.0, 0.0);
        let upload = throughput.measure_upload(recorder).await;

        recorder.progress(TestPhase::PacketLoss, 0.0, 0.0);
        let packet_loss = PacketLossEstimator::new(prober, &self.endpoints.packet_loss)
            .measure_packet_loss(recorder)
            .await;

        let bufferbloat = if self.config.enable_bufferbloat {
            recorder.progress(TestPhase::Bufferbloat, 0.0, 0.0);
            let analyzer = BufferbloatAnalyzer::new(
                prober,
                &self.config,
                &server.url,
                &self.endpoints.download,
            );
            Some(
                analyzer
                    .measure_bufferbloat(latency.average.get(), recorder)
                    .await,
            )
        } else {
            None
        };

        let user_location = self.locate(prober.cancel_token()).await;

        SpeedTestResult {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            download_speed: download.speed,
            upload_speed: upload.speed,
            ping: latency.average,
            jitter,
            server_location: server.location,
            user_location,
            test_duration: round1(recorder.elapsed_secs()),
            bufferbloat,
            packet_loss: Some(packet_loss),
        }
    }

    async fn locate(&self, cancel: &CancellationToken) -> Sample<UserLocation> {
        let lookup = tokio::time::timeout(GEOLOCATION_DEADLINE, self.locator.locate());
        let failure = tokio::select! {
            biased;
            _ = cancel.cancelled() => EstimateReason::ProbeFailed("test aborted".to_string()),
            outcome = lookup => match outcome {
                Ok(Ok(location)) => return Sample::measured(location),
                Ok(Err(e)) => EstimateReason::ProbeFailed(e.to_string()),
                Err(_) => EstimateReason::ProbeFailed("deadline exceeded".to_string()),
            },
        };
        tracing::warn!(reason = %failure, "geolocation unavailable, using placeholder");
        Sample::estimated(UserLocation::placeholder(), failure)
    }

    /// Report used when the pipeline itself broke; every field is Estimated.
    fn synthesized_result(&self, err: &SpeedTestError, elapsed: f64) -> SpeedTestResult {
        let reason = || EstimateReason::PipelineFailed(err.to_string());
        let estimate = |range| Sample::estimated(synthesize_rounded(range), reason());
        let server_location = self
            .endpoints
            .servers
            .first()
            .map_or_else(|| TestServer::placeholder().location, |s| s.location.clone());

        SpeedTestResult {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            download_speed: estimate(FALLBACK_DOWNLOAD_MBPS),
            upload_speed: estimate(FALLBACK_UPLOAD_MBPS),
            ping: estimate(FALLBACK_PING_MS),
            jitter: estimate(FALLBACK_JITTER_MS),
            server_location,
            user_location: Sample::estimated(UserLocation::placeholder(), reason()),
            test_duration: round1(elapsed),
            bufferbloat: self
                .config
                .enable_bufferbloat
                .then(|| Sample::estimated(BufferbloatResult::fallback(), reason())),
            packet_loss: Some(Sample::estimated(PacketLossResult::fallback(), reason())),
        }
    }
}

/// Jitter over the ping samples, Estimated whenever any sample was.
fn jitter_for(latency: &LatencySummary) -> Sample<f64> {
    let jitter = measure_jitter(&latency.values());
    if jitter.is_measured() {
        aggregate_tag(jitter.get(), &latency.samples).rounded()
    } else {
        jitter.rounded()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
