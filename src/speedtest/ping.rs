use std::ops::Range;
use std::time::Duration;

use super::measurement::{aggregate_tag, mean, round1, synthesize, EstimateReason, Sample};
use super::probe::{cache_busted, ProbeMethod, Prober};
use super::progress::RunRecorder;
use super::TestPhase;
use crate::error::ProbeFailure;

pub const QUICK_PING_COUNT: usize = 3;
pub const PING_COUNT: usize = 5;
pub const PING_DEADLINE: Duration = Duration::from_secs(2);
const PING_INTERVAL: Duration = Duration::from_millis(200);

/// Range a failed latency probe is filled from, in ms.
pub const FALLBACK_PING_MS: Range<f64> = 15.0..45.0;
/// Range jitter is drawn from when there are too few samples, in ms.
pub const FALLBACK_JITTER_MS: Range<f64> = 1.0..5.0;

pub struct LatencyMeter<'a> {
    prober: &'a Prober,
    url: &'a str,
}

#[derive(Debug, Clone)]
pub struct LatencySummary {
    /// One entry per probe, in order; failed probes are Estimated.
    pub samples: Vec<Sample<f64>>,
    /// Mean of `samples`, rounded to one decimal.
    pub average: Sample<f64>,
}

impl LatencySummary {
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(Sample::get).collect()
    }
}

impl<'a> LatencyMeter<'a> {
    pub fn new(prober: &'a Prober, url: &'a str) -> Self {
        Self { prober, url }
    }

    /// One HEAD round trip in milliseconds.
    pub async fn probe_once(&self) -> Result<f64, ProbeFailure> {
        let url = cache_busted(self.url);
        let elapsed = self
            .prober
            .probe(ProbeMethod::Head, &url, None, PING_DEADLINE)
            .await?;
        Ok(elapsed.as_secs_f64() * 1000.0)
    }

    /// Run `count` sequential probes; a failed probe keeps its slot with a
    /// synthesized value so the sample count is always `count`.
    ///
    /// With a recorder, each probe reports progress and a graph point for the
    /// ping phase.
    pub async fn measure_latency(
        &self,
        count: usize,
        mut recorder: Option<&mut RunRecorder<'_>>,
    ) -> LatencySummary {
        let count = count.max(1);
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let sample = match self.probe_once().await {
                Ok(ms) => Sample::measured(ms),
                Err(e) => {
                    tracing::debug!(error = %e, probe = i, "latency probe failed");
                    Sample::estimated(synthesize(FALLBACK_PING_MS), EstimateReason::from(&e))
                }
            };

            if let Some(recorder) = recorder.as_deref_mut() {
                recorder.graph_point(TestPhase::Ping, 0.0, Some(sample.get()));
                recorder.progress(TestPhase::Ping, ((i + 1) * 100) as f64 / count as f64, 0.0);
            }
            samples.push(sample);

            if i + 1 < count {
                self.prober.pause(PING_INTERVAL).await;
            }
        }

        let values: Vec<f64> = samples.iter().map(Sample::get).collect();
        let avg = round1(mean(&values).unwrap_or(0.0));
        let average = aggregate_tag(avg, &samples);
        if !average.is_measured() {
            tracing::warn!(reason = ?average.reason(), "latency average includes estimates");
        }
        LatencySummary { samples, average }
    }
}

/// Mean absolute difference between consecutive samples.
///
/// Fewer than two samples yields an Estimated value from
/// [`FALLBACK_JITTER_MS`].
pub fn measure_jitter(samples: &[f64]) -> Sample<f64> {
    if samples.len() < 2 {
        return Sample::estimated(
            synthesize(FALLBACK_JITTER_MS),
            EstimateReason::InsufficientSamples(samples.len()),
        );
    }
    let diffs: Vec<f64> = samples.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    Sample::measured(mean(&diffs).unwrap_or(0.0))
}
