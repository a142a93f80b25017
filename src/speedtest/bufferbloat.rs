//! Latency under load.

use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::time::Duration;

use super::measurement::{mean, round1, synthesize_rounded, EstimateReason, Sample};
use super::ping::LatencyMeter;
use super::probe::{cache_busted, Prober};
use super::progress::RunRecorder;
use super::TestPhase;
use crate::error::ProbeFailure;
use crate::settings::TestConfig;

pub const LOADED_PROBES: usize = 5;
/// Background downloads kept in flight while probing.
pub const LOAD_STREAMS: usize = 3;
const LOAD_DEADLINE: Duration = Duration::from_secs(20);
const LOAD_WARMUP: Duration = Duration::from_millis(500);
const PROBE_INTERVAL: Duration = Duration::from_millis(200);
/// Consecutive empty or failed requests after which a load stream stops.
const MAX_LOAD_FAILURES: usize = 3;
const LOAD_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Latency increase drawn for the fallback result, in ms.
pub const FALLBACK_INCREASE_MS: Range<f64> = 20.0..70.0;

/// Grade for how much latency grows under load; A is best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BufferbloatRating {
    A,
    B,
    C,
    D,
    F,
}

impl BufferbloatRating {
    pub fn from_increase(latency_increase_ms: f64) -> Self {
        match latency_increase_ms {
            x if x < 20.0 => BufferbloatRating::A,
            x if x < 50.0 => BufferbloatRating::B,
            x if x < 100.0 => BufferbloatRating::C,
            x if x < 200.0 => BufferbloatRating::D,
            _ => BufferbloatRating::F,
        }
    }
}

impl fmt::Display for BufferbloatRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            BufferbloatRating::A => "A",
            BufferbloatRating::B => "B",
            BufferbloatRating::C => "C",
            BufferbloatRating::D => "D",
            BufferbloatRating::F => "F",
        };
        f.write_str(letter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferbloatResult {
    pub rating: BufferbloatRating,
    /// Loaded minus idle latency, never negative, one decimal.
    pub latency_increase: f64,
}

impl BufferbloatResult {
    pub fn from_latencies(baseline_ping: f64, loaded_ping: f64) -> Self {
        let increase = (loaded_ping - baseline_ping).max(0.0);
        Self {
            rating: BufferbloatRating::from_increase(increase),
            latency_increase: round1(increase),
        }
    }

    pub fn fallback() -> Self {
        Self {
            rating: BufferbloatRating::B,
            latency_increase: synthesize_rounded(FALLBACK_INCREASE_MS),
        }
    }
}

pub struct BufferbloatAnalyzer<'a> {
    prober: &'a Prober,
    config: &'a TestConfig,
    ping_url: &'a str,
    load_urls: &'a [String],
}

impl<'a> BufferbloatAnalyzer<'a> {
    pub fn new(
        prober: &'a Prober,
        config: &'a TestConfig,
        ping_url: &'a str,
        load_urls: &'a [String],
    ) -> Self {
        Self {
            prober,
            config,
            ping_url,
            load_urls,
        }
    }

    /// Probe latency while background downloads saturate the link and
    /// compare against `baseline_ping`.
    pub async fn measure_bufferbloat(
        &self,
        baseline_ping: f64,
        recorder: &mut RunRecorder<'_>,
    ) -> Sample<BufferbloatResult> {
        if !self.config.enable_bufferbloat {
            return Sample::estimated(
                BufferbloatResult {
                    rating: BufferbloatRating::A,
                    latency_increase: 0.0,
                },
                EstimateReason::Skipped,
            );
        }

        let load_prober = self.prober.child();
        let load = async {
            let streams = (0..LOAD_STREAMS).map(|i| load_stream(&load_prober, self.load_urls, i));
            join_all(streams).await.into_iter().sum::<u64>()
        };

        let probes = async {
            self.prober.pause(LOAD_WARMUP).await;
            let meter = LatencyMeter::new(self.prober, self.ping_url);
            let mut loaded = Vec::with_capacity(LOADED_PROBES);
            for i in 0..LOADED_PROBES {
                match meter.probe_once().await {
                    Ok(ms) => {
                        recorder.graph_point(TestPhase::Bufferbloat, 0.0, Some(ms));
                        loaded.push(ms);
                    }
                    Err(e) => tracing::debug!(error = %e, probe = i, "loaded latency probe failed"),
                }
                recorder.progress(
                    TestPhase::Bufferbloat,
                    ((i + 1) * 100) as f64 / LOADED_PROBES as f64,
                    0.0,
                );
                if i + 1 < LOADED_PROBES {
                    self.prober.pause(PROBE_INTERVAL).await;
                }
            }
            load_prober.cancel_token().cancel();
            loaded
        };

        let (load_bytes, loaded) = tokio::join!(load, probes);
        tracing::debug!(load_bytes, probes = loaded.len(), "bufferbloat load settled");

        let Some(loaded_ping) = mean(&loaded) else {
            tracing::warn!("no latency probe succeeded under load, using fallback rating");
            let reason = "no latency probe succeeded under load".to_string();
            return Sample::estimated(
                BufferbloatResult::fallback(),
                EstimateReason::MechanismFailed(reason),
            );
        };

        let result = BufferbloatResult::from_latencies(baseline_ping, loaded_ping);
        tracing::info!(
            baseline_ping,
            loaded_ping,
            rating = %result.rating,
            "bufferbloat measured"
        );
        if loaded.len() < LOADED_PROBES {
            Sample::estimated(
                result,
                EstimateReason::PartialFailure {
                    failed: LOADED_PROBES - loaded.len(),
                    total: LOADED_PROBES,
                },
            )
        } else {
            Sample::measured(result)
        }
    }
}

/// Keep one download running until `prober` is cancelled.
///
/// Finished bodies are replaced with a fresh request so the link stays
/// saturated for as long as the loaded probes run.
async fn load_stream(prober: &Prober, urls: &[String], index: usize) -> u64 {
    if urls.is_empty() {
        return 0;
    }
    let mut bytes = 0u64;
    let mut failures = 0;
    let mut next = index;
    while !prober.is_cancelled() && failures < MAX_LOAD_FAILURES {
        let url = cache_busted(&urls[next % urls.len()]);
        next += 1;
        let before = bytes;
        let outcome = prober
            .stream(&url, LOAD_DEADLINE, &mut |n: usize| bytes += n as u64)
            .await;
        match outcome {
            Ok(_) if bytes > before => failures = 0,
            Ok(_) | Err(ProbeFailure::Timeout) => failures += 1,
            Err(ProbeFailure::Cancelled) => break,
            Err(e) => {
                tracing::debug!(stream = index, error = %e, "load request failed");
                failures += 1;
                // Failing endpoints must not spin the loop.
                prober.pause(LOAD_RETRY_PAUSE).await;
            }
        }
    }
    bytes
}
