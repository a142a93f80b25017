use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinSet;

use super::measurement::{round1, EstimateReason, Sample};
use super::probe::{cache_busted, ProbeMethod, Prober};
use super::progress::RunRecorder;
use super::TestPhase;
use crate::error::ProbeFailure;

pub const PACKET_LOSS_PROBES: usize = 50;
pub const PACKET_LOSS_DEADLINE: Duration = Duration::from_millis(1500);
pub const FALLBACK_LOSS_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacketLossResult {
    /// Lost share of `sent`, one decimal.
    pub percentage: f64,
    pub sent: u32,
    pub received: u32,
}

impl PacketLossResult {
    /// Build from counts; `received` is capped at `sent`.
    pub fn from_counts(sent: u32, received: u32) -> Self {
        let received = received.min(sent);
        let percentage = if sent == 0 {
            0.0
        } else {
            round1(100.0 * f64::from(sent - received) / f64::from(sent))
        };
        Self {
            percentage,
            sent,
            received,
        }
    }

    /// The fixed answer used when the batch itself could not run.
    ///
    /// No probe was counted, so `sent` and `received` are both zero; 5 % of
    /// a 50-probe batch has no whole-number count.
    pub fn fallback() -> Self {
        Self {
            percentage: FALLBACK_LOSS_PERCENT,
            sent: 0,
            received: 0,
        }
    }

    /// Whether the counts come from a real batch.
    pub fn has_counts(&self) -> bool {
        self.sent > 0
    }
}

pub struct PacketLossEstimator<'a> {
    prober: &'a Prober,
    urls: &'a [String],
}

impl<'a> PacketLossEstimator<'a> {
    pub fn new(prober: &'a Prober, urls: &'a [String]) -> Self {
        Self { prober, urls }
    }

    /// Fire the whole batch at once and count the answers as they land.
    pub async fn measure_packet_loss(
        &self,
        recorder: &mut RunRecorder<'_>,
    ) -> Sample<PacketLossResult> {
        if self.urls.is_empty() {
            return Self::fallback("no packet loss endpoints".to_string());
        }

        let mut batch = JoinSet::new();
        for i in 0..PACKET_LOSS_PROBES {
            let prober = self.prober.clone();
            let url = cache_busted(&self.urls[i % self.urls.len()]);
            batch.spawn(async move {
                prober
                    .probe(ProbeMethod::Head, &url, None, PACKET_LOSS_DEADLINE)
                    .await
            });
        }

        let mut completed = 0usize;
        let mut received = 0u32;
        let mut cancelled = false;
        let mut broken: Option<String> = None;
        while let Some(joined) = batch.join_next().await {
            completed += 1;
            match joined {
                Ok(Ok(_)) => received += 1,
                Ok(Err(ProbeFailure::Cancelled)) => cancelled = true,
                Ok(Err(e)) => tracing::debug!(error = %e, "loss probe unanswered"),
                Err(e) => broken = Some(e.to_string()),
            }
            recorder.progress(
                TestPhase::PacketLoss,
                (completed * 100) as f64 / PACKET_LOSS_PROBES as f64,
                0.0,
            );
        }

        if let Some(cause) = broken {
            return Self::fallback(cause);
        }
        if cancelled {
            return Sample::estimated(
                PacketLossResult::fallback(),
                EstimateReason::from(&ProbeFailure::Cancelled),
            );
        }

        let result = PacketLossResult::from_counts(PACKET_LOSS_PROBES as u32, received);
        tracing::info!(
            sent = result.sent,
            received = result.received,
            loss = result.percentage,
            "packet loss measured"
        );
        Sample::measured(result)
    }

    fn fallback(cause: String) -> Sample<PacketLossResult> {
        tracing::warn!(%cause, "packet loss batch failed, using fallback");
        Sample::estimated(
            PacketLossResult::fallback(),
            EstimateReason::MechanismFailed(cause),
        )
    }
}
