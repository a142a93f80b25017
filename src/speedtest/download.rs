use std::time::Duration;
use tokio::time::Instant;

use super::probe::{cache_busted, Prober};
use super::progress::RunRecorder;
use super::TestPhase;
use crate::error::ProbeFailure;

/// Minimum gap between two rate samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
/// Failed requests one connection tolerates before giving up.
const MAX_ATTEMPTS: usize = 2;

/// One download connection.
///
/// Keeps fetching bodies from the pool, starting at `index`, until the
/// deadline. Bytes received before a timeout or a broken stream still count.
/// Only the connection holding `reporter` publishes progress and graph points.
pub(crate) async fn download_task(
    prober: &Prober,
    urls: &[String],
    index: usize,
    deadline: Duration,
    mut reporter: Option<&mut RunRecorder<'_>>,
) -> Result<f64, ProbeFailure> {
    if urls.is_empty() {
        return Err(ProbeFailure::Transport("no download endpoints".to_string()));
    }

    let start = Instant::now();
    let mut received: u64 = 0;
    let mut last_sample = start;
    let mut failures = 0;
    let mut last_error = ProbeFailure::Timeout;
    let mut next = index;

    loop {
        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() || prober.is_cancelled() {
            break;
        }
        let url = cache_busted(&urls[next % urls.len()]);
        next += 1;

        let before = received;
        let mut on_chunk = |n: usize| {
            received += n as u64;
            let now = Instant::now();
            if now.duration_since(last_sample) < SAMPLE_INTERVAL {
                return;
            }
            last_sample = now;
            let elapsed = now.duration_since(start).as_secs_f64();
            let mbps = received as f64 * 8.0 / elapsed / 1_000_000.0;
            if let Some(recorder) = reporter.as_deref_mut() {
                recorder.graph_point(TestPhase::Download, mbps, None);
                recorder.progress(
                    TestPhase::Download,
                    elapsed / deadline.as_secs_f64() * 100.0,
                    mbps,
                );
            }
        };

        match prober.stream(&url, remaining, &mut on_chunk).await {
            Ok(0) => {
                failures += 1;
                last_error = ProbeFailure::Decode("empty response body".to_string());
            }
            Ok(_) => {}
            Err(ProbeFailure::Timeout) => {
                last_error = ProbeFailure::Timeout;
                break;
            }
            Err(e) => {
                tracing::debug!(connection = index, error = %e, "download request failed");
                let got_bytes = received > before;
                last_error = e;
                if !got_bytes {
                    failures += 1;
                }
            }
        }

        if failures >= MAX_ATTEMPTS {
            break;
        }
    }

    if received == 0 {
        return Err(last_error);
    }
    let elapsed = start.elapsed().as_secs_f64();
    Ok(received as f64 * 8.0 / elapsed / 1_000_000.0)
}
