use bytes::Bytes;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::probe::{ProbeMethod, Prober};
use super::progress::RunRecorder;
use super::TestPhase;
use crate::error::ProbeFailure;

pub const UPLOAD_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Incompressible payload for one upload connection.
pub fn random_payload(size: usize) -> Bytes {
    let mut rng = rand::rngs::StdRng::from_entropy();
    let data: Vec<u8> = (0..size).map(|_| rng.gen()).collect();
    Bytes::from(data)
}

/// One upload connection: POST the payload once and time it.
pub(crate) async fn upload_task(
    prober: &Prober,
    url: &str,
    payload: Bytes,
    deadline: Duration,
    reporter: Option<&mut RunRecorder<'_>>,
) -> Result<f64, ProbeFailure> {
    let size = payload.len();
    let elapsed = prober
        .probe(ProbeMethod::Post, url, Some(payload), deadline)
        .await?;

    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return Err(ProbeFailure::Decode("upload finished without elapsed time".to_string()));
    }
    let mbps = size as f64 * 8.0 / secs / 1_000_000.0;

    if let Some(recorder) = reporter {
        recorder.graph_point(TestPhase::Upload, mbps, None);
        recorder.progress(
            TestPhase::Upload,
            secs / deadline.as_secs_f64() * 100.0,
            mbps,
        );
    }
    Ok(mbps)
}
