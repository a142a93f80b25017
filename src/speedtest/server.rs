use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::probe::{cache_busted, ProbeMethod, Prober};

/// Latency assigned to a candidate whose probe failed.
pub const PENALTY_LATENCY_MS: f64 = 999.0;
pub const SELECTION_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestServer {
    pub id: String,
    pub name: String,
    pub location: String,
    pub url: String,
    #[serde(default)]
    pub latency: Option<f64>,
}

impl TestServer {
    pub fn new(id: &str, name: &str, location: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            url: url.to_string(),
            latency: None,
        }
    }

    /// Stand-in used when no candidate is configured.
    pub fn placeholder() -> Self {
        Self::new("none", "Unavailable", "Unknown", "")
    }

    fn with_latency(&self, latency: f64) -> Self {
        Self {
            latency: Some(latency),
            ..self.clone()
        }
    }
}

pub struct ServerSelector<'a> {
    prober: &'a Prober,
    candidates: &'a [TestServer],
}

impl<'a> ServerSelector<'a> {
    pub fn new(prober: &'a Prober, candidates: &'a [TestServer]) -> Self {
        Self { prober, candidates }
    }

    /// Probe every candidate at once and keep the fastest.
    ///
    /// Failed candidates score [`PENALTY_LATENCY_MS`], so a server is always
    /// returned; ties go to the earlier candidate. With no candidates at all,
    /// a placeholder server carrying the penalty latency is returned.
    pub async fn select_best_server(&self) -> TestServer {
        let probes = self.candidates.iter().map(|server| async move {
            let url = cache_busted(&server.url);
            match self
                .prober
                .probe(ProbeMethod::Head, &url, None, SELECTION_DEADLINE)
                .await
            {
                Ok(elapsed) => elapsed.as_secs_f64() * 1000.0,
                Err(e) => {
                    tracing::debug!(server = %server.id, error = %e, "server probe failed");
                    PENALTY_LATENCY_MS
                }
            }
        });
        let latencies = join_all(probes).await;

        let mut best: Option<(usize, f64)> = None;
        for (i, latency) in latencies.iter().copied().enumerate() {
            if best.map_or(true, |(_, b)| latency < b) {
                best = Some((i, latency));
            }
        }

        match best {
            Some((i, latency)) => {
                let server = self.candidates[i].with_latency(latency);
                tracing::info!(server = %server.id, latency_ms = latency, "selected test server");
                server
            }
            None => {
                tracing::warn!("no candidate servers configured");
                TestServer::placeholder().with_latency(PENALTY_LATENCY_MS)
            }
        }
    }
}
