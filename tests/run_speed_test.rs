use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netscore::speedtest::bufferbloat::BufferbloatRating;
use netscore::speedtest::geo::{GeoLocator, UserLocation};
use netscore::speedtest::server::TestServer;
use netscore::{
    Endpoints, GraphDataPoint, ProbeClient, ProbeFailure, ProbeMethod, ProgressSink, SpeedTest,
    SpeedTestError, TestConfig, TestPhase, TestProgress,
};

const PING_HOST: &str = "https://edge.test/ping";
const DOWN_HOST: &str = "https://edge.test/down";
const UP_HOST: &str = "https://edge.test/up";
const LOSS_HOST: &str = "https://edge.test/loss";

/// A simulated link: 20 ms idle latency, 15 ms extra per active download,
/// 10 Mbps per download stream, and every tenth loss probe dropped.
struct SimulatedLink {
    active_downloads: Arc<AtomicUsize>,
    loss_probes: AtomicUsize,
    /// 100 ms chunks per download body.
    body_chunks: usize,
}

impl SimulatedLink {
    fn with_body_chunks(body_chunks: usize) -> Self {
        Self {
            active_downloads: Arc::new(AtomicUsize::new(0)),
            loss_probes: AtomicUsize::new(0),
            body_chunks,
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::with_body_chunks(1_000)
    }
}

struct ActiveDownload(Arc<AtomicUsize>);

impl Drop for ActiveDownload {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProbeClient for SimulatedLink {
    async fn send(
        &self,
        _method: ProbeMethod,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(), ProbeFailure> {
        if url.starts_with(LOSS_HOST) {
            if self.loss_probes.fetch_add(1, Ordering::SeqCst) % 10 == 9 {
                futures::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        } else if url.starts_with(UP_HOST) {
            // 1 MiB in half a second is about 16.8 Mbps.
            assert!(body.is_some());
            tokio::time::sleep(Duration::from_millis(500)).await;
        } else if url.starts_with(PING_HOST) {
            let load = self.active_downloads.load(Ordering::SeqCst) as u64;
            tokio::time::sleep(Duration::from_millis(20 + 15 * load)).await;
        } else {
            return Err(ProbeFailure::HttpStatus(404));
        }
        Ok(())
    }

    async fn stream(
        &self,
        url: &str,
        on_chunk: &mut (dyn FnMut(usize) + Send),
    ) -> Result<u64, ProbeFailure> {
        if !url.starts_with(DOWN_HOST) {
            return Err(ProbeFailure::HttpStatus(404));
        }
        self.active_downloads.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveDownload(self.active_downloads.clone());
        let mut total = 0u64;
        for _ in 0..self.body_chunks {
            tokio::time::sleep(Duration::from_millis(100)).await;
            on_chunk(125_000);
            total += 125_000;
        }
        Ok(total)
    }
}

struct Locator(Result<UserLocation, String>);

#[async_trait]
impl GeoLocator for Locator {
    async fn locate(&self) -> Result<UserLocation, SpeedTestError> {
        self.0.clone().map_err(SpeedTestError::Geolocation)
    }
}

struct SlowLocator;

#[async_trait]
impl GeoLocator for SlowLocator {
    async fn locate(&self) -> Result<UserLocation, SpeedTestError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(UserLocation::placeholder())
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<TestProgress>>,
    graph: Mutex<Vec<GraphDataPoint>>,
}

impl Recorder {
    fn saw_phase(&self, phase: TestPhase) -> bool {
        self.events.lock().unwrap().iter().any(|e| e.phase == phase)
    }
}

impl ProgressSink for Recorder {
    fn on_progress(&self, progress: TestProgress) {
        self.events.lock().unwrap().push(progress);
    }

    fn on_graph_update(&self, points: &[GraphDataPoint]) {
        *self.graph.lock().unwrap() = points.to_vec();
    }
}

fn endpoints() -> Endpoints {
    Endpoints {
        servers: vec![
            TestServer::new("dead", "Dead", "Nowhere", "https://dead.test/"),
            TestServer::new("edge", "Edge", "Amsterdam", PING_HOST),
        ],
        download: vec![format!("{DOWN_HOST}/a"), format!("{DOWN_HOST}/b")],
        upload: vec![UP_HOST.to_string()],
        packet_loss: vec![LOSS_HOST.to_string()],
        geolocation: "https://geo.test/".to_string(),
    }
}

fn amsterdam() -> UserLocation {
    UserLocation {
        city: "Amsterdam".to_string(),
        country: "NL".to_string(),
        ip: "192.0.2.10".to_string(),
    }
}

fn speed_test(
    config: TestConfig,
    locator: impl GeoLocator + 'static,
) -> (Arc<SpeedTest>, Arc<Recorder>) {
    speed_test_on(SimulatedLink::default(), config, locator)
}

fn speed_test_on(
    link: SimulatedLink,
    config: TestConfig,
    locator: impl GeoLocator + 'static,
) -> (Arc<SpeedTest>, Arc<Recorder>) {
    let sink = Arc::new(Recorder::default());
    let test = SpeedTest::new(config, endpoints(), Arc::new(link), Arc::new(locator))
        .with_sink(sink.clone());
    (Arc::new(test), sink)
}

#[tokio::test(start_paused = true)]
async fn full_run_reports_every_metric() {
    let config = TestConfig {
        duration_secs: 3,
        parallel_connections: 2,
        enable_bufferbloat: true,
        enable_stress_test: false,
    };
    let (test, sink) = speed_test(config, Locator(Ok(amsterdam())));

    let result = test.run_speed_test().await;

    assert!(result.is_fully_measured(), "{:?}", result.estimated_fields());
    assert_eq!(result.server_location, "Amsterdam");
    assert_eq!(result.ping.get(), 20.0);
    assert_eq!(result.jitter.get(), 0.0);
    assert!((9.0..=10.1).contains(&result.download_speed.get()));
    assert_eq!(result.upload_speed.get(), 16.8);
    assert_eq!(result.user_location.value(), &amsterdam());

    let loss = result.packet_loss.as_ref().unwrap().value();
    assert!(loss.received <= loss.sent);
    assert_eq!(loss.sent, 50);
    assert_eq!(loss.received, 45);
    assert_eq!(loss.percentage, 10.0);

    // Three load streams add 45 ms over the 20 ms idle latency.
    let bloat = result.bufferbloat.as_ref().unwrap().value();
    assert_eq!(bloat.latency_increase, 45.0);
    assert_eq!(bloat.rating, BufferbloatRating::B);

    let events = sink.events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.phase, TestPhase::Complete);
    assert_eq!(last.progress, 100.0);
    assert_eq!(
        events.iter().filter(|e| e.phase == TestPhase::Complete).count(),
        1
    );
    assert!(events.iter().all(|e| (0.0..=100.0).contains(&e.progress)));

    let graph = sink.graph.lock().unwrap();
    assert!(graph.iter().any(|p| p.phase == TestPhase::Download));
    assert!(graph.iter().any(|p| p.phase == TestPhase::Bufferbloat));
    for pair in graph.windows(2) {
        if pair[0].phase == pair[1].phase {
            assert!(pair[0].time <= pair[1].time);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn bufferbloat_load_outlasts_short_bodies() {
    // Each body ends after 300 ms, well before the loaded probes finish.
    let config = TestConfig {
        duration_secs: 1,
        parallel_connections: 1,
        enable_bufferbloat: true,
        enable_stress_test: false,
    };
    let (test, _) = speed_test_on(
        SimulatedLink::with_body_chunks(3),
        config,
        Locator(Ok(amsterdam())),
    );

    let result = test.run_speed_test().await;

    let bloat = result.bufferbloat.as_ref().unwrap();
    assert!(bloat.is_measured());
    assert_eq!(bloat.value().latency_increase, 45.0);
    assert_eq!(bloat.value().rating, BufferbloatRating::B);
}

#[tokio::test(start_paused = true)]
async fn phases_run_in_order() {
    let config = TestConfig {
        duration_secs: 1,
        parallel_connections: 1,
        enable_bufferbloat: true,
        enable_stress_test: false,
    };
    let (test, sink) = speed_test(config, Locator(Ok(amsterdam())));
    test.run_speed_test().await;

    let mut phases: Vec<TestPhase> = Vec::new();
    for event in sink.events.lock().unwrap().iter() {
        if phases.last() != Some(&event.phase) {
            phases.push(event.phase);
        }
    }
    assert_eq!(
        phases,
        vec![
            TestPhase::Idle,
            TestPhase::Ping,
            TestPhase::Download,
            TestPhase::Upload,
            TestPhase::PacketLoss,
            TestPhase::Bufferbloat,
            TestPhase::Complete,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn abort_during_download_settles_before_deadline() {
    let config = TestConfig {
        duration_secs: 30,
        parallel_connections: 4,
        enable_bufferbloat: false,
        enable_stress_test: false,
    };
    let (test, sink) = speed_test(config, Locator(Ok(amsterdam())));
    let started = tokio::time::Instant::now();

    let run = tokio::spawn({
        let test = test.clone();
        async move { test.run_speed_test().await }
    });
    while !sink.saw_phase(TestPhase::Download) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    test.abort();
    test.abort();

    let result = run.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    // Bytes that arrived before the abort still count.
    assert!(result.download_speed.is_measured());
    assert!(result.download_speed.get() > 0.0);
    assert!(!result.upload_speed.is_measured());
    assert!(!result.packet_loss.as_ref().unwrap().is_measured());
    assert_eq!(result.user_location.value(), &UserLocation::placeholder());
    assert!(result.bufferbloat.is_none());

    let events = sink.events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.phase, TestPhase::Complete);
    assert_eq!(last.progress, 100.0);
}

#[tokio::test(start_paused = true)]
async fn slow_geolocation_falls_back_to_placeholder() {
    let config = TestConfig {
        duration_secs: 1,
        parallel_connections: 1,
        enable_bufferbloat: false,
        enable_stress_test: false,
    };
    let (test, _) = speed_test(config, SlowLocator);

    let result = test.run_speed_test().await;

    assert!(!result.user_location.is_measured());
    assert_eq!(result.user_location.value(), &UserLocation::placeholder());
    assert_eq!(result.estimated_fields(), vec!["user_location"]);
}

#[tokio::test(start_paused = true)]
async fn unreachable_network_still_produces_a_report() {
    let config = TestConfig {
        duration_secs: 2,
        parallel_connections: 2,
        enable_bufferbloat: true,
        enable_stress_test: false,
    };
    let sink = Arc::new(Recorder::default());
    let test = SpeedTest::new(
        config,
        Endpoints {
            servers: vec![TestServer::new("dead", "Dead", "Nowhere", "https://dead.test/")],
            download: vec!["https://dead.test/down".to_string()],
            upload: vec!["https://dead.test/up".to_string()],
            packet_loss: vec!["https://dead.test/loss".to_string()],
            geolocation: "https://dead.test/geo".to_string(),
        },
        Arc::new(SimulatedLink::default()),
        Arc::new(Locator(Err("offline".to_string()))),
    )
    .with_sink(sink.clone());

    let result = test.run_speed_test().await;

    assert!(!result.is_fully_measured());
    assert!(!result.ping.is_measured());
    assert!(!result.download_speed.is_measured());
    assert!((50.0..=150.0).contains(&result.download_speed.get()));
    assert!(!result.upload_speed.is_measured());
    assert!((10.0..=50.0).contains(&result.upload_speed.get()));
    let loss = result.packet_loss.as_ref().unwrap().value();
    assert_eq!(loss.sent, 50);
    assert!(loss.received <= loss.sent);
    assert!(!result.bufferbloat.as_ref().unwrap().is_measured());

    let last = *sink.events.lock().unwrap().last().unwrap();
    assert_eq!(last.phase, TestPhase::Complete);
    assert_eq!(last.progress, 100.0);
}

#[test]
fn result_serializes_with_source_tags() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap();
    let config = TestConfig {
        duration_secs: 1,
        parallel_connections: 1,
        enable_bufferbloat: false,
        enable_stress_test: false,
    };
    let (test, _) = speed_test(config, Locator(Err("offline".to_string())));
    let result = runtime.block_on(test.run_speed_test());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["ping"]["source"], "measured");
    assert_eq!(json["user_location"]["source"], "estimated");
    assert!(json["bufferbloat"].is_null());
    assert_eq!(json["packet_loss"]["value"]["sent"], 50);
}
