//! Network speed test core: latency, jitter, throughput, packet loss and
//! bufferbloat over HTTP, with every reported number tagged as measured or
//! estimated.

pub mod error;
pub mod settings;
pub mod speedtest;

pub use error::{ProbeFailure, SpeedTestError};
pub use settings::{Endpoints, TestConfig};
pub use speedtest::measurement::{EstimateReason, Sample};
pub use speedtest::probe::{HttpProbeClient, ProbeClient, ProbeMethod};
pub use speedtest::progress::{GraphDataPoint, ProgressSink, TestProgress};
pub use speedtest::runner::SpeedTest;
pub use speedtest::{SpeedTestResult, TestPhase};
