pub mod bufferbloat;
pub mod download;
pub mod geo;
pub mod measurement;
pub mod packet_loss;
pub mod ping;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod server;
pub mod throughput;
pub mod upload;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use bufferbloat::BufferbloatResult;
use geo::UserLocation;
use measurement::Sample;
use packet_loss::PacketLossResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Idle,
    Ping,
    Download,
    Upload,
    Bufferbloat,
    PacketLoss,
    Complete,
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TestPhase::Idle => "idle",
            TestPhase::Ping => "ping",
            TestPhase::Download => "download",
            TestPhase::Upload => "upload",
            TestPhase::Bufferbloat => "bufferbloat",
            TestPhase::PacketLoss => "packet loss",
            TestPhase::Complete => "complete",
        };
        f.write_str(label)
    }
}

/// Final snapshot of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedTestResult {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Mbps.
    pub download_speed: Sample<f64>,
    /// Mbps.
    pub upload_speed: Sample<f64>,
    /// ms.
    pub ping: Sample<f64>,
    /// ms.
    pub jitter: Sample<f64>,
    pub server_location: String,
    pub user_location: Sample<UserLocation>,
    /// Seconds the whole run took.
    pub test_duration: f64,
    pub bufferbloat: Option<Sample<BufferbloatResult>>,
    pub packet_loss: Option<Sample<PacketLossResult>>,
}

impl SpeedTestResult {
    /// Names of the fields whose values were synthesized.
    pub fn estimated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let scalars = [
            ("download_speed", self.download_speed.is_measured()),
            ("upload_speed", self.upload_speed.is_measured()),
            ("ping", self.ping.is_measured()),
            ("jitter", self.jitter.is_measured()),
            ("user_location", self.user_location.is_measured()),
        ];
        for (name, measured) in scalars {
            if !measured {
                fields.push(name);
            }
        }
        if matches!(&self.bufferbloat, Some(b) if !b.is_measured()) {
            fields.push("bufferbloat");
        }
        if matches!(&self.packet_loss, Some(p) if !p.is_measured()) {
            fields.push("packet_loss");
        }
        fields
    }

    pub fn is_fully_measured(&self) -> bool {
        self.estimated_fields().is_empty()
    }
}
