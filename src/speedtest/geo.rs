//! Where the user appears to be, per a public IP lookup service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SpeedTestError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLocation {
    pub city: String,
    pub country: String,
    pub ip: String,
}

impl UserLocation {
    /// Shown when the lookup fails or times out.
    pub fn placeholder() -> Self {
        Self {
            city: "Your City".to_string(),
            country: "Your Country".to_string(),
            ip: "127.0.0.1".to_string(),
        }
    }
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self) -> Result<UserLocation, SpeedTestError>;
}

/// Response from ipinfo.io-style JSON endpoints.
#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    ip: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

/// Looks the caller up through an ipinfo.io-compatible endpoint.
pub struct IpInfoLocator {
    client: reqwest::Client,
    url: String,
}

impl IpInfoLocator {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl GeoLocator for IpInfoLocator {
    async fn locate(&self) -> Result<UserLocation, SpeedTestError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SpeedTestError::Geolocation(e.to_string()))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "geolocation lookup rejected");
            return Err(SpeedTestError::Geolocation(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let info: IpInfoResponse = response
            .json()
            .await
            .map_err(|e| SpeedTestError::Geolocation(e.to_string()))?;
        Ok(info.into_location())
    }
}

impl IpInfoResponse {
    fn into_location(self) -> UserLocation {
        let fallback = UserLocation::placeholder();
        UserLocation {
            city: self.city.unwrap_or(fallback.city),
            country: self.country.unwrap_or(fallback.country),
            ip: self.ip.unwrap_or(fallback.ip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_response_fills_missing_fields() {
        let info: IpInfoResponse =
            serde_json::from_str(r#"{"ip":"203.0.113.7","city":"Lisbon","region":"Lisbon"}"#)
                .unwrap();
        let location = info.into_location();
        assert_eq!(location.city, "Lisbon");
        assert_eq!(location.country, "Your Country");
        assert_eq!(location.ip, "203.0.113.7");
    }
}
