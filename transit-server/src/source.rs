//! Upstream positions source.
//!
//! `PositionSource` is the seam the tracker polls through; `VasttrafikClient`
//! is the production implementation against the Västtrafik positions API
//! (OAuth2 client credentials, token cached until shortly before expiry).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use transit_core::{BoundingBox, RawObservation};

const TOKEN_URL: &str = "https://ext-api.vasttrafik.se/token";
const POSITIONS_URL: &str = "https://ext-api.vasttrafik.se/pr/v4/positions";
const POSITIONS_LIMIT: u32 = 200;

/// Tokens are refreshed this long before the upstream says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(30);

/// Upper bound on a single token or positions request, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    Status(u16),
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Anything that can produce a snapshot of vehicle positions.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn list_vehicles(
        &self,
        area: &BoundingBox,
        lines: &[String],
    ) -> Result<Vec<RawObservation>, SourceError>;
}

// ---------------------------------------------------------------------------
// Västtrafik client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

pub struct VasttrafikClient {
    http: reqwest::Client,
    credentials: Credentials,
    token_url: String,
    positions_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl VasttrafikClient {
    pub fn new(credentials: Credentials) -> Result<Self, SourceError> {
        VasttrafikClient::with_urls(credentials, TOKEN_URL, POSITIONS_URL, REQUEST_TIMEOUT)
    }

    /// Client against non-default endpoints.
    pub fn with_urls(
        credentials: Credentials,
        token_url: &str,
        positions_url: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(VasttrafikClient {
            http,
            credentials,
            token_url: token_url.to_string(),
            positions_url: positions_url.to_string(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SourceError::Auth(format!(
                "token endpoint returned {}",
                resp.status().as_u16()
            )));
        }

        let body: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some(AccessToken {
            value: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }
}

/// Query string for a positions request.
fn positions_query(area: &BoundingBox, lines: &[String]) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("lowerLeftLat", format!("{:.6}", area.lower_left.lat)),
        ("lowerLeftLong", format!("{:.6}", area.lower_left.long)),
        ("upperRightLat", format!("{:.6}", area.upper_right.lat)),
        ("upperRightLong", format!("{:.6}", area.upper_right.long)),
        ("limit", POSITIONS_LIMIT.to_string()),
    ];
    query.extend(lines.iter().map(|l| ("lineDesignations", l.clone())));
    query
}

#[async_trait]
impl PositionSource for VasttrafikClient {
    async fn list_vehicles(
        &self,
        area: &BoundingBox,
        lines: &[String],
    ) -> Result<Vec<RawObservation>, SourceError> {
        let token = self.access_token().await?;

        let resp = self
            .http
            .get(&self.positions_url)
            .bearer_auth(token)
            .query(&positions_query(area, lines))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.forget_token().await;
        }
        if status != reqwest::StatusCode::OK {
            return Err(SourceError::Status(status.as_u16()));
        }

        Ok(resp.json().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use transit_core::geo::GOTEBORG;

    #[test]
    fn test_positions_query() {
        let area = BoundingBox::around(GOTEBORG, 30.0);
        let lines = vec!["6".to_string(), "11".to_string()];
        let query = positions_query(&area, &lines);

        assert_eq!(query.len(), 7);
        assert_eq!(query[0].0, "lowerLeftLat");
        assert_eq!(query[4], ("limit", "200".to_string()));
        let designations: Vec<_> = query
            .iter()
            .filter(|(k, _)| *k == "lineDesignations")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(designations, vec!["6", "11"]);
    }

    #[test]
    fn test_decode_positions_payload() {
        let body = r##"[
            {"name": "6", "direction": "Länsmansgården", "latitude": 57.70, "longitude": 11.97,
             "detailsReference": "abc",
             "line": {"name": "6", "transportMode": "tram", "backgroundColor": "#f39200",
                      "foregroundColor": "#ffffff", "borderColor": "#f39200", "isWheelchairAccessible": true}}
        ]"##;
        let vehicles: Vec<RawObservation> = serde_json::from_str(body).unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].line.transport_mode, "tram");
        assert_eq!(vehicles[0].direction, "Länsmansgården");
    }

    #[test]
    fn test_token_response_default_expiry() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(token.access_token, "t");
        assert_eq!(token.expires_in, 300);
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_error() {
        let client = VasttrafikClient::with_urls(
            credentials(),
            "http://127.0.0.1:1/token",
            "http://127.0.0.1:1/positions",
            REQUEST_TIMEOUT,
        )
        .unwrap();
        let result = client.list_vehicles(&BoundingBox::default(), &[]).await;
        assert!(matches!(result, Err(SourceError::Http(_))));
    }

    #[tokio::test]
    async fn test_stalled_upstream_times_out() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = VasttrafikClient::with_urls(
            credentials(),
            &format!("http://{addr}/token"),
            &format!("http://{addr}/positions"),
            Duration::from_millis(200),
        )
        .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.list_vehicles(&BoundingBox::default(), &[]),
        )
        .await
        .expect("request should give up on its own");
        match result {
            Err(SourceError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
