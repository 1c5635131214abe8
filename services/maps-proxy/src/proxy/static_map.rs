use axum::body::Body;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::form_urlencoded;

use super::ErrorCode;
use crate::auth::{CredentialError, ResolvedCredential};

pub const STATIC_MAP_PATH: &str = "map/static";
pub const STATIC_MAP_API_VERSION: &str = "2024-04-01";
pub const STATIC_MAP_TILESET: &str = "microsoft.base.road";

pub const ZOOM_RANGE: (u8, u8) = (1, 20);
pub const WIDTH_RANGE: (u32, u32) = (240, 1280);
pub const HEIGHT_RANGE: (u32, u32) = (160, 960);

const DEFAULT_ZOOM: u8 = 12;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 400;

/// Upstream error bodies are cut to this many characters before being echoed
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Raw query of the static-map endpoint. Everything arrives as text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticMapQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub zoom: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticMapRequest {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

/// Upstream image, streamed through as it arrives.
pub struct StaticMapImage {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: Body,
}

impl fmt::Debug for StaticMapImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMapImage")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StaticMapError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(&'static str),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Static map request failed (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Static map request failed: {0}")]
    Transport(String),
}

impl StaticMapError {
    pub fn status(&self) -> StatusCode {
        match self {
            StaticMapError::InvalidCoordinates(_) => StatusCode::BAD_REQUEST,
            StaticMapError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StaticMapError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            StaticMapError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            StaticMapError::InvalidCoordinates(_) | StaticMapError::Upstream { .. } => None,
            StaticMapError::Credential(CredentialError::MissingMapsClientId) => {
                Some(ErrorCode::MissingMapsClientId)
            }
            StaticMapError::Credential(CredentialError::Token(e)) if e.is_missing_prerequisite() => {
                Some(ErrorCode::MissingCredentials)
            }
            StaticMapError::Credential(CredentialError::Token(_)) => Some(ErrorCode::TokenError),
            StaticMapError::Transport(_) => Some(ErrorCode::RequestFailed),
        }
    }
}

impl StaticMapQuery {
    pub fn validate(&self) -> Result<StaticMapRequest, StaticMapError> {
        let lat = parse_number(self.lat.as_deref())
            .filter(|lat| (-90.0..=90.0).contains(lat))
            .ok_or(StaticMapError::InvalidCoordinates(
                "lat must be a number between -90 and 90",
            ))?;
        let lon = parse_number(self.lon.as_deref())
            .filter(|lon| (-180.0..=180.0).contains(lon))
            .ok_or(StaticMapError::InvalidCoordinates(
                "lon must be a number between -180 and 180",
            ))?;

        let zoom = clamp_or(self.zoom.as_deref(), ZOOM_RANGE.0 as f64, ZOOM_RANGE.1 as f64)
            .map_or(DEFAULT_ZOOM, |z| z as u8);
        let width = clamp_or(self.width.as_deref(), WIDTH_RANGE.0 as f64, WIDTH_RANGE.1 as f64)
            .map_or(DEFAULT_WIDTH, |w| w as u32);
        let height = clamp_or(
            self.height.as_deref(),
            HEIGHT_RANGE.0 as f64,
            HEIGHT_RANGE.1 as f64,
        )
        .map_or(DEFAULT_HEIGHT, |h| h as u32);

        Ok(StaticMapRequest {
            lat,
            lon,
            zoom,
            width,
            height,
        })
    }
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Rounds and clamps a numeric parameter; `None` when absent or not a number.
fn clamp_or(value: Option<&str>, min: f64, max: f64) -> Option<f64> {
    parse_number(value).map(|v| v.round().clamp(min, max))
}

impl StaticMapRequest {
    pub fn url(&self, base_url: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("api-version", STATIC_MAP_API_VERSION)
            .append_pair("tilesetId", STATIC_MAP_TILESET)
            .append_pair("zoom", &self.zoom.to_string())
            .append_pair("center", &format!("{},{}", self.lon, self.lat))
            .append_pair("width", &self.width.to_string())
            .append_pair("height", &self.height.to_string())
            .finish();
        format!("{}/{}?{}", base_url, STATIC_MAP_PATH, query)
    }

    #[instrument(skip(self, client, credential), fields(zoom = self.zoom, width = self.width, height = self.height))]
    pub async fn fetch(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        credential: &ResolvedCredential,
        timeout: Duration,
    ) -> Result<StaticMapImage, StaticMapError> {
        let url = self.url(base_url);
        let start = std::time::Instant::now();

        let response = credential
            .apply(client.get(&url))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| StaticMapError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            warn!(status = status.as_u16(), "Static map upstream returned error");
            return Err(StaticMapError::Upstream {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        let content_length = response.content_length();

        info!(
            latency_ms = start.elapsed().as_millis(),
            content_length = content_length,
            content_type = %content_type,
            "Static map streaming"
        );

        Ok(StaticMapImage {
            content_type,
            content_length,
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query(lat: &str, lon: &str) -> StaticMapQuery {
        StaticMapQuery {
            lat: Some(lat.to_string()),
            lon: Some(lon.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_applied() {
        let request = query("47.6", "-122.3").validate().unwrap();
        assert_eq!(request.zoom, DEFAULT_ZOOM);
        assert_eq!(request.width, DEFAULT_WIDTH);
        assert_eq!(request.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn test_dimensions_clamped() {
        let mut q = query("0", "0");
        q.zoom = Some("42".into());
        q.width = Some("10".into());
        q.height = Some("99999".into());
        let request = q.validate().unwrap();
        assert_eq!(request.zoom, 20);
        assert_eq!(request.width, 240);
        assert_eq!(request.height, 960);

        q.zoom = Some("-3".into());
        q.width = Some("5000".into());
        q.height = Some("1".into());
        let request = q.validate().unwrap();
        assert_eq!(request.zoom, 1);
        assert_eq!(request.width, 1280);
        assert_eq!(request.height, 160);

        q.zoom = Some("abc".into());
        q.width = Some("NaN".into());
        let request = q.validate().unwrap();
        assert_eq!(request.zoom, DEFAULT_ZOOM);
        assert_eq!(request.width, DEFAULT_WIDTH);
    }

    #[test]
    fn test_coordinates_required() {
        assert!(matches!(
            StaticMapQuery::default().validate(),
            Err(StaticMapError::InvalidCoordinates(_))
        ));
        assert!(query("91", "0").validate().is_err());
        assert!(query("0", "-181").validate().is_err());
        assert!(query("north", "0").validate().is_err());
    }

    #[test]
    fn test_url_layout() {
        let request = query("47.6", "-122.3").validate().unwrap();
        let url = request.url("https://atlas.microsoft.com");
        assert!(url.starts_with("https://atlas.microsoft.com/map/static?api-version=2024-04-01"));
        assert!(url.contains("center=-122.3%2C47.6"));
        assert!(url.contains("tilesetId=microsoft.base.road"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            StaticMapError::InvalidCoordinates("x").status(),
            StatusCode::BAD_REQUEST
        );
        let missing = StaticMapError::Credential(CredentialError::Token(TokenError::MissingTenantId));
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(missing.error_code(), Some(ErrorCode::MissingCredentials));
        assert_eq!(
            StaticMapError::Upstream {
                status: 403,
                message: String::new()
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            StaticMapError::Transport("reset".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_fetch_returns_image_bytes() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/map/static"))
            .and(query_param("zoom", "12"))
            .and(header("subscription-key", "k"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
            )
            .expect(1)
            .mount(&upstream)
            .await;

        let image = query("47.6", "-122.3")
            .validate()
            .unwrap()
            .fetch(
                &reqwest::Client::new(),
                &upstream.uri(),
                &ResolvedCredential::Key {
                    value: "k".to_string(),
                },
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.content_length, Some(4));
        let bytes = axum::body::to_bytes(image.body, usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_fetch_surfaces_upstream_errors() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&upstream)
            .await;

        let err = query("47.6", "-122.3")
            .validate()
            .unwrap()
            .fetch(
                &reqwest::Client::new(),
                &upstream.uri(),
                &ResolvedCredential::Key {
                    value: "k".to_string(),
                },
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StaticMapError::Upstream { status: 401, .. }));
    }
}
