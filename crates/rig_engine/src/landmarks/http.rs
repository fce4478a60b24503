//! HTTP transport for the landmark detector
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /api/landmarks/detect` with `{"vertices": [[x, y, z], ...]}`
//! - `GET /api/status`, whose `detector_available` flag reports readiness

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LandmarkError, LandmarkService};
use crate::config::LandmarkServiceConfig;
use crate::scene::{DetectionMetadata, LandmarkSet};

/// Detection request body
#[derive(Debug, Serialize)]
pub struct DetectRequest<'a> {
    /// Mesh-local vertex positions
    pub vertices: &'a [[f32; 3]],
}

/// Detection response body
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    /// Whether detection succeeded
    pub success: bool,
    /// Human-readable status
    #[serde(default)]
    pub message: Option<String>,
    /// Present on success
    #[serde(default)]
    pub results: Option<DetectResults>,
}

/// Detection payload
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResults {
    /// Name to point; values are kept raw so bad entries can be skipped one by one
    pub landmarks: Map<String, Value>,
    /// Detector-specific details
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Status endpoint body
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    /// Whether the detector can take requests
    #[serde(default)]
    pub detector_available: bool,
}

impl DetectResponse {
    /// Turn a response into a landmark set
    pub fn into_landmarks(self) -> Result<LandmarkSet, LandmarkError> {
        if !self.success {
            return Err(LandmarkError::Service {
                status: None,
                message: self.message.unwrap_or_else(|| "detection failed".to_string()),
            });
        }
        let results = self
            .results
            .ok_or_else(|| LandmarkError::Malformed("success without results".to_string()))?;

        let set = LandmarkSet::from_json_map(&results.landmarks);
        Ok(match results.metadata.as_ref() {
            Some(metadata) => set.with_metadata(DetectionMetadata::from_json(metadata)),
            None => set,
        })
    }
}

/// Landmark service reached over HTTP
pub struct HttpLandmarkService {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpLandmarkService {
    /// Client for the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// Client from configuration
    pub fn from_config(config: &LandmarkServiceConfig) -> Self {
        Self::new(&config.base_url, Duration::from_millis(config.timeout_ms))
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert ureq error to LandmarkError
    fn convert_error(e: ureq::Error) -> LandmarkError {
        match e {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                let message = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or(body);
                LandmarkError::Service {
                    status: Some(code),
                    message,
                }
            }
            other => LandmarkError::Transport(other.to_string()),
        }
    }
}

impl LandmarkService for HttpLandmarkService {
    fn is_ready(&self) -> bool {
        let url = format!("{}/api/status", self.base_url);
        match self.agent.get(&url).call() {
            Ok(response) => response
                .into_json::<StatusResponse>()
                .map(|status| status.detector_available)
                .unwrap_or(false),
            Err(e) => {
                log::debug!("Landmark service not reachable: {}", e);
                false
            }
        }
    }

    fn detect(&self, vertices: &[[f32; 3]]) -> Result<LandmarkSet, LandmarkError> {
        if vertices.is_empty() {
            return Err(LandmarkError::EmptyRequest("no vertices".to_string()));
        }
        let url = format!("{}/api/landmarks/detect", self.base_url);
        log::info!("Requesting landmarks for {} vertices", vertices.len());

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(DetectRequest { vertices })
            .map_err(Self::convert_error)?;

        let body: DetectResponse = response
            .into_json()
            .map_err(|e| LandmarkError::Malformed(e.to_string()))?;
        body.into_landmarks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NOSE, TAIL_TIP};
    use serde_json::json;

    fn parse(value: Value) -> DetectResponse {
        serde_json::from_value(value).expect("response shape")
    }

    #[test]
    fn test_successful_response() {
        let response = parse(json!({
            "success": true,
            "message": "Landmark detection completed successfully",
            "results": {
                "landmarks": {
                    "nose": [0.0, 1.0, 4.0],
                    "tail_tip": [0.0, 0.5, -4.0],
                    "left_whiskers": [[1.0, 1.0, 4.0]],
                },
                "metadata": {"detection_method": "density_analysis", "vertex_count": 3},
            },
        }));
        let set = response.into_landmarks().expect("success");

        assert!(set.contains(NOSE) && set.contains(TAIL_TIP));
        assert_eq!(set.malformed(), &["left_whiskers".to_string()]);
        assert_eq!(set.metadata().and_then(|m| m.vertex_count), Some(3));
    }

    #[test]
    fn test_failed_response() {
        let response = parse(json!({
            "success": false,
            "message": "Landmark detection failed: bad shape",
            "error_type": "ValueError",
        }));
        assert_eq!(
            response.into_landmarks(),
            Err(LandmarkError::Service {
                status: None,
                message: "Landmark detection failed: bad shape".to_string(),
            })
        );
    }

    #[test]
    fn test_request_body_shape() {
        let vertices = [[1.0_f32, 2.0, 3.0]];
        let body = serde_json::to_value(DetectRequest { vertices: &vertices }).expect("serializable");
        assert_eq!(body, json!({"vertices": [[1.0, 2.0, 3.0]]}));
    }

    #[test]
    fn test_base_url_trimmed() {
        let service = HttpLandmarkService::new("http://localhost:8000/", Duration::from_secs(1));
        assert_eq!(service.base_url(), "http://localhost:8000");
    }
}
