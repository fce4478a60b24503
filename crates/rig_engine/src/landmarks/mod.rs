//! Landmark detection service access
//!
//! The detector itself is remote. This module defines what the engine needs
//! from it ([`LandmarkService`]), an HTTP implementation, a fixed-result
//! implementation for offline use, and [`LandmarkClient`], which holds
//! requests back until the service reports ready.

mod client;
mod http;

pub use client::{LandmarkClient, LandmarkRequest};
pub use http::{DetectRequest, DetectResponse, DetectResults, HttpLandmarkService, StatusResponse};

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scene::LandmarkSet;

/// Landmark detection errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    /// Request never reached the service or the response never came back
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service answered with a failure
    #[error("Service error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Service {
        /// HTTP status, if the failure came with one
        status: Option<u16>,
        /// Message reported by the service
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Nothing to detect on
    #[error("Empty request: {0}")]
    EmptyRequest(String),
}

/// Black-box landmark detector
///
/// `detect` receives mesh-local vertex positions and returns named points in
/// the same space.
pub trait LandmarkService: Send + Sync {
    /// Whether the service currently accepts requests
    fn is_ready(&self) -> bool;

    /// Detect landmarks on a vertex cloud
    fn detect(&self, vertices: &[[f32; 3]]) -> Result<LandmarkSet, LandmarkError>;
}

/// Service that answers every request with the same result
#[derive(Debug)]
pub struct FixedLandmarkService {
    result: Result<LandmarkSet, LandmarkError>,
    calls: AtomicUsize,
}

impl FixedLandmarkService {
    /// Always succeed with `landmarks`
    pub fn new(landmarks: LandmarkSet) -> Self {
        Self {
            result: Ok(landmarks),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `error`
    pub fn failing(error: LandmarkError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `detect` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LandmarkService for FixedLandmarkService {
    fn is_ready(&self) -> bool {
        true
    }

    fn detect(&self, vertices: &[[f32; 3]]) -> Result<LandmarkSet, LandmarkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if vertices.is_empty() {
            return Err(LandmarkError::EmptyRequest("no vertices".to_string()));
        }
        self.result.clone()
    }
}
