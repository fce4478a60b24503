//! Readiness gate in front of the landmark service
//!
//! Requests made before the service is ready wait in a FIFO queue and are
//! released by [`LandmarkClient::signal_ready`]. Requests whose node was
//! destroyed while waiting are dropped on release.

use std::collections::VecDeque;
use std::sync::Arc;

use super::LandmarkService;
use crate::scene::NodeId;

/// A pending detection for one subject node
#[derive(Debug, Clone)]
pub struct LandmarkRequest {
    /// Subject node the landmarks belong to
    pub node: NodeId,
    /// Engine-assigned id used to recognize stale responses
    pub request_id: u64,
    /// Mesh-local unique vertex positions
    pub vertices: Vec<[f32; 3]>,
}

/// Landmark service handle with readiness tracking
pub struct LandmarkClient {
    service: Arc<dyn LandmarkService>,
    ready: bool,
    queue: VecDeque<LandmarkRequest>,
}

impl LandmarkClient {
    /// Client that queues until `signal_ready` unless `ready` is set
    pub fn new(service: Arc<dyn LandmarkService>, ready: bool) -> Self {
        Self {
            service,
            ready,
            queue: VecDeque::new(),
        }
    }

    /// Shared service handle for dispatch
    pub fn service(&self) -> Arc<dyn LandmarkService> {
        Arc::clone(&self.service)
    }

    /// Whether requests go out immediately
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of requests waiting for readiness
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Submit a request.
    ///
    /// Returns the request back when it may be dispatched now, otherwise
    /// keeps it queued and returns `None`.
    pub fn submit(&mut self, request: LandmarkRequest) -> Option<LandmarkRequest> {
        if self.ready {
            return Some(request);
        }
        log::debug!(
            "Landmark service not ready, queueing request {} for {}",
            request.request_id,
            request.node
        );
        self.queue.push_back(request);
        None
    }

    /// Mark the service ready and release queued requests in FIFO order.
    ///
    /// `is_alive` filters out requests for nodes destroyed while queued.
    pub fn signal_ready(&mut self, is_alive: impl Fn(NodeId) -> bool) -> Vec<LandmarkRequest> {
        if !self.ready {
            log::info!("Landmark service ready, releasing {} queued request(s)", self.queue.len());
        }
        self.ready = true;
        self.queue
            .drain(..)
            .filter(|request| {
                let alive = is_alive(request.node);
                if !alive {
                    log::debug!("Dropping queued landmark request for destroyed {}", request.node);
                }
                alive
            })
            .collect()
    }

    /// Forget queued requests for one node
    pub fn cancel(&mut self, node: NodeId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|request| request.node != node);
        before - self.queue.len()
    }

    /// Ask the service whether it is ready; signals readiness when it is
    pub fn probe(&mut self, is_alive: impl Fn(NodeId) -> bool) -> Option<Vec<LandmarkRequest>> {
        if self.ready {
            return None;
        }
        if self.service.is_ready() {
            Some(self.signal_ready(is_alive))
        } else {
            None
        }
    }
}
