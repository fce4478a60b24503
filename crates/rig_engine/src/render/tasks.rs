//! Background work for mesh loading and landmark detection
//!
//! Jobs run on named worker threads (or inline, for deterministic runs) and
//! report back through a channel. Completions are only applied when the
//! engine drains them, so scene mutation stays on the owning thread.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::assets::MeshLoadError;
use crate::config::TaskMode;
use crate::landmarks::LandmarkError;
use crate::render::primitives::Mesh;
use crate::scene::{LandmarkSet, NodeId};

/// Result of one background job
#[derive(Debug)]
pub enum TaskCompletion {
    /// A subject mesh finished loading
    MeshLoaded {
        /// Subject node
        node: NodeId,
        /// Request id issued when the load started
        request_id: u64,
        /// Loaded mesh or the failure
        result: Result<Mesh, MeshLoadError>,
    },
    /// A landmark detection finished
    LandmarksDetected {
        /// Subject node
        node: NodeId,
        /// Request id issued when the detection started
        request_id: u64,
        /// Landmarks or the failure
        result: Result<LandmarkSet, LandmarkError>,
    },
}

impl TaskCompletion {
    /// Node the completion belongs to
    pub fn node(&self) -> NodeId {
        match self {
            TaskCompletion::MeshLoaded { node, .. } | TaskCompletion::LandmarksDetected { node, .. } => {
                *node
            }
        }
    }
}

/// Spawns jobs and collects their completions
pub struct TaskRunner {
    mode: TaskMode,
    sender: Sender<TaskCompletion>,
    receiver: Receiver<TaskCompletion>,
    in_flight: usize,
}

impl TaskRunner {
    /// Runner in the given mode
    pub fn new(mode: TaskMode) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            mode,
            sender,
            receiver,
            in_flight: 0,
        }
    }

    /// Execution mode
    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    /// Jobs spawned but not yet drained
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Run `job` and deliver its completion on a later drain.
    ///
    /// Returns `false` when no worker could be started; the job is dropped.
    pub fn spawn<F>(&mut self, name: &str, job: F) -> bool
    where
        F: FnOnce() -> TaskCompletion + Send + 'static,
    {
        self.in_flight += 1;
        match self.mode {
            TaskMode::Inline => {
                // The receiver lives in self, so the send cannot fail
                let _ = self.sender.send(job());
                true
            }
            TaskMode::Threaded => {
                let sender = self.sender.clone();
                let spawned = thread::Builder::new()
                    .name(format!("rig-{}", name))
                    .spawn(move || {
                        // Dropped receiver means the engine is gone
                        let _ = sender.send(job());
                    });
                match spawned {
                    Ok(_) => true,
                    Err(e) => {
                        log::error!("Failed to spawn '{}' worker: {}", name, e);
                        self.in_flight -= 1;
                        false
                    }
                }
            }
        }
    }

    /// Completions that have arrived, without blocking
    pub fn drain(&mut self) -> Vec<TaskCompletion> {
        let completions: Vec<_> = self.receiver.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(completions.len());
        completions
    }

    /// Block until at least one completion arrives or `timeout` passes,
    /// then drain everything available.
    pub fn wait_any(&mut self, timeout: Duration) -> Vec<TaskCompletion> {
        if self.in_flight == 0 {
            return Vec::new();
        }
        let deadline = Instant::now() + timeout;
        let mut completions = Vec::new();
        match self.receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(completion) => completions.push(completion),
            Err(RecvTimeoutError::Timeout) => return completions,
            Err(RecvTimeoutError::Disconnected) => {
                self.in_flight = 0;
                return completions;
            }
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        completions.extend(self.drain());
        completions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeType, SceneTree};

    fn completion(node: NodeId, request_id: u64) -> TaskCompletion {
        TaskCompletion::MeshLoaded {
            node,
            request_id,
            result: Ok(Mesh::cube(1.0)),
        }
    }

    #[test]
    fn test_inline_completions_wait_for_drain() {
        let node = SceneTree::new().create_node("subject", NodeType::Subject);
        let mut runner = TaskRunner::new(TaskMode::Inline);

        assert!(runner.spawn("mesh", move || completion(node, 7)));
        assert_eq!(runner.in_flight(), 1);

        let drained = runner.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].node(), node);
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn test_threaded_completion_arrives() {
        let node = SceneTree::new().create_node("subject", NodeType::Subject);
        let mut runner = TaskRunner::new(TaskMode::Threaded);

        runner.spawn("mesh", move || completion(node, 1));
        let drained = runner.wait_any(Duration::from_secs(5));

        assert_eq!(drained.len(), 1);
        assert!(matches!(drained[0], TaskCompletion::MeshLoaded { request_id: 1, .. }));
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn test_completions_from_many_workers_all_arrive() {
        let mut tree = SceneTree::new();
        let mut runner = TaskRunner::new(TaskMode::Threaded);
        for request_id in 0..8 {
            let node = tree.create_node("subject", NodeType::Subject);
            assert!(runner.spawn("mesh", move || completion(node, request_id)));
        }

        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while runner.in_flight() > 0 && Instant::now() < deadline {
            received.extend(runner.wait_any(Duration::from_millis(500)));
        }

        let mut ids: Vec<u64> = received
            .iter()
            .map(|c| match c {
                TaskCompletion::MeshLoaded { request_id, .. } | TaskCompletion::LandmarksDetected { request_id, .. } => {
                    *request_id
                }
            })
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn test_wait_without_jobs_returns_immediately() {
        let mut runner = TaskRunner::new(TaskMode::Threaded);
        assert!(runner.wait_any(Duration::from_secs(60)).is_empty());
    }
}
