//! Time management utilities

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Frame timer for the render loop
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// Update the timer against an explicit timestamp
    pub fn update_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_frame);
        self.delta_time = elapsed.as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the average FPS since timer creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

/// Trailing-edge debouncer.
///
/// Each `push` replaces the pending value for its key and restarts that key's
/// quiet period; `take_due` hands back values whose quiet period has elapsed.
#[derive(Debug)]
pub struct Debouncer<K, V> {
    delay: Duration,
    pending: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash + Clone, V> Debouncer<K, V> {
    /// Create a debouncer with the given quiet period
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Quiet period applied to every key
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a value observed at `now`
    pub fn push(&mut self, key: K, value: V, now: Instant) {
        self.pending.insert(key, (now + self.delay, value));
    }

    /// Remove and return every value whose deadline is at or before `now`
    pub fn take_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        due.into_iter()
            .filter_map(|key| self.pending.remove(&key).map(|(_, value)| (key, value)))
            .collect()
    }

    /// Remove and return every pending value regardless of deadline
    pub fn take_all(&mut self) -> Vec<(K, V)> {
        self.pending.drain().map(|(key, (_, value))| (key, value)).collect()
    }

    /// Drop the pending value for `key`
    pub fn cancel<Q>(&mut self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.pending.remove(key).is_some()
    }

    /// Number of values still waiting
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending value
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_keeps_latest_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));

        debouncer.push("distance", 1.0, start);
        debouncer.push("distance", 2.0, start + Duration::from_millis(50));

        assert!(debouncer.take_due(start + Duration::from_millis(120)).is_empty());

        let due = debouncer.take_due(start + Duration::from_millis(150));
        assert_eq!(due, vec![("distance", 2.0)]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn test_timer_counts_frames() {
        let start = Instant::now();
        let mut timer = Timer::new();
        timer.update_at(start + Duration::from_millis(16));
        timer.update_at(start + Duration::from_millis(32));
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.delta_time() > 0.0);
    }
}
