//! Render surface negotiation
//!
//! A [`RenderContainer`] is whatever hosts the drawing surface. Its size may
//! read as zero while layout is still pending, so it is measured a bounded
//! number of times before configured fallback dimensions are used.

use std::thread;
use std::time::Duration;

use crate::config::ViewerConfig;
use crate::render::{HeadlessBackend, RenderBackend, RenderResult};

use super::InitError;

/// Host of the drawing surface
pub trait RenderContainer {
    /// Name used in logs
    fn label(&self) -> &str;

    /// Current drawable size in pixels; zero while not laid out
    fn measure(&mut self) -> (u32, u32);

    /// Create a backend drawing into this container
    fn create_backend(&mut self, width: u32, height: u32) -> RenderResult<Box<dyn RenderBackend>>;
}

/// Negotiated surface size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether the fallback dimensions were used
    pub fallback: bool,
}

impl SurfaceSize {
    /// Width over height
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Measure `container` until it has area, then fall back to the configured size
pub fn negotiate_surface(container: &mut dyn RenderContainer, viewer: &ViewerConfig) -> Result<SurfaceSize, InitError> {
    let attempts = viewer.surface_retry_attempts.max(1);
    for attempt in 1..=attempts {
        let (width, height) = container.measure();
        if width > 0 && height > 0 {
            log::debug!("Container '{}' measured {}x{} (attempt {})", container.label(), width, height, attempt);
            return Ok(SurfaceSize {
                width,
                height,
                fallback: false,
            });
        }
        if attempt < attempts {
            thread::sleep(Duration::from_millis(viewer.surface_retry_interval_ms));
        }
    }

    if viewer.fallback_width > 0 && viewer.fallback_height > 0 {
        log::warn!(
            "Container '{}' has no area after {} measurements, using {}x{}",
            container.label(),
            attempts,
            viewer.fallback_width,
            viewer.fallback_height
        );
        return Ok(SurfaceSize {
            width: viewer.fallback_width,
            height: viewer.fallback_height,
            fallback: true,
        });
    }
    Err(InitError::ZeroArea {
        container: container.label().to_string(),
        attempts,
    })
}

/// Offscreen container backed by [`HeadlessBackend`]
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    label: String,
    width: u32,
    height: u32,
    unsized_reads: u32,
    measurements: u32,
}

impl HeadlessSurface {
    /// Surface with a fixed size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            label: "headless".to_string(),
            width,
            height,
            unsized_reads: 0,
            measurements: 0,
        }
    }

    /// Builder pattern: report zero area for the first `reads` measurements
    pub fn with_pending_layout(mut self, reads: u32) -> Self {
        self.unsized_reads = reads;
        self
    }

    /// Builder pattern: log label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Number of times the surface was measured
    pub fn measurements(&self) -> u32 {
        self.measurements
    }
}

impl RenderContainer for HeadlessSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn measure(&mut self) -> (u32, u32) {
        self.measurements += 1;
        if self.measurements <= self.unsized_reads {
            (0, 0)
        } else {
            (self.width, self.height)
        }
    }

    fn create_backend(&mut self, width: u32, height: u32) -> RenderResult<Box<dyn RenderBackend>> {
        Ok(Box::new(HeadlessBackend::new(width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer(fallback: (u32, u32)) -> ViewerConfig {
        ViewerConfig {
            surface_retry_attempts: 3,
            surface_retry_interval_ms: 1,
            fallback_width: fallback.0,
            fallback_height: fallback.1,
            ..ViewerConfig::default()
        }
    }

    #[test]
    fn test_late_layout_is_picked_up() {
        let mut surface = HeadlessSurface::new(1024, 768).with_pending_layout(2);
        let size = negotiate_surface(&mut surface, &viewer((800, 600))).expect("sized");

        assert_eq!((size.width, size.height, size.fallback), (1024, 768, false));
        assert_eq!(surface.measurements(), 3);
    }

    #[test]
    fn test_fallback_dimensions() {
        let mut surface = HeadlessSurface::new(0, 0);
        let size = negotiate_surface(&mut surface, &viewer((800, 600))).expect("fallback");

        assert!(size.fallback);
        assert_eq!((size.width, size.height), (800, 600));
        assert_eq!(surface.measurements(), 3);
    }

    #[test]
    fn test_zero_area_without_fallback_fails() {
        let mut surface = HeadlessSurface::new(640, 0);
        let result = negotiate_surface(&mut surface, &viewer((0, 0)));
        assert!(matches!(result, Err(InitError::ZeroArea { attempts: 3, .. })));
    }
}
