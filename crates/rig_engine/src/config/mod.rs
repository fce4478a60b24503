//! # Configuration System
//!
//! Serializable configuration for every subsystem of the rig visualization,
//! loadable from TOML or RON files.
//!
//! ## Configuration Categories
//!
//! - **Logging**: default log level
//! - **Viewer**: frame pacing, input debouncing, render surface negotiation, camera
//! - **Render**: subject sizing, landmark markers, alignment, async task mode
//! - **Landmarks**: detection service location and readiness
//! - **Scene**: default payloads for the floor plan, monitor and subject

pub use serde::{Deserialize, Serialize};

use crate::scene::{FloorPlanData, MonitorData, SubjectData};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level (`RUST_LOG` overrides it)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Render loop, input and surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Target frame rate for the paced render loop
    pub target_fps: u32,
    /// Quiet period applied to continuous parameter inputs
    pub debounce_ms: u64,
    /// How many times the render container is measured before falling back
    pub surface_retry_attempts: u32,
    /// Delay between container measurements
    pub surface_retry_interval_ms: u64,
    /// Width used when the container reports zero area
    pub fallback_width: u32,
    /// Height used when the container reports zero area
    pub fallback_height: u32,
    /// Vertical field of view in degrees
    pub camera_fov_deg: f32,
    /// Camera home position used by `reset_camera`
    pub camera_home: [f32; 3],
    /// Orbit damping factor in `(0, 1]`
    pub damping_factor: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            debounce_ms: 150,
            surface_retry_attempts: 5,
            surface_retry_interval_ms: 16,
            fallback_width: 800,
            fallback_height: 600,
            camera_fov_deg: 45.0,
            camera_home: [30.0, 25.0, 30.0],
            damping_factor: 0.1,
        }
    }
}

/// How asynchronous mesh and landmark work is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskMode {
    /// Run on a background thread, deliver on the next completion drain
    Threaded,
    /// Run immediately on the caller, deliver on the next completion drain
    Inline,
}

/// Render engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Largest bounding-box dimension of the subject model after scaling
    pub subject_target_length: f32,
    /// Radius of the landmark marker spheres
    pub marker_radius: f32,
    /// Canonical forward axis the subject is aligned to
    pub forward_axis: [f32; 3],
    /// Lateral axis the left-to-right ear direction is checked against
    pub ear_axis: [f32; 3],
    /// Residual angle accepted by the alignment check, in degrees
    pub alignment_tolerance_deg: f32,
    /// Execution mode for mesh loading and landmark detection
    pub task_mode: TaskMode,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            subject_target_length: 8.0,
            marker_radius: 0.25,
            forward_axis: [0.0, 0.0, 1.0],
            ear_axis: [1.0, 0.0, 0.0],
            alignment_tolerance_deg: 0.5,
            task_mode: TaskMode::Threaded,
        }
    }
}

/// Landmark detection service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkServiceConfig {
    /// Whether landmark detection is used at all
    pub enabled: bool,
    /// Base URL of the detection server
    pub base_url: String,
    /// Request timeout
    pub timeout_ms: u64,
    /// Treat the service as ready without waiting for a readiness signal
    pub assume_ready: bool,
}

impl Default for LandmarkServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            assume_ready: false,
        }
    }
}

/// Default payloads for the initial hierarchy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDefaults {
    /// Floor plan payload
    pub floor_plan: FloorPlanData,
    /// Monitor payload
    pub monitor: MonitorData,
    /// Subject payload
    pub subject: SubjectData,
}

/// Complete configuration for the rig visualization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Viewer configuration
    pub viewer: ViewerConfig,
    /// Render engine configuration
    pub render: RenderConfig,
    /// Landmark service configuration
    pub landmarks: LandmarkServiceConfig,
    /// Initial scene payloads
    pub scene: SceneDefaults,
}

impl RigConfig {
    /// Validate ranges that the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewer.target_fps == 0 {
            return Err(ConfigError::Invalid("target_fps must be at least 1".to_string()));
        }
        if !(self.viewer.damping_factor > 0.0 && self.viewer.damping_factor <= 1.0) {
            return Err(ConfigError::Invalid("damping_factor must be in (0, 1]".to_string()));
        }
        if self.render.subject_target_length <= 0.0 {
            return Err(ConfigError::Invalid("subject_target_length must be positive".to_string()));
        }
        if self.render.marker_radius <= 0.0 {
            return Err(ConfigError::Invalid("marker_radius must be positive".to_string()));
        }
        for (name, axis) in [("forward_axis", self.render.forward_axis), ("ear_axis", self.render.ear_axis)] {
            if axis.iter().all(|c| *c == 0.0) || axis.iter().any(|c| !c.is_finite()) {
                return Err(ConfigError::Invalid(format!("{} must be a finite non-zero vector", name)));
            }
        }
        self.scene.monitor.validate().map_err(ConfigError::Invalid)?;
        self.scene.floor_plan.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Config for RigConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RigConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RigConfig = toml::from_str(
            "[viewer]\ntarget_fps = 30\n\n[render]\nsubject_target_length = 12.0\n",
        )
        .expect("valid toml");

        assert_eq!(config.viewer.target_fps, 30);
        assert_eq!(config.viewer.debounce_ms, 150);
        assert_eq!(config.render.subject_target_length, 12.0);
        assert_eq!(config.render.task_mode, TaskMode::Threaded);
    }

    #[test]
    fn test_zero_forward_axis_rejected() {
        let mut config = RigConfig::default();
        config.render.forward_axis = [0.0, 0.0, 0.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RigConfig::default();
        config.render.ear_axis = [f32::NAN, 0.0, 0.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let mut config = RigConfig::default();
        config.scene.floor_plan.grid_divisions = crate::scene::MAX_GRID_DIVISIONS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = RigConfig::load_from_file("rig.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_) | ConfigError::UnsupportedFormat(_)));
    }
}
