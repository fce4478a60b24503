//! Node payload storage and its typed views
//!
//! The payload is an open key/value map. Code outside the scene module works
//! with the typed views ([`FloorPlanData`], [`MonitorData`], [`SubjectData`])
//! which read from and write back to the map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::landmarks::LandmarkSet;
use super::node::{NodeTransform, NodeType};
use crate::foundation::math::{constants::PI, utils::deg_to_rad, Vec3};

/// Well-known payload keys
pub mod keys {
    /// Floor width along X (cm)
    pub const WIDTH: &str = "width";
    /// Floor depth along Z (cm)
    pub const DEPTH: &str = "depth";
    /// Grid line count per side
    pub const GRID_DIVISIONS: &str = "grid_divisions";
    /// Monitor height (cm)
    pub const HEIGHT: &str = "height";
    /// Distance from the subject's eye to the screen center (cm)
    pub const DISTANCE: &str = "distance";
    /// Monitor elevation above the eye line (degrees)
    pub const ELEVATION: &str = "elevation";
    /// Monitor rotation around the vertical axis (degrees)
    pub const ROTATION: &str = "rotation";
    /// Subject mesh location
    pub const MESH_PATH: &str = "mesh_path";
    /// Eye height above the floor (cm)
    pub const EYE_HEIGHT: &str = "eye_height";
    /// Whether landmark markers are shown
    pub const SHOW_LANDMARKS: &str = "show_landmarks";
    /// Detected landmark set
    pub const LANDMARKS: &str = "landmarks";
    /// Selection flag set by the scene listing
    pub const SELECTED: &str = "selected";
}

/// One payload value
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    /// Flag
    Bool(bool),
    /// Any numeric parameter
    Number(f64),
    /// Text such as a path
    Text(String),
    /// 3-component vector
    Vector([f32; 3]),
    /// Detected landmarks
    Landmarks(LandmarkSet),
}

impl PayloadValue {
    /// Boolean value, if this is a flag
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PayloadValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PayloadValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric value narrowed to `f32`
    pub fn as_f32(&self) -> Option<f32> {
        self.as_number().map(|value| value as f32)
    }

    /// Text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Landmark set
    pub fn as_landmarks(&self) -> Option<&LandmarkSet> {
        match self {
            PayloadValue::Landmarks(set) => Some(set),
            _ => None,
        }
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Number(value)
    }
}

impl From<f32> for PayloadValue {
    fn from(value: f32) -> Self {
        PayloadValue::Number(f64::from(value))
    }
}

impl From<u32> for PayloadValue {
    fn from(value: u32) -> Self {
        PayloadValue::Number(f64::from(value))
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Text(value)
    }
}

impl From<Vec3> for PayloadValue {
    fn from(value: Vec3) -> Self {
        PayloadValue::Vector([value.x, value.y, value.z])
    }
}

impl From<LandmarkSet> for PayloadValue {
    fn from(value: LandmarkSet) -> Self {
        PayloadValue::Landmarks(value)
    }
}

/// Raw payload map
pub type Payload = HashMap<String, PayloadValue>;

fn read_f32(payload: &Payload, key: &str, fallback: f32) -> f32 {
    payload.get(key).and_then(PayloadValue::as_f32).unwrap_or(fallback)
}

/// Upper bound on floor grid cells per side; larger requests are clamped
pub const MAX_GRID_DIVISIONS: u32 = 500;

/// Floor plan dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorPlanData {
    /// Extent along X (cm)
    pub width: f32,
    /// Extent along Z (cm)
    pub depth: f32,
    /// Grid cells per side
    pub grid_divisions: u32,
}

impl Default for FloorPlanData {
    fn default() -> Self {
        Self {
            width: 100.0,
            depth: 100.0,
            grid_divisions: 20,
        }
    }
}

impl FloorPlanData {
    /// Read from a payload, keeping defaults for absent keys
    pub fn from_payload(payload: &Payload) -> Self {
        let defaults = Self::default();
        let divisions = payload
            .get(keys::GRID_DIVISIONS)
            .and_then(PayloadValue::as_number)
            .map_or(defaults.grid_divisions, |d| {
                let clamped = d.round().clamp(1.0, f64::from(MAX_GRID_DIVISIONS));
                if clamped != d.round() {
                    log::warn!("Grid divisions {} out of range, using {}", d, clamped);
                }
                clamped as u32
            });
        Self {
            width: read_f32(payload, keys::WIDTH, defaults.width),
            depth: read_f32(payload, keys::DEPTH, defaults.depth),
            grid_divisions: divisions,
        }
    }

    /// Payload entries for this view
    pub fn entries(&self) -> Vec<(&'static str, PayloadValue)> {
        vec![
            (keys::WIDTH, self.width.into()),
            (keys::DEPTH, self.depth.into()),
            (keys::GRID_DIVISIONS, self.grid_divisions.into()),
        ]
    }

    /// Check that the dimensions describe a real floor
    pub fn validate(&self) -> Result<(), String> {
        if !(self.width > 0.0 && self.depth > 0.0) {
            return Err(format!(
                "floor plan must have positive size, got {}x{}",
                self.width, self.depth
            ));
        }
        if self.grid_divisions == 0 {
            return Err("floor plan needs at least one grid division".to_string());
        }
        if self.grid_divisions > MAX_GRID_DIVISIONS {
            return Err(format!(
                "floor plan grid divisions must be at most {}, got {}",
                MAX_GRID_DIVISIONS, self.grid_divisions
            ));
        }
        Ok(())
    }
}

/// Stimulus monitor geometry and placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorData {
    /// Screen width (cm)
    pub width: f32,
    /// Screen height (cm)
    pub height: f32,
    /// Eye to screen center distance (cm)
    pub distance: f32,
    /// Angle above the eye line (degrees)
    pub elevation_deg: f32,
    /// Angle around the vertical axis (degrees)
    pub rotation_deg: f32,
}

impl Default for MonitorData {
    fn default() -> Self {
        Self {
            width: 40.0,
            height: 30.0,
            distance: 10.0,
            elevation_deg: 20.0,
            rotation_deg: 0.0,
        }
    }
}

impl MonitorData {
    /// Read from a payload, keeping defaults for absent keys
    pub fn from_payload(payload: &Payload) -> Self {
        let defaults = Self::default();
        Self {
            width: read_f32(payload, keys::WIDTH, defaults.width),
            height: read_f32(payload, keys::HEIGHT, defaults.height),
            distance: read_f32(payload, keys::DISTANCE, defaults.distance),
            elevation_deg: read_f32(payload, keys::ELEVATION, defaults.elevation_deg),
            rotation_deg: read_f32(payload, keys::ROTATION, defaults.rotation_deg),
        }
    }

    /// Payload entries for this view
    pub fn entries(&self) -> Vec<(&'static str, PayloadValue)> {
        vec![
            (keys::WIDTH, self.width.into()),
            (keys::HEIGHT, self.height.into()),
            (keys::DISTANCE, self.distance.into()),
            (keys::ELEVATION, self.elevation_deg.into()),
            (keys::ROTATION, self.rotation_deg.into()),
        ]
    }

    /// Check sizes and angles
    pub fn validate(&self) -> Result<(), String> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(format!(
                "monitor must have positive size, got {}x{}",
                self.width, self.height
            ));
        }
        if !(self.distance > 0.0) {
            return Err(format!("monitor distance must be positive, got {}", self.distance));
        }
        if !(-90.0..=90.0).contains(&self.elevation_deg) {
            return Err(format!(
                "monitor elevation must be within [-90, 90] degrees, got {}",
                self.elevation_deg
            ));
        }
        Ok(())
    }

    /// Unit vector from the eye towards the screen center
    pub fn view_direction(&self) -> Vec3 {
        let elevation = deg_to_rad(self.elevation_deg);
        let rotation = deg_to_rad(self.rotation_deg);
        Vec3::new(
            rotation.sin() * elevation.cos(),
            elevation.sin(),
            rotation.cos() * elevation.cos(),
        )
    }

    /// Monitor transform for an eye at `(0, eye_height, 0)`.
    ///
    /// The screen lies in the monitor's local XY plane; its +Z normal ends up
    /// pointing back at the eye.
    pub fn placement(&self, eye_height: f32) -> NodeTransform {
        let eye = Vec3::new(0.0, eye_height, 0.0);
        let position = eye + self.view_direction() * self.distance;
        let rotation = Vec3::new(
            deg_to_rad(self.elevation_deg),
            deg_to_rad(self.rotation_deg) + PI,
            0.0,
        );
        NodeTransform::from_position(position).with_rotation(rotation)
    }
}

/// Subject model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectData {
    /// Mesh file to load; without one the subject is drawn as a box
    pub mesh_path: Option<String>,
    /// Eye height above the floor (cm)
    pub eye_height: f32,
    /// Whether landmarks are detected and shown
    pub show_landmarks: bool,
}

impl Default for SubjectData {
    fn default() -> Self {
        Self {
            mesh_path: None,
            eye_height: 5.0,
            show_landmarks: true,
        }
    }
}

impl SubjectData {
    /// Read from a payload, keeping defaults for absent keys
    pub fn from_payload(payload: &Payload) -> Self {
        let defaults = Self::default();
        Self {
            mesh_path: payload
                .get(keys::MESH_PATH)
                .and_then(PayloadValue::as_text)
                .map(str::to_string)
                .or(defaults.mesh_path),
            eye_height: read_f32(payload, keys::EYE_HEIGHT, defaults.eye_height),
            show_landmarks: payload
                .get(keys::SHOW_LANDMARKS)
                .and_then(PayloadValue::as_bool)
                .unwrap_or(defaults.show_landmarks),
        }
    }

    /// Payload entries for this view
    pub fn entries(&self) -> Vec<(&'static str, PayloadValue)> {
        let mut entries = vec![
            (keys::EYE_HEIGHT, self.eye_height.into()),
            (keys::SHOW_LANDMARKS, self.show_landmarks.into()),
        ];
        if let Some(path) = &self.mesh_path {
            entries.push((keys::MESH_PATH, path.clone().into()));
        }
        entries
    }
}

/// Typed payload per node type
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Floor plan
    FloorPlan(FloorPlanData),
    /// Monitor
    Monitor(MonitorData),
    /// Subject
    Subject(SubjectData),
    /// No typed payload
    Generic,
}

impl NodeData {
    /// Typed view of a payload for the given node type
    pub fn from_payload(node_type: NodeType, payload: &Payload) -> Self {
        match node_type {
            NodeType::FloorPlan => NodeData::FloorPlan(FloorPlanData::from_payload(payload)),
            NodeType::Monitor => NodeData::Monitor(MonitorData::from_payload(payload)),
            NodeType::Subject => NodeData::Subject(SubjectData::from_payload(payload)),
            NodeType::Root | NodeType::Generic => NodeData::Generic,
        }
    }

    /// Payload entries for this view
    pub fn entries(&self) -> Vec<(&'static str, PayloadValue)> {
        match self {
            NodeData::FloorPlan(data) => data.entries(),
            NodeData::Monitor(data) => data.entries(),
            NodeData::Subject(data) => data.entries(),
            NodeData::Generic => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::euler_to_quat;
    use approx::assert_relative_eq;

    #[test]
    fn test_typed_view_reads_overrides() {
        let mut payload = Payload::new();
        payload.insert(keys::DISTANCE.to_string(), PayloadValue::Number(25.0));
        payload.insert(keys::WIDTH.to_string(), PayloadValue::Text("wide".to_string()));

        let monitor = MonitorData::from_payload(&payload);
        assert_relative_eq!(monitor.distance, 25.0);
        // Wrong type keeps the default
        assert_relative_eq!(monitor.width, 40.0);
    }

    #[test]
    fn test_monitor_placement_faces_eye() {
        let monitor = MonitorData {
            rotation_deg: 30.0,
            ..MonitorData::default()
        };
        let transform = monitor.placement(5.0);
        let eye = Vec3::new(0.0, 5.0, 0.0);

        assert_relative_eq!((transform.position - eye).norm(), monitor.distance, epsilon = 1e-4);

        let normal = euler_to_quat(transform.rotation) * Vec3::z();
        let to_eye = (eye - transform.position).normalize();
        assert_relative_eq!(normal.dot(&to_eye), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let floor = FloorPlanData {
            width: 0.0,
            ..FloorPlanData::default()
        };
        assert!(floor.validate().is_err());

        let monitor = MonitorData {
            elevation_deg: 120.0,
            ..MonitorData::default()
        };
        assert!(monitor.validate().is_err());
        assert!(MonitorData::default().validate().is_ok());
    }

    #[test]
    fn test_grid_divisions_are_clamped() {
        let mut payload = Payload::new();
        payload.insert(keys::GRID_DIVISIONS.to_string(), PayloadValue::Number(1e12));
        assert_eq!(FloorPlanData::from_payload(&payload).grid_divisions, MAX_GRID_DIVISIONS);

        payload.insert(keys::GRID_DIVISIONS.to_string(), PayloadValue::Number(-3.0));
        assert_eq!(FloorPlanData::from_payload(&payload).grid_divisions, 1);

        let floor = FloorPlanData {
            grid_divisions: MAX_GRID_DIVISIONS + 1,
            ..FloorPlanData::default()
        };
        assert!(floor.validate().is_err());
    }

    #[test]
    fn test_subject_entries_skip_missing_path() {
        let entries = SubjectData::default().entries();
        assert!(entries.iter().all(|(key, _)| *key != keys::MESH_PATH));
    }
}
