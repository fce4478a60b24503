//! Named anatomical landmarks detected on a subject mesh

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::foundation::math::Vec3;

/// Tip of the nose, the front point used for alignment
pub const NOSE: &str = "nose";
/// Tip of the tail, the rear point used for alignment
pub const TAIL_TIP: &str = "tail_tip";
/// Where the tail meets the body
pub const TAIL_ATTACHMENT: &str = "tail_attachment";
/// Left ear
pub const LEFT_EAR: &str = "left_ear";
/// Right ear
pub const RIGHT_EAR: &str = "right_ear";
/// Midpoint between the eyes
pub const EYE_CENTER: &str = "eye_center";

/// Information the detector reports alongside the points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionMetadata {
    /// Detection method name
    pub method: Option<String>,
    /// Number of vertices the detector received
    pub vertex_count: Option<usize>,
}

impl DetectionMetadata {
    /// Pick the known fields out of a metadata object
    pub fn from_json(value: &Value) -> Self {
        Self {
            method: value
                .get("detection_method")
                .or_else(|| value.get("method"))
                .and_then(Value::as_str)
                .map(str::to_string),
            vertex_count: value
                .get("vertex_count")
                .and_then(Value::as_u64)
                .and_then(|count| usize::try_from(count).ok()),
        }
    }
}

/// Mapping from landmark name to a position in mesh-local space.
///
/// A set is written once per mesh; a new detection replaces the whole set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: BTreeMap<String, Vec3>,
    malformed: Vec<String>,
    metadata: Option<DetectionMetadata>,
}

impl LandmarkSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, point)` pairs
    pub fn from_points<I, S>(points: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec3)>,
        S: Into<String>,
    {
        Self {
            points: points.into_iter().map(|(name, p)| (name.into(), p)).collect(),
            ..Self::default()
        }
    }

    /// Parse a `{name: [x, y, z], ...}` object.
    ///
    /// Values that are not a flat array of three finite numbers are recorded
    /// as malformed and left out of the point map.
    pub fn from_json_map(map: &Map<String, Value>) -> Self {
        let mut set = Self::new();
        for (name, value) in map {
            match parse_point(value) {
                Some(point) => {
                    set.points.insert(name.clone(), point);
                }
                None => {
                    log::warn!("Landmark '{}' is not a 3D point, skipping", name);
                    set.malformed.push(name.clone());
                }
            }
        }
        set
    }

    /// Attach detection metadata
    pub fn with_metadata(mut self, metadata: DetectionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add or replace a point
    pub fn insert(&mut self, name: impl Into<String>, point: Vec3) {
        self.points.insert(name.into(), point);
    }

    /// Record an entry that could not be used
    pub fn mark_malformed(&mut self, name: impl Into<String>) {
        self.malformed.push(name.into());
    }

    /// Point by name
    pub fn get(&self, name: &str) -> Option<Vec3> {
        self.points.get(name).copied()
    }

    /// Whether a point with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.points.contains_key(name)
    }

    /// Iterate over points in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec3)> {
        self.points.iter().map(|(name, point)| (name.as_str(), *point))
    }

    /// Number of usable points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no usable points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Names of entries that were not 3D points
    pub fn malformed(&self) -> &[String] {
        &self.malformed
    }

    /// Detection metadata, if the detector sent any
    pub fn metadata(&self) -> Option<&DetectionMetadata> {
        self.metadata.as_ref()
    }
}

fn parse_point(value: &Value) -> Option<Vec3> {
    let coords = value.as_array()?;
    if coords.len() != 3 {
        return None;
    }
    let mut xyz = [0.0_f32; 3];
    for (slot, coord) in xyz.iter_mut().zip(coords) {
        let v = coord.as_f64()? as f32;
        if !v.is_finite() {
            return None;
        }
        *slot = v;
    }
    Some(Vec3::new(xyz[0], xyz[1], xyz[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_malformed_entries_are_recorded() {
        let value = json!({
            "nose": [0.0, 1.0, 2.5],
            "tail_tip": [0.0, 0.5, -3.0],
            "left_whiskers": [[1.0, 2.0, 3.0], [1.5, 2.0, 3.0]],
            "eye_center": [1.0, 2.0],
        });
        let set = LandmarkSet::from_json_map(value.as_object().expect("object"));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(NOSE), Some(Vec3::new(0.0, 1.0, 2.5)));
        assert!(set.contains(TAIL_TIP));
        assert_eq!(set.malformed(), &["eye_center".to_string(), "left_whiskers".to_string()]);
    }

    #[test]
    fn test_metadata_fields() {
        let metadata = DetectionMetadata::from_json(&json!({
            "detection_method": "density_analysis",
            "coordinate_system": "mesh_relative",
            "vertex_count": 1200,
        }));
        assert_eq!(metadata.method.as_deref(), Some("density_analysis"));
        assert_eq!(metadata.vertex_count, Some(1200));
    }
}
