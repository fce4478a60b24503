//! Landmark-driven orientation alignment
//!
//! Given a front and a rear landmark in mesh-local space, computes the
//! rotation that turns the model's intrinsic forward direction (rear to front)
//! onto a canonical world axis, plus a baseline position.
//!
//! Only the nose/tail pair drives the rotation. When both ears are present
//! the verification report also measures how far the rotated left-to-right
//! ear axis sits from the lateral axis.
//!
//! The vertical ground offset is a placeholder policy: half the vertical
//! extent between the two landmarks, scaled like the mesh. It stands in for
//! ground-contact landmarks and is not a physical placement guarantee.

use crate::foundation::math::{constants::PI, utils::rad_to_deg, Quat, Unit, Vec3};
use crate::scene::{LandmarkSet, LEFT_EAR, NOSE, RIGHT_EAR, TAIL_TIP};

/// Squared length under which two landmarks count as the same point
const DEGENERATE_EPSILON: f32 = 1e-12;

/// Cosine threshold for treating two directions as opposite
const ANTIPARALLEL_EPSILON: f32 = 1e-6;

/// Alignment errors
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// Input does not define a direction
    #[error("Degenerate alignment input: {0}")]
    Degenerate(String),
}

/// Why alignment did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A required landmark is absent from the set
    MissingLandmark(String),
}

/// Corrective transform for the aligned part of a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Rotation replacing any previous rotation
    pub rotation: Quat,
    /// Baseline position with the ground offset applied
    pub position: Vec3,
    /// Normalized rear-to-front direction before rotation
    pub source_forward: Vec3,
}

/// Result of aligning from a landmark set
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    /// Alignment computed
    Aligned(Alignment),
    /// Nothing to do; not an error
    Skipped(SkipReason),
}

/// Residual error of an alignment against its target axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentReport {
    /// Angle between the rotated forward vector and the target, in degrees
    pub residual_deg: f32,
    /// Angle between the rotated ear axis and the lateral axis, in degrees;
    /// `None` unless both ears were detected apart
    pub ear_residual_deg: Option<f32>,
    /// Accepted residual, in degrees
    pub tolerance_deg: f32,
}

impl AlignmentReport {
    /// Largest of the measured residuals
    pub fn overall_deg(&self) -> f32 {
        self.ear_residual_deg.map_or(self.residual_deg, |ear| self.residual_deg.max(ear))
    }

    /// Whether every measured residual is within tolerance
    pub fn is_within_tolerance(&self) -> bool {
        self.overall_deg() <= self.tolerance_deg
    }
}

/// Normalized rear-to-front direction, rejecting pairs that do not define one
pub fn validate_pair(front: Vec3, rear: Vec3) -> Result<Vec3, AlignmentError> {
    if !front.iter().chain(rear.iter()).all(|c| c.is_finite()) {
        return Err(AlignmentError::Degenerate(
            "landmark coordinates must be finite".to_string(),
        ));
    }
    let delta = front - rear;
    if delta.norm_squared() < DEGENERATE_EPSILON {
        return Err(AlignmentError::Degenerate(format!(
            "front and rear landmarks coincide at {:?}",
            front.as_slice()
        )));
    }
    Ok(delta.normalize())
}

/// Minimal rotation taking unit vector `from` onto unit vector `to`.
///
/// Opposite vectors have no unique minimal rotation; they get a half turn
/// about an axis perpendicular to `to`.
pub fn rotation_between_axes(from: &Vec3, to: &Vec3) -> Quat {
    if from.dot(to) < -1.0 + ANTIPARALLEL_EPSILON {
        let helper = if to.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        let axis = Unit::new_normalize(to.cross(&helper));
        Quat::from_axis_angle(&axis, PI)
    } else {
        Quat::rotation_between(from, to).unwrap_or_else(Quat::identity)
    }
}

/// Vertical offset placing the aligned model above the floor
pub fn ground_offset(front: Vec3, rear: Vec3, scale: f32) -> f32 {
    (front.y - rear.y).abs() * scale * 0.5
}

fn unit_axis(axis: Vec3, what: &str) -> Result<Vec3, AlignmentError> {
    if !axis.iter().all(|c| c.is_finite()) || axis.norm_squared() < DEGENERATE_EPSILON {
        return Err(AlignmentError::Degenerate(format!(
            "{} {:?} has no direction",
            what,
            axis.as_slice()
        )));
    }
    Ok(axis.normalize())
}

/// Stateless aligner configured with the canonical forward and lateral axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationAligner {
    target_axis: Vec3,
    ear_axis: Vec3,
    tolerance_deg: f32,
}

impl Default for OrientationAligner {
    fn default() -> Self {
        Self {
            target_axis: Vec3::z(),
            ear_axis: Vec3::x(),
            tolerance_deg: 0.5,
        }
    }
}

impl OrientationAligner {
    /// Aligner for a given target axis (normalized here)
    pub fn new(target_axis: Vec3, tolerance_deg: f32) -> Result<Self, AlignmentError> {
        Ok(Self {
            target_axis: unit_axis(target_axis, "target axis")?,
            tolerance_deg,
            ..Self::default()
        })
    }

    /// Builder pattern: lateral axis the ears are checked against
    pub fn with_ear_axis(mut self, ear_axis: Vec3) -> Result<Self, AlignmentError> {
        self.ear_axis = unit_axis(ear_axis, "ear axis")?;
        Ok(self)
    }

    /// Normalized target axis
    pub fn target_axis(&self) -> Vec3 {
        self.target_axis
    }

    /// Normalized lateral axis
    pub fn ear_axis(&self) -> Vec3 {
        self.ear_axis
    }

    /// Align from an explicit front/rear pair
    pub fn align(&self, front: Vec3, rear: Vec3, scale: f32) -> Result<Alignment, AlignmentError> {
        let source_forward = validate_pair(front, rear)?;
        let rotation = rotation_between_axes(&source_forward, &self.target_axis);
        Ok(Alignment {
            rotation,
            position: Vec3::new(0.0, ground_offset(front, rear, scale), 0.0),
            source_forward,
        })
    }

    /// Align from the nose and tail tip of a landmark set.
    ///
    /// A missing landmark skips alignment; a degenerate pair is an error.
    pub fn align_landmarks(
        &self,
        landmarks: &LandmarkSet,
        scale: f32,
    ) -> Result<AlignmentOutcome, AlignmentError> {
        let Some(front) = landmarks.get(NOSE) else {
            return Ok(AlignmentOutcome::Skipped(SkipReason::MissingLandmark(NOSE.to_string())));
        };
        let Some(rear) = landmarks.get(TAIL_TIP) else {
            return Ok(AlignmentOutcome::Skipped(SkipReason::MissingLandmark(
                TAIL_TIP.to_string(),
            )));
        };
        self.align(front, rear, scale).map(AlignmentOutcome::Aligned)
    }

    /// Residual error of an alignment against the target axis
    pub fn verify(&self, alignment: &Alignment) -> AlignmentReport {
        let rotated = (alignment.rotation * alignment.source_forward).normalize();
        let cos = rotated.dot(&self.target_axis).clamp(-1.0, 1.0);
        AlignmentReport {
            residual_deg: rad_to_deg(cos.acos()),
            ear_residual_deg: None,
            tolerance_deg: self.tolerance_deg,
        }
    }

    /// Like [`verify`](Self::verify), adding the ear axis error when both
    /// ears are in `landmarks`. The ear axis is unsigned: left/right swaps
    /// are not counted.
    pub fn verify_landmarks(&self, alignment: &Alignment, landmarks: &LandmarkSet) -> AlignmentReport {
        let mut report = self.verify(alignment);
        if let (Some(left), Some(right)) = (landmarks.get(LEFT_EAR), landmarks.get(RIGHT_EAR)) {
            match validate_pair(right, left) {
                Ok(ears) => {
                    let rotated = (alignment.rotation * ears).normalize();
                    let cos = rotated.dot(&self.ear_axis).abs().min(1.0);
                    report.ear_residual_deg = Some(rad_to_deg(cos.acos()));
                }
                Err(e) => log::warn!("Ear landmarks ignored in verification: {}", e),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_already_aligned_is_identity() {
        let aligner = OrientationAligner::default();
        let alignment = aligner
            .align(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0), 1.0)
            .expect("valid pair");

        assert_relative_eq!(alignment.rotation.angle(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(alignment.position, Vec3::zeros());
    }

    #[test]
    fn test_x_forward_turns_quarter_about_y() {
        let aligner = OrientationAligner::default();
        let alignment = aligner
            .align(Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 1.0)
            .expect("valid pair");

        assert_relative_eq!(alignment.rotation.angle(), PI / 2.0, epsilon = 1e-5);
        let axis = alignment.rotation.axis().expect("non-identity");
        assert_relative_eq!(axis.y.abs(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(alignment.rotation * Vec3::x(), Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_opposite_forward_gets_half_turn() {
        let aligner = OrientationAligner::default();
        let alignment = aligner
            .align(Vec3::new(0.0, 0.0, -2.0), Vec3::new(0.0, 0.0, 2.0), 1.0)
            .expect("valid pair");
        assert_relative_eq!(alignment.rotation * -Vec3::z(), Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_forward_matches_target_over_grid() {
        let aligner = OrientationAligner::default();
        let samples = [-3.0_f32, -1.0, -0.25, 0.0, 0.5, 2.0];

        for &x in &samples {
            for &y in &samples {
                for &z in &samples {
                    let front = Vec3::new(x, y, z);
                    let rear = Vec3::new(0.3, -0.2, 0.1);
                    if (front - rear).norm() < 1e-3 {
                        continue;
                    }
                    let alignment = aligner.align(front, rear, 2.0).expect("valid pair");
                    let rotated = (alignment.rotation * (front - rear)).normalize();
                    assert_relative_eq!(rotated.dot(&Vec3::z()), 1.0, epsilon = 1e-4);
                    assert!(aligner.verify(&alignment).is_within_tolerance());
                }
            }
        }
    }

    #[test]
    fn test_degenerate_pair_rejected() {
        let point = Vec3::new(1.0, 2.0, 3.0);
        assert!(matches!(validate_pair(point, point), Err(AlignmentError::Degenerate(_))));
        assert!(matches!(
            validate_pair(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::zeros()),
            Err(AlignmentError::Degenerate(_))
        ));
        assert!(OrientationAligner::new(Vec3::zeros(), 0.5).is_err());
    }

    #[test]
    fn test_missing_tail_skips() {
        let aligner = OrientationAligner::default();
        let set = LandmarkSet::from_points([(NOSE, Vec3::new(0.0, 1.0, 2.0))]);
        let outcome = aligner.align_landmarks(&set, 1.0).expect("not an error");
        assert_eq!(
            outcome,
            AlignmentOutcome::Skipped(SkipReason::MissingLandmark(TAIL_TIP.to_string()))
        );
    }

    fn mouse_landmarks(left_ear: Vec3, right_ear: Vec3) -> LandmarkSet {
        LandmarkSet::from_points([
            (NOSE, Vec3::new(2.0, 0.0, 0.0)),
            (TAIL_TIP, Vec3::new(-2.0, 0.0, 0.0)),
            (LEFT_EAR, left_ear),
            (RIGHT_EAR, right_ear),
        ])
    }

    fn aligned(aligner: &OrientationAligner, landmarks: &LandmarkSet) -> Alignment {
        match aligner.align_landmarks(landmarks, 1.0).expect("valid pair") {
            AlignmentOutcome::Aligned(alignment) => alignment,
            AlignmentOutcome::Skipped(reason) => panic!("skipped: {:?}", reason),
        }
    }

    #[test]
    fn test_level_ears_land_on_lateral_axis() {
        let aligner = OrientationAligner::default();
        let landmarks = mouse_landmarks(Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0));
        let alignment = aligned(&aligner, &landmarks);

        let report = aligner.verify_landmarks(&alignment, &landmarks);
        let ear = report.ear_residual_deg.expect("both ears");
        assert_relative_eq!(ear, 0.0, epsilon = 0.05);
        assert_relative_eq!(report.overall_deg(), report.residual_deg.max(ear));
        assert!(report.is_within_tolerance());
    }

    #[test]
    fn test_rolled_ears_fail_overall_tolerance() {
        let aligner = OrientationAligner::default();
        let landmarks = mouse_landmarks(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        let alignment = aligned(&aligner, &landmarks);

        let report = aligner.verify_landmarks(&alignment, &landmarks);
        assert!(report.residual_deg < 0.5);
        assert_relative_eq!(report.ear_residual_deg.expect("both ears"), 90.0, epsilon = 1e-2);
        assert_relative_eq!(report.overall_deg(), 90.0, epsilon = 1e-2);
        assert!(!report.is_within_tolerance());
        // Rotation is still driven by nose and tail only
        assert_relative_eq!(alignment.rotation * Vec3::x(), Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_single_ear_reports_nose_tail_only() {
        let aligner = OrientationAligner::default();
        let landmarks = LandmarkSet::from_points([
            (NOSE, Vec3::new(2.0, 0.0, 0.0)),
            (TAIL_TIP, Vec3::new(-2.0, 0.0, 0.0)),
            (LEFT_EAR, Vec3::new(0.0, 1.0, 0.0)),
        ]);
        let alignment = aligned(&aligner, &landmarks);

        let report = aligner.verify_landmarks(&alignment, &landmarks);
        assert_eq!(report.ear_residual_deg, None);
        assert_relative_eq!(report.overall_deg(), report.residual_deg);
        assert!(OrientationAligner::default().with_ear_axis(Vec3::zeros()).is_err());
    }

    #[test]
    fn test_ground_offset_uses_vertical_extent() {
        let aligner = OrientationAligner::default();
        let alignment = aligner
            .align(Vec3::new(0.0, 1.0, 2.0), Vec3::new(0.0, -1.0, -2.0), 0.5)
            .expect("valid pair");
        assert_relative_eq!(alignment.position, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-6);
    }
}
