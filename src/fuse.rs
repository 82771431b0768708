//! Confidence weighted fusion of keypoints that describe the same body part.
//!
//! The same operation resolves several pose instances of one frame into a
//! single pose, and several frames of a time window into a single frame. The
//! asymmetric [`blend`] is the building block of the incremental smoother.

use crate::{
    error::Error,
    point::Point,
    pose::{BodyPart, FrameKeypoints, Keypoint, PoseFrame},
};
use bitvec::prelude::*;
use std::{fmt, str::FromStr};
use tracing::debug;

pub(crate) const DEFAULT_DEGENERATE_POLICY: &str = "nearest";

/// What to do with a part whose contributing detections all have zero weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DegeneratePolicy {
    /// Use the detection closest to the output slot.
    Nearest,
    /// Leave the part out of the output.
    Drop,
    /// Fail with [`Error::DegenerateFusion`].
    Fail,
}

impl Default for DegeneratePolicy {
    fn default() -> Self {
        Self::Nearest
    }
}

impl FromStr for DegeneratePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(Self::Nearest),
            "drop" => Ok(Self::Drop),
            "fail" => Ok(Self::Fail),
            other => Err(Error::ParseDegeneratePolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for DegeneratePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nearest => "nearest",
            Self::Drop => "drop",
            Self::Fail => "fail",
        })
    }
}

impl DegeneratePolicy {
    /// Resolve the outcome of a fusion, falling back to `nearest` when every
    /// weight was zero.
    pub(crate) fn resolve(
        self,
        fused: Result<Keypoint, Error>,
        nearest: Keypoint,
    ) -> Result<Option<Keypoint>, Error> {
        match fused {
            Ok(keypoint) => Ok(Some(keypoint)),
            Err(Error::DegenerateFusion(part)) => {
                debug!(message = "degenerate fusion", %part, policy = %self);
                match self {
                    Self::Nearest => Ok(Some(nearest)),
                    Self::Drop => Ok(None),
                    Self::Fail => Err(Error::DegenerateFusion(part)),
                }
            }
            Err(e) => Err(e),
        }
    }
}

/// Confidence weighted mean of `records`, all of which must describe the same
/// part.
///
/// A single record is returned as is. Otherwise the position and the score
/// are the `weights`-weighted means of the inputs; if every weight is zero the
/// fusion is degenerate and no keypoint is produced.
pub(crate) fn fuse(records: &[Keypoint], weights: &[f32]) -> Result<Keypoint, Error> {
    if records.len() != weights.len() {
        return Err(Error::FusionWeightCount(records.len(), weights.len()));
    }
    let first = records.first().ok_or(Error::EmptyFusion)?;
    let part = first.part;

    if let Some(other) = records.iter().find(|record| record.part != part) {
        return Err(Error::MixedParts(part, other.part));
    }
    if let Some(&weight) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(Error::InvalidWeight(weight));
    }

    if records.len() == 1 {
        return Ok(*first);
    }

    let total = weights.iter().copied().map(f64::from).sum::<f64>();
    if total <= 0.0 {
        return Err(Error::DegenerateFusion(part));
    }

    let weighted = || records.iter().zip(weights.iter().copied());
    let score = weighted()
        .map(|(record, weight)| f64::from(record.score) * f64::from(weight))
        .sum::<f64>()
        / total;
    let position = Point::weighted_mean(weighted().map(|(record, weight)| (record.position, weight)))
        .ok_or(Error::DegenerateFusion(part))?;

    Ok(Keypoint {
        part,
        // a weighted mean of probabilities is a probability, up to rounding
        score: (score as f32).clamp(0.0, 1.0),
        position,
    })
}

/// Fuse records using their own scores as weights.
pub(crate) fn fuse_by_score(records: &[Keypoint]) -> Result<Keypoint, Error> {
    let weights = records.iter().map(|record| record.score).collect::<Vec<_>>();
    fuse(records, &weights)
}

/// Blend a new detection into the previous estimate of the same part.
///
/// The new score is used directly as the blend coefficient: a confident
/// detection overrides the history and an unconfident one mostly keeps it.
/// The result carries the new detection's score.
pub(crate) fn blend(old: &Keypoint, new: &Keypoint) -> Keypoint {
    Keypoint {
        part: old.part,
        score: new.score,
        position: old.position.lerp(new.position, new.score),
    }
}

/// Reduce every pose instance detected in one frame to a single set of
/// keypoints.
///
/// Keypoints scoring below `min_score` are ignored. Degenerate parts fall
/// back to the instance with the highest pose score.
pub(crate) fn fuse_instances(
    instances: &[PoseFrame],
    min_score: f32,
    policy: DegeneratePolicy,
) -> Result<FrameKeypoints, Error> {
    let instances = instances
        .iter()
        .map(|instance| PoseFrame {
            score: instance.score,
            keypoints: instance.keypoints.above(min_score),
        })
        .collect::<Vec<_>>();

    let mut present = bitarr![0; crate::pose::NUM_PARTS];
    for keypoint in instances.iter().flat_map(|instance| instance.keypoints.iter()) {
        present.set(keypoint.part.idx(), true);
    }

    let mut fused = FrameKeypoints::new();
    for part in present.iter_ones().map(|idx| BodyPart::ALL[idx]) {
        let mut records = Vec::with_capacity(instances.len());
        let mut best: Option<(f32, Keypoint)> = None;

        for instance in &instances {
            if let Some(&keypoint) = instance.keypoints.get(part) {
                records.push(keypoint);
                if best.map_or(true, |(score, _)| instance.score > score) {
                    best = Some((instance.score, keypoint));
                }
            }
        }

        if let Some((_, nearest)) = best {
            if let Some(keypoint) = policy.resolve(fuse_by_score(&records), nearest)? {
                fused.insert(keypoint);
            }
        }
    }
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::{blend, fuse, fuse_by_score, fuse_instances, DegeneratePolicy};
    use crate::{
        error::Error,
        pose::{
            testing::{frame, kp},
            BodyPart::*,
            PoseFrame,
        },
    };
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn single_record_is_unchanged() {
        for &score in &[0.0, 0.3, 1.0] {
            let record = kp(Nose, score, 12.5, -3.0);
            assert_eq!(fuse(&[record], &[score]).unwrap(), record);
        }
    }

    #[test]
    fn weighted_mean() {
        let records = [kp(LeftWrist, 1.0, 0.0, 0.0), kp(LeftWrist, 0.5, 30.0, 60.0)];
        let fused = fuse(&records, &[1.0, 2.0]).unwrap();
        assert_eq!(fused.part, LeftWrist);
        assert_approx_eq!(fused.position.x(), 20.0, 1e-4);
        assert_approx_eq!(fused.position.y(), 40.0, 1e-4);
        assert_approx_eq!(fused.score, (1.0 + 0.5 * 2.0) / 3.0, 1e-4);
    }

    #[test]
    fn equal_weights_give_the_plain_mean() {
        let records = [
            kp(Nose, 0.7, 10.0, 1.0),
            kp(Nose, 0.7, 20.0, 2.0),
            kp(Nose, 0.7, 60.0, 3.0),
        ];
        let fused = fuse_by_score(&records).unwrap();
        assert_approx_eq!(fused.position.x(), 30.0, 1e-4);
        assert_approx_eq!(fused.position.y(), 2.0, 1e-4);
        assert_approx_eq!(fused.score, 0.7, 1e-4);
    }

    #[test]
    fn result_stays_within_bounding_box() {
        let records = [
            kp(LeftKnee, 0.9, 100.0, 5.0),
            kp(LeftKnee, 0.05, -40.0, 80.0),
            kp(LeftKnee, 0.0, 1000.0, 1000.0),
            kp(LeftKnee, 0.4, 3.0, -7.5),
        ];
        let fused = fuse_by_score(&records).unwrap();
        assert!((-40.0..=1000.0).contains(&fused.position.x()));
        assert!((-7.5..=1000.0).contains(&fused.position.y()));
    }

    #[test]
    fn zero_score_records_do_not_contribute() {
        let records = [kp(Nose, 0.0, 1000.0, 1000.0), kp(Nose, 0.5, 1.0, 2.0)];
        let fused = fuse_by_score(&records).unwrap();
        assert_eq!(fused.position, records[1].position);
    }

    #[test]
    fn all_zero_weights_are_degenerate() {
        let records = [kp(Nose, 0.0, 1.0, 1.0), kp(Nose, 0.0, 3.0, 3.0)];
        assert!(matches!(
            fuse_by_score(&records),
            Err(Error::DegenerateFusion(Nose))
        ));
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(fuse(&[], &[]), Err(Error::EmptyFusion)));
        assert!(matches!(
            fuse(&[kp(Nose, 1.0, 0.0, 0.0)], &[]),
            Err(Error::FusionWeightCount(1, 0))
        ));
        assert!(matches!(
            fuse_by_score(&[kp(Nose, 1.0, 0.0, 0.0), kp(LeftEye, 1.0, 0.0, 0.0)]),
            Err(Error::MixedParts(Nose, LeftEye))
        ));
        assert!(matches!(
            fuse(
                &[kp(Nose, 1.0, 0.0, 0.0), kp(Nose, 1.0, 0.0, 0.0)],
                &[1.0, -1.0]
            ),
            Err(Error::InvalidWeight(_))
        ));
        assert!(matches!(
            fuse(
                &[kp(Nose, 1.0, 0.0, 0.0), kp(Nose, 1.0, 0.0, 0.0)],
                &[1.0, f32::NAN]
            ),
            Err(Error::InvalidWeight(_))
        ));
    }

    #[test]
    fn blend_full_override_and_full_retention() {
        let old = kp(RightElbow, 0.8, 10.0, 20.0);

        let confident = kp(RightElbow, 1.0, 50.0, 60.0);
        let blended = blend(&old, &confident);
        assert_eq!(blended.position, confident.position);
        assert_eq!(blended.score, 1.0);

        let unsure = kp(RightElbow, 0.0, 50.0, 60.0);
        let blended = blend(&old, &unsure);
        assert_eq!(blended.position, old.position);
        assert_eq!(blended.score, 0.0);
    }

    #[test]
    fn blend_uses_new_score_as_coefficient() {
        let old = kp(RightElbow, 0.9, 0.0, 100.0);
        let new = kp(RightElbow, 0.25, 40.0, 0.0);
        let blended = blend(&old, &new);
        assert_eq!(blended.part, RightElbow);
        assert_approx_eq!(blended.position.x(), 10.0, 1e-4);
        assert_approx_eq!(blended.position.y(), 75.0, 1e-4);
        assert_eq!(blended.score, 0.25);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("nearest".parse::<DegeneratePolicy>().unwrap(), DegeneratePolicy::Nearest);
        assert_eq!("drop".parse::<DegeneratePolicy>().unwrap(), DegeneratePolicy::Drop);
        assert_eq!("fail".parse::<DegeneratePolicy>().unwrap(), DegeneratePolicy::Fail);
        assert!("average".parse::<DegeneratePolicy>().is_err());
        assert_eq!(DegeneratePolicy::Drop.to_string(), "drop");
    }

    #[test]
    fn instances_are_fused_per_part() {
        let a = PoseFrame {
            score: 0.9,
            keypoints: frame(&[kp(Nose, 1.0, 10.0, 10.0), kp(LeftHip, 0.5, 0.0, 0.0)]),
        };
        let b = PoseFrame {
            score: 0.4,
            keypoints: frame(&[kp(Nose, 1.0, 20.0, 30.0), kp(RightHip, 0.2, 7.0, 8.0)]),
        };
        let fused = fuse_instances(&[a, b], 0.0, DegeneratePolicy::Fail).unwrap();
        assert_eq!(fused.len(), 3);
        let nose = fused.get(Nose).unwrap();
        assert_approx_eq!(nose.position.x(), 15.0, 1e-4);
        assert_approx_eq!(nose.position.y(), 20.0, 1e-4);
        assert_eq!(fused.get(LeftHip), a.keypoints.get(LeftHip));
        assert_eq!(fused.get(RightHip), b.keypoints.get(RightHip));
    }

    #[test]
    fn instances_below_min_score_are_ignored() {
        let a = PoseFrame {
            score: 0.9,
            keypoints: frame(&[kp(Nose, 0.1, 100.0, 100.0), kp(LeftEye, 0.1, 1.0, 1.0)]),
        };
        let b = PoseFrame {
            score: 0.4,
            keypoints: frame(&[kp(Nose, 0.8, 20.0, 30.0)]),
        };
        let fused = fuse_instances(&[a, b], 0.5, DegeneratePolicy::Fail).unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused.get(Nose), b.keypoints.get(Nose));
    }

    #[test]
    fn degenerate_instances_follow_policy() {
        let a = PoseFrame {
            score: 0.3,
            keypoints: frame(&[kp(Nose, 0.0, 1.0, 1.0)]),
        };
        let b = PoseFrame {
            score: 0.6,
            keypoints: frame(&[kp(Nose, 0.0, 2.0, 2.0)]),
        };
        let instances = [a, b];

        let nearest = fuse_instances(&instances, 0.0, DegeneratePolicy::Nearest).unwrap();
        assert_eq!(nearest.get(Nose), b.keypoints.get(Nose));

        let dropped = fuse_instances(&instances, 0.0, DegeneratePolicy::Drop).unwrap();
        assert!(dropped.is_empty());

        assert!(matches!(
            fuse_instances(&instances, 0.0, DegeneratePolicy::Fail),
            Err(Error::DegenerateFusion(Nose))
        ));
    }

    #[test]
    fn no_instances_is_an_empty_frame() {
        let fused = fuse_instances(&[], 0.0, DegeneratePolicy::Fail).unwrap();
        assert!(fused.is_empty());
    }
}
