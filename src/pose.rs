use crate::{error::Error, point::Point};
use num_traits::{FromPrimitive, ToPrimitive};
use std::{fmt, str::FromStr};

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, num_derive::FromPrimitive, num_derive::ToPrimitive,
)]
pub(crate) enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub(crate) const NUM_PARTS: usize = 17;

impl BodyPart {
    pub(crate) const ALL: [BodyPart; NUM_PARTS] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    /// Index of the part in the fixed serialization order.
    pub(crate) fn idx(self) -> usize {
        self as usize
    }

    pub(crate) fn id(self) -> Result<u8, Error> {
        self.to_u8().ok_or(Error::BodyPartToId(self))
    }

    pub(crate) fn from_id(id: u8) -> Result<Self, Error> {
        Self::from_u8(id).ok_or(Error::UnknownBodyPartId(id))
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "leftEye",
            Self::RightEye => "rightEye",
            Self::LeftEar => "leftEar",
            Self::RightEar => "rightEar",
            Self::LeftShoulder => "leftShoulder",
            Self::RightShoulder => "rightShoulder",
            Self::LeftElbow => "leftElbow",
            Self::RightElbow => "rightElbow",
            Self::LeftWrist => "leftWrist",
            Self::RightWrist => "rightWrist",
            Self::LeftHip => "leftHip",
            Self::RightHip => "rightHip",
            Self::LeftKnee => "leftKnee",
            Self::RightKnee => "rightKnee",
            Self::LeftAnkle => "leftAnkle",
            Self::RightAnkle => "rightAnkle",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BodyPart {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|part| part.name() == s)
            .ok_or_else(|| Error::UnknownBodyPartName(s.to_owned()))
    }
}

/// One detection of one body part.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Keypoint {
    pub(crate) part: BodyPart,
    pub(crate) score: f32,
    pub(crate) position: Point,
}

impl Keypoint {
    pub(crate) fn new(part: BodyPart, score: f32, position: Point) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::ScoreOutOfRange(part, score));
        }
        Ok(Self {
            part,
            score,
            position,
        })
    }
}

/// Body part to keypoint mapping. Parts that were not detected are `None`.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub(crate) struct Keypoints([Option<Keypoint>; NUM_PARTS]);

/// The resolved keypoints of a single output frame.
pub(crate) type FrameKeypoints = Keypoints;

/// An ordered list of resolved frames.
pub(crate) type Sequence = Vec<FrameKeypoints>;

impl Keypoints {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, part: BodyPart) -> Option<&Keypoint> {
        self.0[part.idx()].as_ref()
    }

    /// Insert a keypoint under its own part, returning the one it replaced.
    pub(crate) fn insert(&mut self, keypoint: Keypoint) -> Option<Keypoint> {
        self.0[keypoint.part.idx()].replace(keypoint)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Keypoint> + '_ {
        self.0.iter().filter_map(Option::as_ref)
    }

    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Drop every keypoint scoring below `min_score`.
    pub(crate) fn above(&self, min_score: f32) -> Self {
        let mut out = Self::new();
        for keypoint in self.iter().filter(|keypoint| keypoint.score >= min_score) {
            out.insert(*keypoint);
        }
        out
    }
}

impl std::iter::FromIterator<Keypoint> for Keypoints {
    fn from_iter<I: IntoIterator<Item = Keypoint>>(iter: I) -> Self {
        let mut keypoints = Self::new();
        for keypoint in iter {
            keypoints.insert(keypoint);
        }
        keypoints
    }
}

/// One detected pose instance in one image.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub(crate) struct PoseFrame {
    pub(crate) score: f32,
    pub(crate) keypoints: Keypoints,
}

/// Frame rate and dimensions of the analysed video, after frame skipping.
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct VideoMeta {
    pub(crate) fps: f64,
    #[serde(rename = "w")]
    pub(crate) width: u32,
    #[serde(rename = "h")]
    pub(crate) height: u32,
}

impl VideoMeta {
    /// Metadata of a video sampled every `skip` frames.
    pub(crate) fn subsampled(source_fps: f64, skip: usize, width: u32, height: u32) -> Self {
        Self {
            fps: source_fps / skip.max(1) as f64,
            width,
            height,
        }
    }
}

pub(crate) mod constants {
    use crate::pose::BodyPart::{self, *};

    pub(crate) const SKELETON_EDGES: [(BodyPart, BodyPart); 12] = [
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftShoulder, RightShoulder),
        (LeftHip, RightHip),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
    ];
}
