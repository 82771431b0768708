//! On-disk form of pose analyses.
//!
//! Keypoints are stored as compact `[part_id, score, x, y]` arrays so that
//! an analysis of a long video stays small. Files live next to the video they
//! describe: `clip.mov` is analysed into `clip.mov.json`, and smoothed into
//! `clip.mov.smoothed.json`.

use crate::{
    error::Error,
    point::{round_to, Point},
    pose::{BodyPart, FrameKeypoints, Keypoint, Keypoints, PoseFrame, Sequence, VideoMeta},
};
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    ffi::OsString,
    path::{Path, PathBuf},
};
use tracing::info;

const SCORE_DECIMALS: i32 = 3;
const POSITION_DECIMALS: i32 = 2;

type CompactKeypoint = (u8, f32, f32, f32);

impl TryFrom<CompactKeypoint> for Keypoint {
    type Error = Error;

    fn try_from((id, score, x, y): CompactKeypoint) -> Result<Self, Self::Error> {
        Keypoint::new(BodyPart::from_id(id)?, score, Point::new(x, y)?)
    }
}

fn compact(keypoint: &Keypoint) -> Result<CompactKeypoint, Error> {
    let position = keypoint.position.rounded(POSITION_DECIMALS);
    Ok((
        keypoint.part.id()?,
        round_to(keypoint.score, SCORE_DECIMALS),
        position.x(),
        position.y(),
    ))
}

fn compact_keypoints(keypoints: &Keypoints) -> Result<Vec<CompactKeypoint>, Error> {
    keypoints.iter().map(compact).collect()
}

fn expand_keypoints(compact: Vec<CompactKeypoint>) -> Result<Keypoints, Error> {
    compact.into_iter().map(Keypoint::try_from).collect()
}

type CompactPose = (f32, Vec<CompactKeypoint>);

fn expand_poses(compact: Vec<CompactPose>) -> Result<Vec<PoseFrame>, Error> {
    compact
        .into_iter()
        .map(|(score, keypoints)| {
            Ok(PoseFrame {
                score,
                keypoints: expand_keypoints(keypoints)?,
            })
        })
        .collect()
}

/// Parse the poses detected in a single image, in the same compact form as
/// one frame of a raw analysis.
pub(crate) fn parse_poses(json: &str, source: &Path) -> Result<Vec<PoseFrame>, Error> {
    let compact: Vec<CompactPose> = serde_json::from_str(json)
        .map_err(|e| Error::DeserializeAnalysis(e, source.to_owned()))?;
    expand_poses(compact)
}

#[derive(Serialize, Deserialize)]
struct RawAnalysisFile {
    video: VideoMeta,
    poses: Vec<Vec<CompactPose>>,
}

#[derive(Serialize, Deserialize)]
struct SmoothedAnalysisFile {
    video: VideoMeta,
    frames: Vec<Vec<CompactKeypoint>>,
}

/// Raw estimator output: every pose detected in every sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Analysis {
    pub(crate) video: VideoMeta,
    pub(crate) poses: Vec<Vec<PoseFrame>>,
}

/// One resolved, smoothed pose per sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SmoothedAnalysis {
    pub(crate) video: VideoMeta,
    pub(crate) frames: Sequence,
}

/// `clip.mov` -> `clip.mov.json`
pub(crate) fn analysis_path<P: AsRef<Path>>(video: P) -> PathBuf {
    with_suffix(video.as_ref(), ".json")
}

/// `clip.mov` -> `clip.mov.smoothed.json`
pub(crate) fn smoothed_path<P: AsRef<Path>>(video: P) -> PathBuf {
    with_suffix(video.as_ref(), ".smoothed.json")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::ReadAnalysis(e, path.to_owned()))
}

fn write(path: &Path, contents: String) -> Result<(), Error> {
    std::fs::write(path, contents).map_err(|e| Error::WriteAnalysis(e, path.to_owned()))
}

impl Analysis {
    pub(crate) fn from_json(json: &str, source: &Path) -> Result<Self, Error> {
        let file: RawAnalysisFile = serde_json::from_str(json)
            .map_err(|e| Error::DeserializeAnalysis(e, source.to_owned()))?;
        Ok(Self {
            video: file.video,
            poses: file
                .poses
                .into_iter()
                .map(expand_poses)
                .collect::<Result<Vec<_>, Error>>()?,
        })
    }

    pub(crate) fn to_json(&self) -> Result<String, Error> {
        let poses = self
            .poses
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .map(|pose| {
                        Ok((
                            round_to(pose.score, SCORE_DECIMALS),
                            compact_keypoints(&pose.keypoints)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, Error>>()
            })
            .collect::<Result<Vec<_>, Error>>()?;
        serde_json::to_string(&RawAnalysisFile {
            video: self.video,
            poses,
        })
        .map_err(Error::SerializeAnalysis)
    }

    pub(crate) fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let analysis = Self::from_json(&read(path)?, path)?;
        info!(
            message = "loaded analysis",
            path = %path.display(),
            frames = analysis.poses.len()
        );
        Ok(analysis)
    }

    pub(crate) fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        write(path.as_ref(), self.to_json()?)
    }
}

impl SmoothedAnalysis {
    pub(crate) fn from_json(json: &str, source: &Path) -> Result<Self, Error> {
        let file: SmoothedAnalysisFile = serde_json::from_str(json)
            .map_err(|e| Error::DeserializeAnalysis(e, source.to_owned()))?;
        Ok(Self {
            video: file.video,
            frames: file
                .frames
                .into_iter()
                .map(expand_keypoints)
                .collect::<Result<Vec<FrameKeypoints>, Error>>()?,
        })
    }

    pub(crate) fn to_json(&self) -> Result<String, Error> {
        let frames = self
            .frames
            .iter()
            .map(compact_keypoints)
            .collect::<Result<Vec<_>, Error>>()?;
        serde_json::to_string(&SmoothedAnalysisFile {
            video: self.video,
            frames,
        })
        .map_err(Error::SerializeAnalysis)
    }

    pub(crate) fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        Self::from_json(&read(path)?, path)
    }

    pub(crate) fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        write(path.as_ref(), self.to_json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::{analysis_path, parse_poses, smoothed_path, Analysis, SmoothedAnalysis};
    use crate::{
        error::Error,
        pose::{
            testing::{frame, kp},
            BodyPart::*,
            PoseFrame, VideoMeta,
        },
    };
    use assert_approx_eq::assert_approx_eq;
    use std::path::{Path, PathBuf};

    fn meta() -> VideoMeta {
        VideoMeta {
            fps: 10.0,
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn paths_are_keyed_by_video_name() {
        assert_eq!(analysis_path("clips/vid1.MOV"), PathBuf::from("clips/vid1.MOV.json"));
        assert_eq!(
            smoothed_path("clips/vid1.MOV"),
            PathBuf::from("clips/vid1.MOV.smoothed.json")
        );
    }

    #[test]
    fn reads_compact_raw_analysis() {
        let json = r#"{
            "video": {"fps": 10.0, "w": 1920, "h": 1080},
            "poses": [
                [[0.5, [[0, 0.75, 100.5, 200.25], [16, 0.125, 3.0, 4.0]]], [0.25, []]],
                []
            ]
        }"#;
        let analysis = Analysis::from_json(json, Path::new("test.json")).unwrap();
        assert_eq!(analysis.video, meta());
        assert_eq!(analysis.poses.len(), 2);
        assert_eq!(analysis.poses[0].len(), 2);
        assert!(analysis.poses[1].is_empty());

        let first = &analysis.poses[0][0];
        assert_eq!(first.score, 0.5);
        assert_eq!(first.keypoints.get(Nose), Some(&kp(Nose, 0.75, 100.5, 200.25)));
        assert_eq!(first.keypoints.get(RightAnkle), Some(&kp(RightAnkle, 0.125, 3.0, 4.0)));
        assert!(analysis.poses[0][1].keypoints.is_empty());
    }

    #[test]
    fn parses_single_image_poses() {
        let poses = parse_poses(
            "[[0.5, [[9, 1.0, 4.0, 2.0]]], [0.25, []]]",
            Path::new("frame_1.jpg"),
        )
        .unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[0].keypoints.get(LeftWrist), Some(&kp(LeftWrist, 1.0, 4.0, 2.0)));
        assert!(parse_poses("[]", Path::new("frame_2.jpg")).unwrap().is_empty());
        assert!(parse_poses("nope", Path::new("frame_3.jpg")).is_err());
    }

    #[test]
    fn rejects_invalid_records() {
        let unknown_part = r#"{"video": {"fps": 1.0, "w": 1, "h": 1}, "poses": [[[1.0, [[17, 0.5, 0, 0]]]]]}"#;
        assert!(Analysis::from_json(unknown_part, Path::new("a.json")).is_err());

        let bad_score = r#"{"video": {"fps": 1.0, "w": 1, "h": 1}, "poses": [[[1.0, [[0, 1.5, 0, 0]]]]]}"#;
        assert!(Analysis::from_json(bad_score, Path::new("a.json")).is_err());

        assert!(Analysis::from_json("{", Path::new("a.json")).is_err());
    }

    #[test]
    fn rejects_coordinates_beyond_f32() {
        assert!(matches!(
            parse_poses("[[1.0, [[0, 0.0, 1e39, 0.0]]]]", Path::new("frame_1.jpg")),
            Err(Error::InfiniteCoordinate(_, "x"))
        ));
        let huge_y = r#"{"video": {"fps": 1.0, "w": 1, "h": 1}, "frames": [[[0, 1.0, 20.0, -1e39]]]}"#;
        assert!(matches!(
            SmoothedAnalysis::from_json(huge_y, Path::new("a.smoothed.json")),
            Err(Error::InfiniteCoordinate(_, "y"))
        ));
    }

    #[test]
    fn writes_rounded_values() {
        let analysis = Analysis {
            video: meta(),
            poses: vec![vec![PoseFrame {
                score: 0.87654,
                keypoints: frame(&[kp(LeftShoulder, 0.123456, 10.126, 20.0)]),
            }]],
        };
        let json = analysis.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"video":{"fps":10.0,"w":1920,"h":1080},"poses":[[[0.877,[[5,0.123,10.13,20.0]]]]]}"#
        );
        let reloaded = Analysis::from_json(&json, Path::new("a.json")).unwrap();
        let shoulder = reloaded.poses[0][0].keypoints.get(LeftShoulder).unwrap();
        assert_approx_eq!(shoulder.score, 0.123, 1e-6);
        assert_approx_eq!(shoulder.position.x(), 10.13, 1e-4);
    }

    #[test]
    fn smoothed_frames_keep_empty_frames() {
        let smoothed = SmoothedAnalysis {
            video: meta(),
            frames: vec![frame(&[kp(Nose, 0.5, 1.0, 2.0)]), frame(&[])],
        };
        let json = smoothed.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"video":{"fps":10.0,"w":1920,"h":1080},"frames":[[[0,0.5,1.0,2.0]],[]]}"#
        );
        let reloaded = SmoothedAnalysis::from_json(&json, Path::new("s.json")).unwrap();
        assert_eq!(reloaded, smoothed);
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join(format!("pose-smoother-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let video = dir.join("clip.mov");

        let analysis = Analysis {
            video: meta(),
            poses: vec![vec![], vec![PoseFrame {
                score: 0.5,
                keypoints: frame(&[kp(Nose, 0.25, 4.0, 8.0)]),
            }]],
        };
        analysis.save(analysis_path(&video)).unwrap();
        assert_eq!(Analysis::load(analysis_path(&video)).unwrap(), analysis);

        assert!(Analysis::load(dir.join("missing.json")).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
