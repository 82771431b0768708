use crate::pose::BodyPart;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to construct NotNan from {1} coordinate")]
    NotANumber(#[source] ordered_float::FloatIsNan, &'static str),

    #[error("{1} coordinate must be finite, got {0}")]
    InfiniteCoordinate(f32, &'static str),

    #[error("score for {0} must be within [0, 1], got {1}")]
    ScoreOutOfRange(BodyPart, f32),

    #[error("failed to convert body part to id: {0:?}")]
    BodyPartToId(BodyPart),

    #[error("unknown body part id: {0}")]
    UnknownBodyPartId(u8),

    #[error("unknown body part name: {0}")]
    UnknownBodyPartName(String),

    #[error("cannot fuse an empty set of keypoints")]
    EmptyFusion,

    #[error("expected {0} fusion weights, got {1}")]
    FusionWeightCount(usize, usize),

    #[error("cannot fuse keypoints of different parts: {0} and {1}")]
    MixedParts(BodyPart, BodyPart),

    #[error("fusion weight must be finite and non-negative, got {0}")]
    InvalidWeight(f32),

    #[error("all fusion weights for {0} are zero")]
    DegenerateFusion(BodyPart),

    #[error("unknown degenerate fusion policy: {0}")]
    ParseDegeneratePolicy(String),

    #[error("failed to spawn smoothing worker")]
    SpawnWorker,

    #[error("failed to read analysis file: {1:?}")]
    ReadAnalysis(#[source] std::io::Error, std::path::PathBuf),

    #[error("failed to write analysis file: {1:?}")]
    WriteAnalysis(#[source] std::io::Error, std::path::PathBuf),

    #[error("failed to deserialize analysis: {1:?}")]
    DeserializeAnalysis(#[source] serde_json::Error, std::path::PathBuf),

    #[error("failed to serialize analysis")]
    SerializeAnalysis(#[source] serde_json::Error),

    #[error("failed to read frame directory: {1:?}")]
    ReadFrameDir(#[source] std::io::Error, std::path::PathBuf),

    #[error("frame file has no numeric frame index: {0:?}")]
    MissingFrameIndex(std::path::PathBuf),

    #[error("frame index {0} is not after previous frame index {1}")]
    NonMonotonicFrame(usize, usize),

    #[error("pose estimator failed on frame {0}")]
    Estimate(usize, #[source] Box<Error>),

    #[error("failed to run pose estimator {1:?}")]
    RunEstimator(#[source] std::io::Error, std::path::PathBuf),

    #[error("pose estimator {0:?} exited with {1}: {2}")]
    EstimatorFailed(std::path::PathBuf, std::process::ExitStatus, String),

    #[cfg(feature = "render")]
    #[error("failed to open video: {0:?}")]
    OpenVideo(std::path::PathBuf),

    #[cfg(feature = "render")]
    #[error("failed to query video capture property")]
    GetCaptureProperty(#[source] opencv::Error),

    #[cfg(feature = "render")]
    #[error("failed reading frame")]
    ReadFrame(#[source] opencv::Error),

    #[cfg(feature = "render")]
    #[error("failed to convert {0} to i32")]
    ConvertToI32(f64),

    #[cfg(feature = "render")]
    #[error("failed to convert {0} to u32")]
    ConvertToU32(f64),

    #[cfg(feature = "render")]
    #[error("failed to draw line")]
    DrawLine(#[source] opencv::Error),

    #[cfg(feature = "render")]
    #[error("failed to draw circle")]
    DrawCircle(#[source] opencv::Error),

    #[cfg(feature = "render")]
    #[error("failed to open video writer for {0:?}")]
    OpenVideoWriter(std::path::PathBuf),

    #[cfg(feature = "render")]
    #[error("failed to construct video writer")]
    MakeVideoWriter(#[source] opencv::Error),

    #[cfg(feature = "render")]
    #[error("failed to write frame")]
    WriteFrame(#[source] opencv::Error),
}
