use crate::{error::Error, fuse::DegeneratePolicy, pose::FrameKeypoints, pose::Sequence};

pub(crate) trait Smooth {
    /// Produce a smoothed sequence of the same length as `sequence`.
    fn smooth(&self, sequence: &[FrameKeypoints], policy: DegeneratePolicy)
        -> Result<Sequence, Error>;
}

mod incremental;
mod windowed;

#[derive(Debug, Clone, Copy, Default, structopt::StructOpt)]
pub(crate) struct Passthrough {}

impl Smooth for Passthrough {
    fn smooth(
        &self,
        sequence: &[FrameKeypoints],
        _policy: DegeneratePolicy,
    ) -> Result<Sequence, Error> {
        Ok(sequence.to_vec())
    }
}

#[derive(Debug, structopt::StructOpt)]
pub(crate) enum Smoothing {
    /// Keep the per-frame keypoints as detected
    Passthrough(Passthrough),
    /// Confidence weighted mean over a symmetric window of frames
    Windowed(windowed::Windowed),
    /// Causal blend of every frame into the running estimate
    Incremental(incremental::Incremental),
}

impl Default for Smoothing {
    fn default() -> Self {
        Self::Windowed(windowed::Windowed::default())
    }
}

impl Smoothing {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Passthrough(_) => "passthrough",
            Self::Windowed(_) => "windowed",
            Self::Incremental(_) => "incremental",
        }
    }
}

impl Smooth for Smoothing {
    fn smooth(
        &self,
        sequence: &[FrameKeypoints],
        policy: DegeneratePolicy,
    ) -> Result<Sequence, Error> {
        match self {
            Self::Passthrough(s) => s.smooth(sequence, policy),
            Self::Windowed(s) => s.smooth(sequence, policy),
            Self::Incremental(s) => s.smooth(sequence, policy),
        }
    }
}
