use crate::{
    error::Error,
    fuse::{blend, DegeneratePolicy},
    pose::{BodyPart, FrameKeypoints, Sequence},
};
use std::num::NonZeroUsize;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default, structopt::StructOpt)]
pub(crate) struct Incremental {
    /// Forget the running estimate after this many consecutive frames
    /// without any detection; must be at least 1
    #[structopt(long)]
    pub(crate) reset_after: Option<NonZeroUsize>,
}

impl super::Smooth for Incremental {
    fn smooth(
        &self,
        sequence: &[FrameKeypoints],
        _policy: DegeneratePolicy,
    ) -> Result<Sequence, Error> {
        Ok(match self.reset_after {
            None => merge_sequence(sequence),
            Some(gap) => merge_sequence_with_reset(sequence, gap),
        })
    }
}

/// Fold the current frame into the running estimate.
///
/// Parts missing from `current` keep their previous estimate, parts missing
/// from `history` are adopted as detected, and parts present in both are
/// blended with the current detection's score as the coefficient.
pub(crate) fn merge(history: Option<&FrameKeypoints>, current: &FrameKeypoints) -> FrameKeypoints {
    let history = match history {
        Some(history) => history,
        None => return *current,
    };

    let mut merged = FrameKeypoints::new();
    for &part in BodyPart::ALL.iter() {
        let keypoint = match (history.get(part), current.get(part)) {
            (Some(old), Some(new)) => blend(old, new),
            (Some(old), None) => *old,
            (None, Some(new)) => *new,
            (None, None) => continue,
        };
        merged.insert(keypoint);
    }
    merged
}

/// Streaming form of [`merge`], carrying its last output forward.
#[derive(Debug, Clone, Default)]
pub(crate) struct IncrementalMerger {
    state: Option<FrameKeypoints>,
}

impl IncrementalMerger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, current: &FrameKeypoints) -> FrameKeypoints {
        let merged = merge(self.state.as_ref(), current);
        self.state = Some(merged);
        merged
    }

    pub(crate) fn reset(&mut self) {
        self.state = None;
    }
}

#[instrument(skip(sequence), fields(frames = sequence.len()))]
pub(crate) fn merge_sequence(sequence: &[FrameKeypoints]) -> Sequence {
    let mut merger = IncrementalMerger::new();
    sequence.iter().map(|frame| merger.push(frame)).collect()
}

/// Like [`merge_sequence`], but a run of `gap` empty frames drops the
/// running estimate so that a lost track is not drawn forever.
#[instrument(skip(sequence), fields(frames = sequence.len()))]
fn merge_sequence_with_reset(sequence: &[FrameKeypoints], gap: NonZeroUsize) -> Sequence {
    let mut merger = IncrementalMerger::new();
    let mut empty = 0;
    sequence
        .iter()
        .enumerate()
        .map(|(index, frame)| {
            if frame.is_empty() {
                empty += 1;
                if empty == gap.get() {
                    debug!(message = "track lost, resetting", frame = index);
                    merger.reset();
                }
            } else {
                empty = 0;
            }
            merger.push(frame)
        })
        .collect()
}
