use crate::{
    error::Error,
    fuse::{fuse_by_score, DegeneratePolicy},
    pose::{BodyPart, FrameKeypoints, Keypoint, Sequence, NUM_PARTS},
};
use bitvec::prelude::*;
use tracing::{debug, instrument};

const DEFAULT_RADIUS: &str = "5";
const DEFAULT_THREADS: &str = "1";

#[derive(Debug, Clone, Copy, structopt::StructOpt)]
pub(crate) struct Windowed {
    /// Number of frames on each side of the output frame
    #[structopt(short, long, default_value = DEFAULT_RADIUS)]
    pub(crate) radius: usize,
    /// Number of worker threads
    #[structopt(short = "-j", long, default_value = DEFAULT_THREADS)]
    pub(crate) threads: usize,
}

impl Default for Windowed {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS.parse().unwrap(),
            threads: DEFAULT_THREADS.parse().unwrap(),
        }
    }
}

impl super::Smooth for Windowed {
    fn smooth(
        &self,
        sequence: &[FrameKeypoints],
        policy: DegeneratePolicy,
    ) -> Result<Sequence, Error> {
        if self.threads <= 1 {
            smooth(sequence, self.radius, policy)
        } else {
            smooth_parallel(sequence, self.radius, self.threads, policy)
        }
    }
}

/// Inclusive bounds of the window around `index`, clipped to the sequence.
fn window(index: usize, radius: usize, len: usize) -> (usize, usize) {
    (
        index.saturating_sub(radius),
        index.saturating_add(radius).min(len - 1),
    )
}

/// Fuse every part seen anywhere in the window around `index`.
fn smooth_frame(
    sequence: &[FrameKeypoints],
    index: usize,
    radius: usize,
    policy: DegeneratePolicy,
) -> Result<FrameKeypoints, Error> {
    let (start, end) = window(index, radius, sequence.len());
    let frames = &sequence[start..=end];

    let mut present = bitarr![0; NUM_PARTS];
    for keypoint in frames.iter().flat_map(FrameKeypoints::iter) {
        present.set(keypoint.part.idx(), true);
    }

    let mut smoothed = FrameKeypoints::new();
    let mut records = Vec::with_capacity(frames.len());

    for part in present.iter_ones().map(|idx| BodyPart::ALL[idx]) {
        records.clear();
        let mut nearest: Option<(usize, Keypoint)> = None;

        for (offset, frame) in frames.iter().enumerate() {
            if let Some(&keypoint) = frame.get(part) {
                records.push(keypoint);
                let distance = (start + offset).max(index) - (start + offset).min(index);
                // strict comparison keeps the earlier frame on ties
                if nearest.map_or(true, |(best, _)| distance < best) {
                    nearest = Some((distance, keypoint));
                }
            }
        }

        if let Some((_, nearest)) = nearest {
            if let Some(keypoint) = policy.resolve(fuse_by_score(&records), nearest)? {
                smoothed.insert(keypoint);
            }
        }
    }

    Ok(smoothed)
}

/// Replace every frame with the confidence weighted mean of the frames within
/// `radius` of it.
#[instrument(skip(sequence), fields(frames = sequence.len()))]
pub(crate) fn smooth(
    sequence: &[FrameKeypoints],
    radius: usize,
    policy: DegeneratePolicy,
) -> Result<Sequence, Error> {
    (0..sequence.len())
        .map(|index| smooth_frame(sequence, index, radius, policy))
        .collect()
}

/// Same as [`smooth`], with the output frames computed by `threads` workers.
#[instrument(skip(sequence), fields(frames = sequence.len()))]
pub(crate) fn smooth_parallel(
    sequence: &[FrameKeypoints],
    radius: usize,
    threads: usize,
    policy: DegeneratePolicy,
) -> Result<Sequence, Error> {
    let mut smoothed = vec![FrameKeypoints::new(); sequence.len()];
    if sequence.is_empty() {
        return Ok(smoothed);
    }

    let threads = threads.max(1);
    let chunk_size = (sequence.len() + threads - 1) / threads;
    debug!(message = "smoothing in parallel", threads, chunk_size);

    crossbeam::thread::scope(|scope| {
        let handles = smoothed
            .chunks_mut(chunk_size)
            .enumerate()
            .map(|(chunk_i, chunk)| {
                scope.spawn(move |_| {
                    let first = chunk_i * chunk_size;
                    chunk.iter_mut().enumerate().try_for_each(|(i, slot)| {
                        *slot = smooth_frame(sequence, first + i, radius, policy)?;
                        Ok::<_, Error>(())
                    })
                })
            })
            .collect::<Vec<_>>();

        handles.into_iter().try_for_each(|handle| {
            handle.join().map_err(|_| Error::SpawnWorker)?
        })
    })
    .map_err(|_| Error::SpawnWorker)??;

    Ok(smoothed)
}
