use crate::{
    error::Error,
    frames::{FrameSource, VideoFrames},
    pose::{constants::SKELETON_EDGES, FrameKeypoints, NUM_PARTS},
};
use indicatif::ProgressBar;
use num_traits::ToPrimitive;
use opencv::{
    core::{Mat, Point as CvPoint, Scalar, Size},
    imgproc::{FILLED, LINE_8},
    prelude::*,
    videoio::VideoWriter,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{info, instrument, warn};

const KEYPOINT_RADIUS: i32 = 5;
const EDGE_THICKNESS: i32 = 2;

const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
const YELLOW: (f64, f64, f64) = (0.0, 255.0, 255.0);

fn to_i32(value: f32) -> Result<i32, Error> {
    value
        .round()
        .to_i32()
        .ok_or_else(|| Error::ConvertToI32(f64::from(value)))
}

/// Pixel positions of the keypoints at or above `threshold`, indexed by part.
fn visible(keypoints: &FrameKeypoints, threshold: f32) -> Result<[Option<CvPoint>; NUM_PARTS], Error> {
    let mut points = [None; NUM_PARTS];
    for keypoint in keypoints.iter().filter(|kp| kp.score >= threshold) {
        let position = keypoint.position;
        points[keypoint.part.idx()] = Some(CvPoint::new(to_i32(position.x())?, to_i32(position.y())?));
    }
    Ok(points)
}

/// Draw a dot per visible keypoint and a segment per skeletal edge whose
/// endpoints are both visible.
pub(crate) fn draw_skeleton(
    frame: &mut Mat,
    keypoints: &FrameKeypoints,
    threshold: f32,
) -> Result<(), Error> {
    let points = visible(keypoints, threshold)?;

    for (a, b) in SKELETON_EDGES.iter() {
        if let (Some(a), Some(b)) = (points[a.idx()], points[b.idx()]) {
            opencv::imgproc::line(
                frame,
                a,
                b,
                Scalar::from(YELLOW),
                EDGE_THICKNESS,
                LINE_8,
                0, // shift
            )
            .map_err(Error::DrawLine)?;
        }
    }

    points.iter().flatten().try_for_each(|&point| {
        opencv::imgproc::circle(
            frame,
            point,
            KEYPOINT_RADIUS,
            Scalar::from(GREEN),
            FILLED,
            LINE_8,
            0, // shift
        )
        .map_err(Error::DrawCircle)
    })
}

fn open_writer(path: &Path, fps: f64, width: u32, height: u32) -> Result<VideoWriter, Error> {
    let name = path
        .to_str()
        .ok_or_else(|| Error::OpenVideoWriter(path.to_owned()))?;
    let size = Size::new(
        width.to_i32().ok_or(Error::ConvertToI32(f64::from(width)))?,
        height.to_i32().ok_or(Error::ConvertToI32(f64::from(height)))?,
    );
    let fourcc = i32::from_le_bytes(*b"mp4v");
    let writer =
        VideoWriter::new(name, fourcc, fps, size, true).map_err(Error::MakeVideoWriter)?;
    if !writer
        .is_opened()
        .map_err(|_| Error::OpenVideoWriter(path.to_owned()))?
    {
        return Err(Error::OpenVideoWriter(path.to_owned()));
    }
    Ok(writer)
}

/// Overlay `frames` on the sampled frames of `source` and encode the result
/// at the sampled frame rate.
///
/// Stops early when `running` is cleared, returning the number of frames
/// written.
#[instrument(skip(source, frames, running, progress), fields(frames = frames.len()))]
pub(crate) fn render<P: AsRef<Path> + std::fmt::Debug>(
    mut source: VideoFrames,
    frames: &[FrameKeypoints],
    output: P,
    threshold: f32,
    running: Arc<AtomicBool>,
    progress: Option<&ProgressBar>,
) -> Result<usize, Error> {
    let meta = source.meta();
    let mut writer = open_writer(output.as_ref(), meta.fps, meta.width, meta.height)?;
    let mut remaining = frames.iter();
    let mut written = 0;

    while running.load(Ordering::SeqCst) {
        let (index, mut image) = match source.next_frame()? {
            Some(frame) => frame,
            None => break,
        };
        let keypoints = match remaining.next() {
            Some(keypoints) => keypoints,
            None => {
                warn!(message = "video has more sampled frames than the analysis", frame = index);
                break;
            }
        };

        draw_skeleton(&mut image, keypoints, threshold)?;
        writer.write(&image).map_err(Error::WriteFrame)?;
        written += 1;

        if let Some(progress) = progress {
            progress.inc(1);
        }
    }

    if written < frames.len() {
        warn!(message = "rendered fewer frames than analysed", written, analysed = frames.len());
    }
    info!(message = "rendered video", written, fps = meta.fps);
    Ok(written)
}
