use crate::{
    analysis::{parse_poses, Analysis},
    error::Error,
    frames::{FrameSource, Monotonic},
    pose::PoseFrame,
};
use indicatif::ProgressBar;
use ordered_float::OrderedFloat;
use std::{
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument, trace};

/// A pose detection model.
pub(crate) trait PoseEstimator {
    type Image;

    /// Every pose detected in `image`. Parts below the model's own threshold
    /// may be missing from the returned poses.
    fn estimate(&mut self, image: &Self::Image) -> Result<Vec<PoseFrame>, Error>;

    /// The highest scoring pose in `image`, if any.
    fn estimate_single(&mut self, image: &Self::Image) -> Result<Option<PoseFrame>, Error> {
        Ok(self.estimate(image)?.into_iter().max_by_key(|pose| OrderedFloat(pose.score)))
    }
}

/// An estimator living in another process.
///
/// The program is run once per frame with the image path as its last
/// argument and must print the detected poses to stdout as
/// `[[pose_score, [[part_id, score, x, y], ...]], ...]`.
#[derive(Debug, Clone)]
pub(crate) struct CommandEstimator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEstimator {
    pub(crate) fn new<P: AsRef<Path>>(program: P, args: Vec<String>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args,
        }
    }
}

impl PoseEstimator for CommandEstimator {
    type Image = PathBuf;

    fn estimate(&mut self, image: &PathBuf) -> Result<Vec<PoseFrame>, Error> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .output()
            .map_err(|e| Error::RunEstimator(e, self.program.clone()))?;

        if !output.status.success() {
            return Err(Error::EstimatorFailed(
                self.program.clone(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(message = "estimator output", image = %image.display(), bytes = stdout.len());
        parse_poses(&stdout, image)
    }
}

/// Run `estimator` over every frame of `source`, collecting the raw poses.
#[instrument(skip(source, estimator, progress))]
pub(crate) fn analyze<S, E>(
    source: S,
    estimator: &mut E,
    progress: Option<&ProgressBar>,
) -> Result<Analysis, Error>
where
    S: FrameSource,
    E: PoseEstimator<Image = S::Image>,
{
    let mut source = Monotonic::new(source);
    let video = source.meta();
    let mut poses = vec![];

    while let Some((index, image)) = source.next_frame()? {
        let detected = estimator
            .estimate(&image)
            .map_err(|e| Error::Estimate(index, Box::new(e)))?;
        debug!(
            message = "estimated poses",
            frame = index,
            poses = detected.len(),
            keypoints = detected.iter().map(|pose| pose.keypoints.len()).sum::<usize>()
        );
        poses.push(detected);

        if let Some(progress) = progress {
            progress.inc(1);
        }
    }

    info!(message = "analysed video", frames = poses.len(), fps = video.fps);
    Ok(Analysis { video, poses })
}
