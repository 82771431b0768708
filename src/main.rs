use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;

mod analysis;
mod error;
mod estimate;
mod frames;
mod fuse;
mod point;
mod pose;
#[cfg(feature = "render")]
mod render;
mod smooth;

use crate::{
    analysis::{analysis_path, smoothed_path, Analysis, SmoothedAnalysis},
    estimate::{analyze, CommandEstimator},
    frames::{list_frames, FramePaths},
    fuse::{fuse_instances, DegeneratePolicy, DEFAULT_DEGENERATE_POLICY},
    pose::{Sequence, VideoMeta},
    smooth::{Smooth, Smoothing},
};

const DEFAULT_MIN_SCORE: &str = "0.0";
const DEFAULT_EXTENSION: &str = "jpg";
const DEFAULT_FRAME_SKIP: &str = "1";
const DEFAULT_RENDER_SKIP: &str = "3";
const DEFAULT_RENDER_THRESHOLD: &str = "0.0";

fn progress_bar(len: u64) -> ProgressBar {
    ProgressBar::new(len).with_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {bar:40} {pos}/{len} {wide_msg}"),
    )
}

/// Resolve every frame of a raw analysis to a single pose and smooth the
/// resulting sequence.
#[derive(Debug, structopt::StructOpt)]
struct SmoothOpt {
    /// Raw analysis written by `analyze-frames`: `<video>.json`
    analysis: PathBuf,

    /// Output path, defaults to `<video>.smoothed.json` next to the input.
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Detections scoring below this are discarded before fusing the poses
    /// of a frame.
    #[structopt(short, long, default_value = DEFAULT_MIN_SCORE)]
    min_score: f32,

    /// How to resolve parts whose detections all score zero: nearest, drop
    /// or fail.
    #[structopt(long, default_value = DEFAULT_DEGENERATE_POLICY)]
    on_degenerate: DegeneratePolicy,

    #[structopt(subcommand)]
    smoothing: Option<Smoothing>,
}

impl SmoothOpt {
    fn run(self) -> Result<()> {
        let analysis = Analysis::load(&self.analysis)
            .with_context(|| format!("failed loading {}", self.analysis.display()))?;

        let min_score = self.min_score;
        let policy = self.on_degenerate;
        let resolved = analysis
            .poses
            .iter()
            .map(|instances| fuse_instances(instances, min_score, policy))
            .collect::<Result<Sequence, _>>()
            .context("failed resolving pose instances")?;

        let smoothing = self.smoothing.unwrap_or_default();
        let frames = smoothing
            .smooth(&resolved, policy)
            .with_context(|| format!("{} smoothing failed", smoothing.name()))?;

        let output = match self.output {
            Some(output) => output,
            None => {
                let video = self.analysis.with_extension("");
                smoothed_path(video)
            }
        };
        SmoothedAnalysis {
            video: analysis.video,
            frames,
        }
        .save(&output)
        .with_context(|| format!("failed writing {}", output.display()))?;

        info!(
            message = "wrote smoothed analysis",
            path = %output.display(),
            mode = smoothing.name(),
            policy = %policy
        );
        Ok(())
    }
}

/// Run a pose estimator over a directory of extracted frames.
///
/// Without an estimator command the frames are only listed, in the order
/// they would be analysed.
#[derive(Debug, structopt::StructOpt)]
struct AnalyzeFramesOpt {
    /// Directory of frame images named with their frame index: `vid_12.jpg`
    dir: PathBuf,

    /// Extension of the frame images.
    #[structopt(short, long, default_value = DEFAULT_EXTENSION)]
    extension: String,

    /// Output path, defaults to `<dir>.json`.
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Frame rate of the source video.
    #[structopt(long, default_value = "30")]
    fps: f64,

    /// Only every `skip`-th source frame was extracted.
    #[structopt(long, default_value = DEFAULT_FRAME_SKIP)]
    skip: usize,

    /// Width of the frames.
    #[structopt(short, long, default_value = "0")]
    width: u32,

    /// Height of the frames.
    #[structopt(short = "-H", long, default_value = "0")]
    height: u32,

    /// Estimator command, run once per frame with the image path appended.
    /// It must print `[[pose_score, [[part_id, score, x, y], ...]], ...]`.
    #[structopt(last = true)]
    estimator: Vec<String>,
}

impl AnalyzeFramesOpt {
    fn run(self, show_progress: bool) -> Result<()> {
        let (program, args) = match self.estimator.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => {
                for (index, path) in list_frames(&self.dir, &self.extension)
                    .with_context(|| format!("failed listing {}", self.dir.display()))?
                {
                    println!("{}\t{}", index, path.display());
                }
                return Ok(());
            }
        };

        let meta = VideoMeta::subsampled(self.fps, self.skip, self.width, self.height);
        let source = FramePaths::open(&self.dir, &self.extension, meta)
            .with_context(|| format!("failed listing {}", self.dir.display()))?;

        let progress = if show_progress {
            Some(progress_bar(source.len() as u64))
        } else {
            None
        };

        let mut estimator = CommandEstimator::new(&program, args);
        let analysis = analyze(source, &mut estimator, progress.as_ref())
            .context("failed analysing frames")?;

        if let Some(progress) = progress {
            progress.finish_and_clear();
        }

        let dir = self.dir.components().as_path();
        let output = self.output.unwrap_or_else(|| analysis_path(dir));
        analysis
            .save(&output)
            .with_context(|| format!("failed writing {}", output.display()))?;
        info!(message = "wrote analysis", path = %output.display(), frames = analysis.poses.len());
        Ok(())
    }
}

/// Draw a smoothed analysis over its video.
#[derive(Debug, structopt::StructOpt)]
struct RenderOpt {
    video: PathBuf,

    /// Smoothed analysis, defaults to `<video>.smoothed.json`.
    #[structopt(short, long)]
    analysis: Option<PathBuf>,

    /// Output video, defaults to `<video>.poses.mp4`.
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Sampling rate the analysis was made with.
    #[structopt(long, default_value = DEFAULT_RENDER_SKIP)]
    skip: usize,

    /// Keypoints scoring below this are not drawn.
    #[structopt(short, long, default_value = DEFAULT_RENDER_THRESHOLD)]
    threshold: f32,
}

#[cfg(feature = "render")]
impl RenderOpt {
    fn run(self, show_progress: bool) -> Result<()> {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        };

        let video = &self.video;
        let analysis_path = self.analysis.unwrap_or_else(|| smoothed_path(video));
        let smoothed = SmoothedAnalysis::load(&analysis_path)
            .with_context(|| format!("failed loading {}", analysis_path.display()))?;

        let source = frames::VideoFrames::open(video, self.skip)
            .with_context(|| format!("failed opening {}", video.display()))?;

        let output = self.output.unwrap_or_else(|| {
            let mut name = video.clone().into_os_string();
            name.push(".poses.mp4");
            PathBuf::from(name)
        });

        let running = Arc::new(AtomicBool::new(true));
        let running_ctrl_c = running.clone();
        ctrlc::set_handler(move || {
            running_ctrl_c.store(false, Ordering::SeqCst);
        })
        .context("failed setting Ctrl-C handler")?;

        let progress = if show_progress {
            Some(progress_bar(smoothed.frames.len() as u64))
        } else {
            None
        };

        render::render(
            source,
            &smoothed.frames,
            &output,
            self.threshold,
            running,
            progress.as_ref(),
        )
        .context("failed rendering poses")?;

        if let Some(progress) = progress {
            progress.finish();
        }
        Ok(())
    }
}

#[cfg(not(feature = "render"))]
impl RenderOpt {
    fn run(self, _show_progress: bool) -> Result<()> {
        Err(anyhow::anyhow!(
            "cannot render {}: built without the `render` feature",
            self.video.display()
        ))
    }
}

#[derive(Debug, structopt::StructOpt)]
enum Command {
    Smooth(SmoothOpt),
    AnalyzeFrames(AnalyzeFramesOpt),
    Render(RenderOpt),
}

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(short, long)]
    show_progress: bool,

    #[structopt(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(opt.log_level),
    )?;

    match opt.command {
        Command::Smooth(smooth) => smooth.run(),
        Command::AnalyzeFrames(analyze) => analyze.run(opt.show_progress),
        Command::Render(render) => render.run(opt.show_progress),
    }
}
