use crate::{error::Error, pose::VideoMeta};
use std::path::{Path, PathBuf};

/// An ordered stream of sampled video frames.
pub(crate) trait FrameSource {
    type Image;

    /// Frame rate and dimensions of the sampled stream.
    fn meta(&self) -> VideoMeta;

    /// The next `(frame_index, image)` pair, or `None` at the end of the
    /// stream. Frame indices are strictly increasing.
    fn next_frame(&mut self) -> Result<Option<(usize, Self::Image)>, Error>;
}

/// The last run of ASCII digits in the file stem: `vid1_12.jpg` -> 12.
pub(crate) fn frame_index<P: AsRef<Path>>(path: P) -> Option<usize> {
    let stem = path.as_ref().file_stem()?.to_str()?;
    let end = stem.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = stem[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    stem[start..end].parse().ok()
}

/// Order frame files by their embedded frame index rather than by name, so
/// that `frame_10` comes after `frame_9`.
pub(crate) fn sort_frame_paths(paths: Vec<PathBuf>) -> Result<Vec<(usize, PathBuf)>, Error> {
    let mut indexed = paths
        .into_iter()
        .map(|path| match frame_index(&path) {
            Some(index) => Ok((index, path)),
            None => Err(Error::MissingFrameIndex(path)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|&(index, _)| index);
    Ok(indexed)
}

/// Every file in `dir` with extension `extension`, in frame order.
pub(crate) fn list_frames<P: AsRef<Path>>(
    dir: P,
    extension: &str,
) -> Result<Vec<(usize, PathBuf)>, Error> {
    let dir = dir.as_ref();
    let mut paths = vec![];
    for entry in std::fs::read_dir(dir).map_err(|e| Error::ReadFrameDir(e, dir.to_owned()))? {
        let path = entry
            .map_err(|e| Error::ReadFrameDir(e, dir.to_owned()))?
            .path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            paths.push(path);
        }
    }
    sort_frame_paths(paths)
}

/// Extracted frame files in a directory, yielded as paths in frame order.
pub(crate) struct FramePaths {
    frames: std::vec::IntoIter<(usize, PathBuf)>,
    meta: VideoMeta,
}

impl FramePaths {
    pub(crate) fn open<P: AsRef<Path>>(
        dir: P,
        extension: &str,
        meta: VideoMeta,
    ) -> Result<Self, Error> {
        Ok(Self {
            frames: list_frames(dir, extension)?.into_iter(),
            meta,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for FramePaths {
    type Image = PathBuf;

    fn meta(&self) -> VideoMeta {
        self.meta
    }

    fn next_frame(&mut self) -> Result<Option<(usize, PathBuf)>, Error> {
        Ok(self.frames.next())
    }
}

/// Wraps a source and checks that frame indices strictly increase.
pub(crate) struct Monotonic<S> {
    inner: S,
    last: Option<usize>,
}

impl<S> Monotonic<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self { inner, last: None }
    }
}

impl<S: FrameSource> FrameSource for Monotonic<S> {
    type Image = S::Image;

    fn meta(&self) -> VideoMeta {
        self.inner.meta()
    }

    fn next_frame(&mut self) -> Result<Option<(usize, Self::Image)>, Error> {
        let next = self.inner.next_frame()?;
        if let Some((index, _)) = &next {
            if let Some(last) = self.last {
                if *index <= last {
                    return Err(Error::NonMonotonicFrame(*index, last));
                }
            }
            self.last = Some(*index);
        }
        Ok(next)
    }
}

#[cfg(feature = "render")]
pub(crate) use self::video::VideoFrames;

#[cfg(feature = "render")]
mod video {
    use super::FrameSource;
    use crate::{error::Error, pose::VideoMeta};
    use num_traits::ToPrimitive;
    use opencv::{
        core::Mat,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
    };
    use std::path::Path;
    use tracing::info;

    /// Every `skip`-th frame of a video file.
    pub(crate) struct VideoFrames {
        capture: VideoCapture,
        skip: usize,
        position: usize,
        meta: VideoMeta,
    }

    fn to_u32(value: f64) -> Result<u32, Error> {
        value.to_u32().ok_or(Error::ConvertToU32(value))
    }

    impl VideoFrames {
        pub(crate) fn open<P: AsRef<Path>>(path: P, skip: usize) -> Result<Self, Error> {
            let path = path.as_ref();
            let name = path
                .to_str()
                .ok_or_else(|| Error::OpenVideo(path.to_owned()))?;
            let capture = VideoCapture::from_file(name, CAP_ANY)
                .map_err(|_| Error::OpenVideo(path.to_owned()))?;
            if !capture
                .is_opened()
                .map_err(|_| Error::OpenVideo(path.to_owned()))?
            {
                return Err(Error::OpenVideo(path.to_owned()));
            }

            let get = |prop| capture.get(prop).map_err(Error::GetCaptureProperty);
            let fps = get(CAP_PROP_FPS)?;
            let width = to_u32(get(CAP_PROP_FRAME_WIDTH)?)?;
            let height = to_u32(get(CAP_PROP_FRAME_HEIGHT)?)?;
            let skip = skip.max(1);
            info!(message = "opened video", path = %path.display(), fps, width, height, skip);

            Ok(Self {
                capture,
                skip,
                position: 0,
                meta: VideoMeta::subsampled(fps, skip, width, height),
            })
        }
    }

    impl FrameSource for VideoFrames {
        type Image = Mat;

        fn meta(&self) -> VideoMeta {
            self.meta
        }

        fn next_frame(&mut self) -> Result<Option<(usize, Mat)>, Error> {
            let mut frame = Mat::default();
            loop {
                if !self.capture.read(&mut frame).map_err(Error::ReadFrame)? {
                    return Ok(None);
                }
                let index = self.position;
                self.position += 1;
                if index % self.skip == 0 {
                    return Ok(Some((index, frame)));
                }
            }
        }
    }
}
