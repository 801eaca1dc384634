//! Headless capture: run without a window and save PNG screenshots.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use meta_core::hardware::{SCREEN_HEIGHT, SCREEN_WIDTH, TARGET_FRAME_RATE};
use meta_core::{ButtonMask, Engine};
use thiserror::Error;

use crate::audio::{AudioRelay, CpalSink};
use crate::loader::LoadError;
use crate::scheduler::FrameScheduler;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
}

/// What a headless run does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessOptions {
    pub frames: u32,
    /// Write the last frame here.
    pub screenshot: Option<PathBuf>,
    /// Write every frame into this directory as `000001.png`, ...
    pub record: Option<PathBuf>,
}

/// Run `frames` ticks at exactly the target frame interval with neutral
/// input and no audio device. Returns the last frame.
pub fn run_headless<E: Engine>(
    factory: impl FnMut() -> E + 'static,
    program: &[u8],
    options: &HeadlessOptions,
) -> Result<Vec<u8>, CaptureError> {
    let mut scheduler = FrameScheduler::new(factory);
    // Never activated, so no device is ever opened.
    let mut audio = AudioRelay::<CpalSink>::new(|_| None);
    let mut token = scheduler
        .load(program, &mut audio)
        .map_err(LoadError::from)?;

    if let Some(dir) = &options.record {
        fs::create_dir_all(dir).map_err(|source| CaptureError::Io {
            path: dir.clone(),
            source,
        })?;
    }

    let interval = 1000.0 / f64::from(TARGET_FRAME_RATE);
    let mut buttons = ButtonMask::RELEASED;
    let mut frame = Vec::new();
    for i in 0..options.frames {
        let Some(report) = scheduler.tick(
            token,
            f64::from(i) * interval,
            &mut buttons,
            &mut frame,
            &mut audio,
        ) else {
            break;
        };
        token = report.next;

        if let Some(dir) = &options.record {
            save_png(&dir.join(format!("{:06}.png", i + 1)), &frame)?;
        }
    }

    if let Some(dir) = &options.record {
        log::info!("Recorded {} frames to {}", options.frames, dir.display());
    }
    if let Some(path) = &options.screenshot {
        save_png(path, &frame)?;
        log::info!("Screenshot saved to {}", path.display());
    }
    Ok(frame)
}

/// Save one RGBA frame as a PNG file.
pub fn save_png(path: &Path, rgba: &[u8]) -> Result<(), CaptureError> {
    let file = fs::File::create(path).map_err(|source| CaptureError::Io {
        path: path.to_owned(),
        source,
    })?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), SCREEN_WIDTH, SCREEN_HEIGHT);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcard::TestCard;
    use meta_core::EngineError;
    use meta_core::hardware::FRAME_BUFFER_LEN;

    fn options(frames: u32) -> HeadlessOptions {
        HeadlessOptions {
            frames,
            ..HeadlessOptions::default()
        }
    }

    #[test]
    fn returns_last_frame() {
        let frame = run_headless(TestCard::new, &[1], &options(3)).unwrap();
        assert_eq!(frame.len(), FRAME_BUFFER_LEN);
    }

    #[test]
    fn zero_frames_is_empty() {
        let frame = run_headless(TestCard::new, &[1], &options(0)).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn engine_rejection_is_a_load_error() {
        let err = run_headless(TestCard::new, &[], &options(1)).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Load(LoadError::Engine(EngineError::EmptyProgram))
        ));
    }

    #[test]
    fn writes_a_decodable_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let opts = HeadlessOptions {
            frames: 2,
            screenshot: Some(path.clone()),
            record: None,
        };
        let frame = run_headless(TestCard::new, &[1], &opts).unwrap();

        let decoder = png::Decoder::new(fs::File::open(&path).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (160, 128));
        assert_eq!(&buf[..info.buffer_size()], frame.as_slice());
    }

    #[test]
    fn records_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let opts = HeadlessOptions {
            frames: 3,
            screenshot: None,
            record: Some(out.clone()),
        };
        run_headless(TestCard::new, &[1], &opts).unwrap();
        for name in ["000001.png", "000002.png", "000003.png"] {
            assert!(out.join(name).exists(), "{name}");
        }
        assert!(!out.join("000004.png").exists());
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_png(&dir.path().join("missing/dir/shot.png"), &[0; FRAME_BUFFER_LEN])
            .unwrap_err();
        assert!(matches!(err, CaptureError::Io { .. }));
    }
}
