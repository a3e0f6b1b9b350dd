//! Asset bundle loading
//!
//! A bundle is loaded atomically before any rendering starts: the tracking
//! data, the mandatory `closed`/`open` mouth sprites plus any optional ones,
//! and a background layer. Background video decoding is the host's business;
//! the bundle carries the video path opaquely and renders over a poster
//! image or a pre-extracted frame sequence when one is provided.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::mouth::{MouthState, SpriteFlags};
use super::track::{TrackData, TrackError};
use crate::render::compositor::RasterImage;

/// Errors that abort a bundle load
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Missing: {0}")]
    Missing(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Bad track file: {0}")]
    Track(#[from] TrackError),
}

/// The sprites backing each mouth state. `closed` and `open` always exist;
/// lookups for missing optional shapes fall back through `open` to `closed`.
#[derive(Debug)]
pub struct SpriteSet {
    pub closed: RasterImage,
    pub open: RasterImage,
    pub half: Option<RasterImage>,
    pub e: Option<RasterImage>,
    pub u: Option<RasterImage>,
}

impl SpriteSet {
    pub fn get(&self, state: MouthState) -> &RasterImage {
        match state {
            MouthState::Closed => &self.closed,
            MouthState::Open => &self.open,
            MouthState::Half => self.half.as_ref().unwrap_or(&self.open),
            MouthState::E => self.e.as_ref().unwrap_or(&self.open),
            MouthState::U => self.u.as_ref().unwrap_or(&self.open),
        }
    }

    pub fn flags(&self) -> SpriteFlags {
        SpriteFlags {
            has_half: self.half.is_some(),
            has_e: self.e.is_some(),
            has_u: self.u.is_some(),
        }
    }
}

/// Background layer behind the mouth overlay.
#[derive(Default, Debug)]
pub enum Background {
    #[default]
    None,
    /// A single poster image
    Still(RasterImage),
    /// Pre-extracted video frames, indexed by the tracking-frame index
    Frames(Vec<RasterImage>),
}

impl Background {
    pub fn frame_at(&self, index: usize) -> Option<&RasterImage> {
        match self {
            Background::None => None,
            Background::Still(image) => Some(image),
            Background::Frames(frames) => frames.get(index % frames.len().max(1)),
        }
    }
}

/// Everything one character session needs, loaded together.
#[derive(Debug)]
pub struct AssetBundle {
    /// Opaque handle to the background video; playback/decoding is the
    /// host's responsibility.
    pub video: Option<PathBuf>,
    pub track: TrackData,
    pub sprites: SpriteSet,
    pub background: Background,
}

fn read_image(path: &Path) -> Result<RasterImage, AssetError> {
    RasterImage::from_file(path).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn read_optional_image(path: &Path) -> Result<Option<RasterImage>, AssetError> {
    if path.is_file() {
        read_image(path).map(Some)
    } else {
        Ok(None)
    }
}

impl AssetBundle {
    /// Load a bundle from a user-supplied folder:
    ///
    /// - `*mouthless*.mp4` - background video (optional, `h264` preferred)
    /// - `mouth_track.json` - tracking data (required)
    /// - `mouth/closed.png`, `mouth/open.png` - required sprites
    /// - `mouth/half.png`, `mouth/e.png`, `mouth/u.png` - optional sprites
    /// - `background.png` or `frames/` - background layer (optional)
    pub fn load_dir(dir: &Path) -> Result<Self, AssetError> {
        let video = find_video(dir);
        if let Some(v) = &video {
            log::info!("Video found: {}", v.display());
        }

        let track_path = dir.join("mouth_track.json");
        let mouth_dir = dir.join("mouth");

        let mut missing = Vec::new();
        if !track_path.is_file() {
            missing.push("mouth_track.json");
        }
        if !mouth_dir.join("closed.png").is_file() {
            missing.push("mouth/closed.png");
        }
        if !mouth_dir.join("open.png").is_file() {
            missing.push("mouth/open.png");
        }
        if !missing.is_empty() {
            return Err(AssetError::Missing(missing.join(", ")));
        }

        let track_text = std::fs::read_to_string(&track_path).map_err(|source| AssetError::Io {
            path: track_path.clone(),
            source,
        })?;
        let track = TrackData::from_json(&track_text)?;
        log::info!("Tracking: {} frames @ {} fps", track.frames.len(), track.fps);

        let sprites = SpriteSet {
            closed: read_image(&mouth_dir.join("closed.png"))?,
            open: read_image(&mouth_dir.join("open.png"))?,
            half: read_optional_image(&mouth_dir.join("half.png"))?,
            e: read_optional_image(&mouth_dir.join("e.png"))?,
            u: read_optional_image(&mouth_dir.join("u.png"))?,
        };

        let background = load_background(dir)?;

        Ok(Self {
            video,
            track,
            sprites,
            background,
        })
    }

    /// Native pixel size of the stage: background layer when present,
    /// otherwise the track's reference sprite size scaled up as a margin.
    pub fn stage_size(&self) -> (u32, u32) {
        match &self.background {
            Background::Still(image) => (image.width(), image.height()),
            Background::Frames(frames) if !frames.is_empty() => {
                (frames[0].width(), frames[0].height())
            }
            _ => {
                let [w, h] = self.track.ref_sprite_size;
                ((w.max(1.0) * 4.0) as u32, (h.max(1.0) * 4.0) as u32)
            }
        }
    }
}

fn find_video(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut fallback = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_lowercase())
            .unwrap_or_default();
        if name.contains("mouthless") && name.ends_with(".mp4") {
            if name.contains("h264") {
                return Some(path);
            }
            fallback.get_or_insert(path);
        }
    }
    fallback
}

fn load_background(dir: &Path) -> Result<Background, AssetError> {
    let poster = dir.join("background.png");
    if poster.is_file() {
        return Ok(Background::Still(read_image(&poster)?));
    }

    let frames_dir = dir.join("frames");
    if frames_dir.is_dir() {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&frames_dir)
            .map_err(|source| AssetError::Io {
                path: frames_dir.clone(),
                source,
            })?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("png") || e.eq_ignore_ascii_case("jpg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            frames.push(read_image(path)?);
        }
        if !frames.is_empty() {
            log::info!("Background: {} extracted frames", frames.len());
            return Ok(Background::Frames(frames));
        }
    }

    Ok(Background::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::track::TrackFrame;

    pub(crate) fn test_sprites(with_optional: bool) -> SpriteSet {
        SpriteSet {
            closed: RasterImage::solid(4, 2, [10, 10, 10, 255]),
            open: RasterImage::solid(4, 2, [200, 0, 0, 255]),
            half: with_optional.then(|| RasterImage::solid(4, 2, [100, 0, 0, 255])),
            e: with_optional.then(|| RasterImage::solid(4, 2, [0, 200, 0, 255])),
            u: with_optional.then(|| RasterImage::solid(4, 2, [0, 0, 200, 255])),
        }
    }

    #[test]
    fn test_sprite_lookup_falls_back_to_open() {
        let sprites = test_sprites(false);
        assert_eq!(sprites.get(MouthState::Half).pixel(0, 0), [200, 0, 0, 255]);
        assert_eq!(sprites.get(MouthState::E).pixel(0, 0), [200, 0, 0, 255]);
        assert_eq!(sprites.get(MouthState::Closed).pixel(0, 0), [10, 10, 10, 255]);

        let flags = sprites.flags();
        assert!(!flags.has_half && !flags.has_e && !flags.has_u);
    }

    #[test]
    fn test_background_frame_indexing() {
        let frames = vec![
            RasterImage::solid(2, 2, [1, 0, 0, 255]),
            RasterImage::solid(2, 2, [2, 0, 0, 255]),
        ];
        let background = Background::Frames(frames);
        assert_eq!(background.frame_at(0).unwrap().pixel(0, 0)[0], 1);
        assert_eq!(background.frame_at(1).unwrap().pixel(0, 0)[0], 2);
        assert_eq!(background.frame_at(2).unwrap().pixel(0, 0)[0], 1);

        assert!(Background::None.frame_at(0).is_none());
    }

    #[test]
    fn test_load_dir_reports_missing_files() {
        let dir = std::env::temp_dir().join("tuber-rs-test-empty-bundle");
        let _ = std::fs::create_dir_all(&dir);

        let err = AssetBundle::load_dir(&dir).unwrap_err();
        match err {
            AssetError::Missing(list) => {
                assert!(list.contains("mouth_track.json"));
                assert!(list.contains("mouth/closed.png"));
                assert!(list.contains("mouth/open.png"));
            }
            other => panic!("expected Missing, got {:?}", other),
        }
    }

    #[test]
    fn test_stage_size_from_track_reference() {
        let bundle = AssetBundle {
            video: None,
            track: TrackData {
                frames: vec![TrackFrame {
                    valid: true,
                    quad: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
                }],
                fps: 30.0,
                ref_sprite_size: [64.0, 32.0],
                calibration: None,
                calibration_applied: false,
            },
            sprites: test_sprites(true),
            background: Background::None,
        };
        assert_eq!(bundle.stage_size(), (256, 128));

        let bundle = AssetBundle {
            background: Background::Still(RasterImage::solid(320, 240, [0, 0, 0, 255])),
            ..bundle
        };
        assert_eq!(bundle.stage_size(), (320, 240));
    }
}
