//! Mouth-tracking data
//!
//! One [`TrackFrame`] per background-video frame: a 4-point quadrilateral in
//! frame pixel coordinates, or `valid: false` when the mouth is occluded.
//! The video loops, so frame lookup wraps modulo the track length.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing a track file
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Malformed track JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Track contains no frames")]
    Empty,

    #[error("Track fps must be positive (got {0})")]
    BadFps(f64),
}

/// Tracked mouth region for a single video frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackFrame {
    /// `false` means the mouth is fully occluded; the overlay is skipped
    /// and the video's own closed mouth shows through.
    pub valid: bool,
    pub quad: [[f64; 2]; 4],
}

/// Rigid adjustment applied to every quad about its centroid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calibration {
    pub offset: [f64; 2],
    pub scale: f64,
    /// Degrees
    pub rotation: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

/// Per-frame tracking data for one background video
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub frames: Vec<TrackFrame>,
    pub fps: f64,
    pub ref_sprite_size: [f64; 2],
    #[serde(default)]
    pub calibration: Option<Calibration>,
    #[serde(default)]
    pub calibration_applied: bool,
}

impl TrackData {
    /// Parse and validate a track file.
    pub fn from_json(text: &str) -> Result<Self, TrackError> {
        let data: TrackData = serde_json::from_str(text)?;
        if data.frames.is_empty() {
            return Err(TrackError::Empty);
        }
        if !(data.fps > 0.0) {
            return Err(TrackError::BadFps(data.fps));
        }
        Ok(data)
    }

    /// Tracking-frame index for a playback time, wrapping at the track
    /// length because the video loops.
    pub fn frame_index(&self, playback_seconds: f64) -> usize {
        let t = playback_seconds.max(0.0);
        (t * self.fps).floor() as usize % self.frames.len()
    }

    pub fn frame(&self, index: usize) -> &TrackFrame {
        &self.frames[index % self.frames.len()]
    }

    /// Quad for a frame with the calibration transform applied: scale and
    /// rotate about the quad centroid, then translate. The quad is used
    /// verbatim unless `calibration_applied` is set.
    pub fn adjusted_quad(&self, frame: &TrackFrame) -> [[f64; 2]; 4] {
        if !self.calibration_applied {
            return frame.quad;
        }
        let calib = self.calibration.clone().unwrap_or_default();

        let (mut cx, mut cy) = (0.0, 0.0);
        for [x, y] in &frame.quad {
            cx += x;
            cy += y;
        }
        cx /= 4.0;
        cy /= 4.0;

        let rotation = calib.rotation.to_radians();
        let (sin, cos) = rotation.sin_cos();

        frame.quad.map(|[x, y]| {
            let dx = (x - cx) * calib.scale;
            let dy = (y - cy) * calib.scale;
            [
                dx * cos - dy * sin + cx + calib.offset[0],
                dx * sin + dy * cos + cy + calib.offset[1],
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(frame_count: usize, fps: f64) -> TrackData {
        TrackData {
            frames: (0..frame_count)
                .map(|i| TrackFrame {
                    valid: true,
                    quad: [
                        [i as f64, 0.0],
                        [i as f64 + 10.0, 0.0],
                        [i as f64 + 10.0, 10.0],
                        [i as f64, 10.0],
                    ],
                })
                .collect(),
            fps,
            ref_sprite_size: [32.0, 16.0],
            calibration: None,
            calibration_applied: false,
        }
    }

    #[test]
    fn test_parse_track_json() {
        let json = r#"{
            "frames": [
                {"valid": true, "quad": [[0,0],[10,0],[10,10],[0,10]]},
                {"valid": false, "quad": [[0,0],[0,0],[0,0],[0,0]]}
            ],
            "fps": 30,
            "refSpriteSize": [64, 32],
            "calibration": {"offset": [1, -2], "scale": 1.5, "rotation": 90},
            "calibrationApplied": true
        }"#;
        let data = TrackData::from_json(json).unwrap();
        assert_eq!(data.frames.len(), 2);
        assert!(!data.frames[1].valid);
        assert_eq!(data.fps, 30.0);
        assert!(data.calibration_applied);
        assert_eq!(data.calibration.as_ref().unwrap().rotation, 90.0);
    }

    #[test]
    fn test_parse_without_calibration() {
        let json = r#"{
            "frames": [{"valid": true, "quad": [[0,0],[1,0],[1,1],[0,1]]}],
            "fps": 24,
            "refSpriteSize": [8, 8]
        }"#;
        let data = TrackData::from_json(json).unwrap();
        assert!(data.calibration.is_none());
        assert!(!data.calibration_applied);
    }

    #[test]
    fn test_reject_empty_frames() {
        let json = r#"{"frames": [], "fps": 30, "refSpriteSize": [8, 8]}"#;
        assert!(matches!(TrackData::from_json(json), Err(TrackError::Empty)));
    }

    #[test]
    fn test_reject_bad_fps() {
        let json = r#"{
            "frames": [{"valid": true, "quad": [[0,0],[1,0],[1,1],[0,1]]}],
            "fps": 0,
            "refSpriteSize": [8, 8]
        }"#;
        assert!(matches!(
            TrackData::from_json(json),
            Err(TrackError::BadFps(_))
        ));
    }

    #[test]
    fn test_reject_wrong_quad_arity() {
        // Five points per quad is out of contract
        let json = r#"{
            "frames": [{"valid": true, "quad": [[0,0],[1,0],[1,1],[0,1],[2,2]]}],
            "fps": 30,
            "refSpriteSize": [8, 8]
        }"#;
        assert!(matches!(
            TrackData::from_json(json),
            Err(TrackError::Parse(_))
        ));
    }

    #[test]
    fn test_frame_index_wraps_and_is_periodic() {
        let data = track(100, 30.0);
        assert_eq!(data.frame_index(0.0), 0);
        assert_eq!(data.frame_index(0.35), 10);

        let period = data.frames.len() as f64 / data.fps;
        for &t in &[0.0, 0.35, 1.2, 3.01, 7.77] {
            assert_eq!(data.frame_index(t), data.frame_index(t + period), "t={}", t);
        }
    }

    #[test]
    fn test_frame_index_clamps_negative_time() {
        let data = track(10, 30.0);
        assert_eq!(data.frame_index(-5.0), 0);
    }

    #[test]
    fn test_quad_verbatim_without_calibration_flag() {
        let mut data = track(1, 30.0);
        data.calibration = Some(Calibration {
            offset: [100.0, 100.0],
            scale: 2.0,
            rotation: 45.0,
        });
        // calibration present but not applied
        let frame = data.frames[0].clone();
        assert_eq!(data.adjusted_quad(&frame), frame.quad);
    }

    #[test]
    fn test_calibration_offset_and_scale() {
        let mut data = track(1, 30.0);
        data.frames[0].quad = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        data.calibration = Some(Calibration {
            offset: [10.0, 0.0],
            scale: 2.0,
            rotation: 0.0,
        });
        data.calibration_applied = true;

        let frame = data.frames[0].clone();
        let quad = data.adjusted_quad(&frame);
        // Centroid (1,1); doubled about it, then shifted +10 in x
        assert_eq!(quad[0], [-1.0 + 10.0, -1.0]);
        assert_eq!(quad[2], [3.0 + 10.0, 3.0]);
    }

    #[test]
    fn test_calibration_rotation_about_centroid() {
        let mut data = track(1, 30.0);
        data.frames[0].quad = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        data.calibration = Some(Calibration {
            offset: [0.0, 0.0],
            scale: 1.0,
            rotation: 90.0,
        });
        data.calibration_applied = true;

        let frame = data.frames[0].clone();
        let quad = data.adjusted_quad(&frame);
        // (0,0) rotates 90 degrees about (1,1) onto (2,0)
        assert!((quad[0][0] - 2.0).abs() < 1e-9);
        assert!(quad[0][1].abs() < 1e-9);
    }
}
