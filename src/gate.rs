//! Scene quality gate.
//!
//! Decides from average brightness whether a frame is worth sending to the
//! wall detector. Thresholds are configuration, never computed.

use crate::config::{GateConfig, QualityThresholds, SampleMode};
use crate::models::{Frame, QualityBand, QualitySample};

#[derive(Debug, Clone)]
pub struct QualityGate {
    thresholds: QualityThresholds,
    sample: SampleMode,
    acceptable: Vec<QualityBand>,
}

impl QualityGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            sample: config.sample,
            acceptable: config.acceptable.clone(),
        }
    }

    /// Classify a frame. Returns `None` for an empty frame.
    pub fn assess(&self, frame: &Frame) -> Option<QualitySample> {
        let mean_luminance = match self.sample {
            SampleMode::FullFrame => mean_luminance(frame)?,
            SampleMode::CenterPixel => {
                let px = frame.pixel(frame.width / 2, frame.height / 2)?;
                channel_mean(px)
            }
        };
        Some(QualitySample {
            mean_luminance,
            band: self.classify(mean_luminance),
        })
    }

    pub fn classify(&self, mean_luminance: f32) -> QualityBand {
        let t = &self.thresholds;
        if mean_luminance < t.too_dark_below {
            QualityBand::TooDark
        } else if mean_luminance < t.fair_below {
            QualityBand::Fair
        } else if mean_luminance < t.good_below {
            QualityBand::Good
        } else {
            QualityBand::TooBright
        }
    }

    pub fn is_acceptable(&self, band: QualityBand) -> bool {
        self.acceptable.contains(&band)
    }
}

/// Mean of the RGB channel values over every pixel, 0-255.
pub fn mean_luminance(frame: &Frame) -> Option<f32> {
    if frame.is_empty() {
        return None;
    }
    let sum: u64 = frame
        .rgba
        .chunks_exact(4)
        .map(|px| px[0] as u64 + px[1] as u64 + px[2] as u64)
        .sum();
    let samples = frame.width as u64 * frame.height as u64 * 3;
    Some(sum as f32 / samples as f32)
}

fn channel_mean(px: [u8; 4]) -> f32 {
    (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0
}
