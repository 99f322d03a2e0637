//! Verdict logic behind the development detector service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::GateConfig;
use crate::gate::QualityGate;
use crate::models::Frame;

/// How the stub decides whether an image shows a wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DetectorPolicy {
    Always,
    Never,
    /// Wall on every second request, starting with the second.
    Alternate,
    /// Wall when the image's mean luminance falls in an acceptable band.
    Brightness,
}

/// Deterministic stand-in for the remote wall classifier.
#[derive(Debug, Clone)]
pub struct StubDetector {
    policy: DetectorPolicy,
    gate: Arc<QualityGate>,
    requests: Arc<AtomicU64>,
}

impl StubDetector {
    pub fn new(policy: DetectorPolicy) -> Self {
        Self::with_gate(policy, &GateConfig::default())
    }

    pub fn with_gate(policy: DetectorPolicy, gate: &GateConfig) -> Self {
        Self {
            policy,
            gate: Arc::new(QualityGate::new(gate)),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Requests classified so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Classify an encoded image. Undecodable bytes are an error.
    pub fn classify(&self, image_bytes: &[u8]) -> Result<bool, image::ImageError> {
        let decoded = image::load_from_memory(image_bytes)?.to_rgba8();
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        let verdict = match self.policy {
            DetectorPolicy::Always => true,
            DetectorPolicy::Never => false,
            DetectorPolicy::Alternate => count % 2 == 0,
            DetectorPolicy::Brightness => {
                let (width, height) = decoded.dimensions();
                Frame::from_rgba(width, height, decoded.into_raw())
                    .and_then(|frame| self.gate.assess(&frame))
                    .map(|sample| self.gate.is_acceptable(sample.band))
                    .unwrap_or(false)
            }
        };
        tracing::debug!(policy = ?self.policy, count, verdict, "Classified image");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::encode_jpeg;

    fn jpeg(level: u8) -> Vec<u8> {
        encode_jpeg(&Frame::solid(8, 8, [level, level, level, 255]), 90)
            .unwrap()
            .bytes
    }

    #[test]
    fn alternate_starts_with_no_wall() {
        let detector = StubDetector::new(DetectorPolicy::Alternate);
        let image = jpeg(128);
        assert!(!detector.classify(&image).unwrap());
        assert!(detector.classify(&image).unwrap());
        assert!(!detector.classify(&image).unwrap());
        assert_eq!(detector.requests(), 3);
    }

    #[test]
    fn brightness_follows_the_quality_bands() {
        let detector = StubDetector::new(DetectorPolicy::Brightness);
        assert!(detector.classify(&jpeg(128)).unwrap());
        assert!(!detector.classify(&jpeg(5)).unwrap());
        assert!(!detector.classify(&jpeg(250)).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        let detector = StubDetector::new(DetectorPolicy::Always);
        assert!(detector.classify(b"not an image").is_err());
        assert_eq!(detector.requests(), 0);
    }
}
