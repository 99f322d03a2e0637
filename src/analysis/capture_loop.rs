use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::WallVerdict;
use crate::config::{CaptureConfig, TriggerPolicy};
use crate::error::{AnalysisError, EncodeError};
use crate::gate::QualityGate;
use crate::models::{
    AttemptResult, CaptureAttempt, Frame, ImagePayload, QualityBand, QualitySample,
};

const HISTORY_LIMIT: usize = 32;

/// `Stopped -> Scheduled -> Capturing -> Awaiting -> {Scheduled | Placing}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Scheduled,
    Capturing,
    Awaiting { sequence: u64, since: Instant },
    /// Terminal: a wall was found and the model is being placed.
    Placing,
}

/// What the render side could provide when a tick fired.
#[derive(Debug)]
pub enum FrameCapture {
    NoRenderer,
    NotReady,
    Failed(String),
    Ready(Frame),
}

/// How the driver should arm the timer after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    Repeating(Duration),
    Once(Duration),
    AlreadyRunning,
    Finished,
}

#[derive(Debug)]
pub enum TickDecision {
    /// Loop is stopped or already placing.
    Inactive,
    /// A request is still in flight.
    Suppressed,
    /// The in-flight attempt exceeded the request timeout and was abandoned.
    TimedOut { sequence: u64 },
    RendererMissing,
    CaptureFailed { sequence: u64 },
    /// Gate rejected the frame; no network I/O this tick.
    Skipped { sequence: u64, band: Option<QualityBand> },
    /// Send this attempt to the detector.
    Dispatch { sequence: u64, payload: ImagePayload },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseDecision {
    /// Superseded, torn down or otherwise irrelevant; drop it.
    Stale,
    WallDetected,
    NoWall { retry: bool },
    TransportError { error: AnalysisError, retry: bool },
}

/// The capture-analyze scheduler as a pure state machine.
///
/// It owns sequencing and the ordering rule: only the response to the latest
/// dispatched attempt may drive a transition. Timers and network calls are
/// the driver's business.
#[derive(Debug)]
pub struct CaptureLoop {
    policy: TriggerPolicy,
    period: Duration,
    request_timeout: Duration,
    state: LoopState,
    last_sequence: u64,
    latest_dispatched: Option<u64>,
    history: VecDeque<CaptureAttempt>,
}

impl CaptureLoop {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            policy: config.trigger_policy,
            period: config.period(),
            request_timeout: config.request_timeout(),
            state: LoopState::Stopped,
            last_sequence: 0,
            latest_dispatched: None,
            history: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn latest_dispatched(&self) -> Option<u64> {
        self.latest_dispatched
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, LoopState::Awaiting { .. })
    }

    pub fn attempt(&self, sequence: u64) -> Option<&CaptureAttempt> {
        self.history.iter().find(|a| a.sequence == sequence)
    }

    pub fn start(&mut self) -> StartDecision {
        match self.state {
            LoopState::Placing => StartDecision::Finished,
            LoopState::Stopped => {
                self.state = LoopState::Scheduled;
                tracing::info!(policy = ?self.policy, period_ms = self.period.as_millis() as u64, "Capture loop scheduled");
                match self.policy {
                    TriggerPolicy::OneShot => StartDecision::Once(self.period),
                    TriggerPolicy::Periodic | TriggerPolicy::QualityGated => {
                        StartDecision::Repeating(self.period)
                    }
                }
            }
            _ => StartDecision::AlreadyRunning,
        }
    }

    /// Handle a timer tick. `capture` is only called when the tick may
    /// actually take a picture.
    pub fn on_tick(
        &mut self,
        now: Instant,
        capture: impl FnOnce() -> FrameCapture,
        gate: &QualityGate,
        encode: impl FnOnce(&Frame) -> Result<ImagePayload, EncodeError>,
    ) -> TickDecision {
        match self.state {
            LoopState::Stopped | LoopState::Placing => return TickDecision::Inactive,
            LoopState::Awaiting { sequence, since } => {
                if now.saturating_duration_since(since) < self.request_timeout {
                    tracing::debug!(sequence, "Tick suppressed while awaiting analysis");
                    return TickDecision::Suppressed;
                }
                self.state = self.idle_state();
                self.set_result(
                    sequence,
                    AttemptResult::TransportError("superseded after timeout".into()),
                );
                tracing::warn!(sequence, "Analysis request timed out");
                return TickDecision::TimedOut { sequence };
            }
            LoopState::Scheduled | LoopState::Capturing => {}
        }

        self.state = LoopState::Capturing;
        let frame = match capture() {
            FrameCapture::NoRenderer => {
                self.state = self.idle_state();
                return TickDecision::RendererMissing;
            }
            FrameCapture::NotReady => {
                let sequence = self.record(None, None);
                self.state = self.idle_state();
                return TickDecision::CaptureFailed { sequence };
            }
            FrameCapture::Failed(reason) => {
                let sequence = self.record(None, None);
                tracing::warn!(sequence, "Frame capture failed: {}", reason);
                self.state = self.idle_state();
                return TickDecision::CaptureFailed { sequence };
            }
            FrameCapture::Ready(frame) => frame,
        };

        let quality = match self.policy {
            TriggerPolicy::Periodic => None,
            TriggerPolicy::QualityGated | TriggerPolicy::OneShot => {
                let sample = gate.assess(&frame);
                let passed = sample.map(|s| gate.is_acceptable(s.band)).unwrap_or(false);
                if !passed {
                    let sequence = self.record(sample, None);
                    self.state = self.idle_state();
                    tracing::debug!(sequence, band = ?sample.map(|s| s.band), "Frame rejected by quality gate");
                    return TickDecision::Skipped {
                        sequence,
                        band: sample.map(|s| s.band),
                    };
                }
                sample
            }
        };

        let payload = match encode(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                let sequence = self.record(quality, None);
                tracing::warn!(sequence, "Frame encoding failed: {}", e);
                self.state = self.idle_state();
                return TickDecision::CaptureFailed { sequence };
            }
        };

        let sequence = self.record(quality, Some(payload.clone()));
        self.latest_dispatched = Some(sequence);
        self.state = LoopState::Awaiting {
            sequence,
            since: now,
        };
        tracing::info!(sequence, bytes = payload.bytes.len(), "Dispatching scene analysis");
        TickDecision::Dispatch { sequence, payload }
    }

    /// Handle the completion of an analysis request.
    pub fn on_response(
        &mut self,
        sequence: u64,
        outcome: Result<WallVerdict, AnalysisError>,
    ) -> ResponseDecision {
        let current = match self.state {
            LoopState::Awaiting { sequence: current, .. } => current,
            _ => {
                tracing::debug!(sequence, state = ?self.state, "Discarding response outside Awaiting");
                return ResponseDecision::Stale;
            }
        };
        if sequence != current || Some(sequence) != self.latest_dispatched {
            tracing::debug!(sequence, current, "Discarding stale response");
            return ResponseDecision::Stale;
        }

        let retry = self.policy != TriggerPolicy::OneShot;
        let next = if retry {
            LoopState::Scheduled
        } else {
            LoopState::Stopped
        };

        match outcome {
            Ok(verdict) if verdict.wall_detected => {
                self.set_result(sequence, AttemptResult::WallDetected);
                self.state = LoopState::Placing;
                tracing::info!(sequence, "Wall detected");
                ResponseDecision::WallDetected
            }
            Ok(_) => {
                self.set_result(sequence, AttemptResult::NoWall);
                self.state = next;
                tracing::info!(sequence, retry, "No wall detected");
                ResponseDecision::NoWall { retry }
            }
            Err(error) => {
                self.set_result(sequence, AttemptResult::TransportError(error.to_string()));
                self.state = next;
                tracing::debug!(sequence, retry, "Analysis attempt failed");
                ResponseDecision::TransportError { error, retry }
            }
        }
    }

    /// Stop scheduling. Any in-flight attempt becomes stale. `Placing` is kept.
    pub fn cancel(&mut self) {
        if self.state != LoopState::Placing {
            self.state = LoopState::Stopped;
        }
    }

    /// Where a tick that did not dispatch leaves the loop. A one-shot loop
    /// has no further ticks coming, so it stops.
    fn idle_state(&self) -> LoopState {
        match self.policy {
            TriggerPolicy::OneShot => LoopState::Stopped,
            TriggerPolicy::Periodic | TriggerPolicy::QualityGated => LoopState::Scheduled,
        }
    }

    fn record(
        &mut self,
        quality: Option<QualitySample>,
        payload: Option<ImagePayload>,
    ) -> u64 {
        self.last_sequence += 1;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(CaptureAttempt {
            sequence: self.last_sequence,
            quality,
            // Only the size matters after dispatch; keep history light.
            payload: payload.map(|p| ImagePayload {
                bytes: Vec::new(),
                ..p
            }),
            result: AttemptResult::Pending,
        });
        self.last_sequence
    }

    fn set_result(&mut self, sequence: u64, result: AttemptResult) {
        if let Some(attempt) = self.history.iter_mut().find(|a| a.sequence == sequence) {
            attempt.result = result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use speculate2::speculate;

    fn config(policy: TriggerPolicy) -> CaptureConfig {
        CaptureConfig {
            trigger_policy: policy,
            period_ms: 10_000,
            request_timeout_ms: 15_000,
            ..CaptureConfig::default()
        }
    }

    fn ok_encode(_: &Frame) -> Result<ImagePayload, EncodeError> {
        Ok(ImagePayload::jpeg(vec![0xFF, 0xD8, 0xFF]))
    }

    fn lit() -> FrameCapture {
        FrameCapture::Ready(Frame::solid(4, 4, [120, 120, 120, 255]))
    }

    fn dark() -> FrameCapture {
        FrameCapture::Ready(Frame::solid(4, 4, [5, 5, 5, 255]))
    }

    fn verdict(wall_detected: bool) -> Result<WallVerdict, AnalysisError> {
        Ok(WallVerdict {
            wall_detected,
            confidence: None,
        })
    }

    fn dispatched(decision: TickDecision) -> u64 {
        match decision {
            TickDecision::Dispatch { sequence, .. } => sequence,
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    speculate! {
        before {
            let gate = QualityGate::new(&GateConfig::default());
            let mut capture = CaptureLoop::new(&config(TriggerPolicy::QualityGated));
            let t0 = Instant::now();
        }

        describe "start" {
            it "schedules a repeating timer once" {
                assert_eq!(capture.start(), StartDecision::Repeating(Duration::from_secs(10)));
                assert_eq!(capture.start(), StartDecision::AlreadyRunning);
                assert_eq!(capture.state(), LoopState::Scheduled);
            }

            it "arms a single timer for one-shot capture" {
                let mut one_shot = CaptureLoop::new(&config(TriggerPolicy::OneShot));
                assert_eq!(one_shot.start(), StartDecision::Once(Duration::from_secs(10)));
            }
        }

        describe "on_tick" {
            it "does nothing while stopped" {
                assert!(matches!(capture.on_tick(t0, lit, &gate, ok_encode), TickDecision::Inactive));
            }

            it "skips dark frames without dispatching" {
                capture.start();
                let decision = capture.on_tick(t0, dark, &gate, ok_encode);
                assert!(matches!(decision, TickDecision::Skipped { band: Some(QualityBand::TooDark), .. }));
                assert_eq!(capture.state(), LoopState::Scheduled);
                assert_eq!(capture.latest_dispatched(), None);
            }

            it "dispatches lit frames and moves to awaiting" {
                capture.start();
                let sequence = dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                assert_eq!(sequence, 1);
                assert!(capture.is_awaiting());
                assert_eq!(capture.attempt(1).unwrap().result, AttemptResult::Pending);
            }

            it "suppresses ticks while a request is in flight" {
                capture.start();
                dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                let decision = capture.on_tick(t0 + Duration::from_secs(10), lit, &gate, ok_encode);
                assert!(matches!(decision, TickDecision::Suppressed));
                assert_eq!(capture.latest_dispatched(), Some(1));
            }

            it "abandons an attempt that outlived the request timeout" {
                capture.start();
                dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                let decision = capture.on_tick(t0 + Duration::from_secs(20), lit, &gate, ok_encode);
                assert!(matches!(decision, TickDecision::TimedOut { sequence: 1 }));
                assert_eq!(capture.state(), LoopState::Scheduled);
            }

            it "bypasses the gate for periodic capture" {
                let mut periodic = CaptureLoop::new(&config(TriggerPolicy::Periodic));
                periodic.start();
                dispatched(periodic.on_tick(t0, dark, &gate, ok_encode));
            }

            it "reports a missing renderer and stays scheduled" {
                capture.start();
                let decision = capture.on_tick(t0, || FrameCapture::NoRenderer, &gate, ok_encode);
                assert!(matches!(decision, TickDecision::RendererMissing));
                assert_eq!(capture.state(), LoopState::Scheduled);
            }

            it "treats an encoding failure as a failed capture" {
                capture.start();
                let decision = capture.on_tick(t0, lit, &gate, |_| Err(EncodeError::EmptyFrame));
                assert!(matches!(decision, TickDecision::CaptureFailed { .. }));
                assert_eq!(capture.state(), LoopState::Scheduled);
            }
        }

        describe "on_response" {
            it "moves to placing on a detected wall" {
                capture.start();
                let sequence = dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                assert_eq!(capture.on_response(sequence, verdict(true)), ResponseDecision::WallDetected);
                assert_eq!(capture.state(), LoopState::Placing);
                assert_eq!(capture.attempt(sequence).unwrap().result, AttemptResult::WallDetected);
                assert_eq!(capture.start(), StartDecision::Finished);
            }

            it "returns to scheduled on a negative result" {
                capture.start();
                let sequence = dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                assert_eq!(capture.on_response(sequence, verdict(false)), ResponseDecision::NoWall { retry: true });
                assert_eq!(capture.state(), LoopState::Scheduled);
            }

            it "retries transport errors like negative results" {
                capture.start();
                let sequence = dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                let decision = capture.on_response(sequence, Err(AnalysisError::Transport("reset".into())));
                assert!(matches!(decision, ResponseDecision::TransportError { retry: true, .. }));
                assert_eq!(capture.state(), LoopState::Scheduled);
            }

            it "ignores the response of a superseded attempt" {
                capture.start();
                let first = dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                capture.on_tick(t0 + Duration::from_secs(20), lit, &gate, ok_encode);
                let second = dispatched(capture.on_tick(t0 + Duration::from_secs(30), lit, &gate, ok_encode));
                assert!(second > first);

                assert_eq!(capture.on_response(first, verdict(true)), ResponseDecision::Stale);
                assert_eq!(capture.state(), LoopState::Awaiting { sequence: second, since: t0 + Duration::from_secs(30) });

                assert_eq!(capture.on_response(second, verdict(false)), ResponseDecision::NoWall { retry: true });
            }

            it "ignores responses after cancel" {
                capture.start();
                let sequence = dispatched(capture.on_tick(t0, lit, &gate, ok_encode));
                capture.cancel();
                assert_eq!(capture.on_response(sequence, verdict(true)), ResponseDecision::Stale);
                assert_eq!(capture.state(), LoopState::Stopped);
            }

            it "stops a one-shot loop after a negative result" {
                let mut one_shot = CaptureLoop::new(&config(TriggerPolicy::OneShot));
                one_shot.start();
                let sequence = dispatched(one_shot.on_tick(t0, lit, &gate, ok_encode));
                assert_eq!(one_shot.on_response(sequence, verdict(false)), ResponseDecision::NoWall { retry: false });
                assert_eq!(one_shot.state(), LoopState::Stopped);
                assert_eq!(one_shot.start(), StartDecision::Once(Duration::from_secs(10)));
            }

            it "stops a one-shot loop whose only frame failed the gate" {
                let mut one_shot = CaptureLoop::new(&config(TriggerPolicy::OneShot));
                one_shot.start();
                assert!(matches!(one_shot.on_tick(t0, dark, &gate, ok_encode), TickDecision::Skipped { .. }));
                assert_eq!(one_shot.state(), LoopState::Stopped);
            }
        }
    }
}
