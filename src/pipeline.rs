//! The capture-and-placement pipeline.
//!
//! One task owns every piece of pipeline state and handles [`PipelineEvent`]s
//! one at a time, to completion. Timers, the render loop, analysis requests
//! and the asset load are spawned tasks that only send events back; none of
//! them touch state directly. That gives the single-threaded callback
//! discipline the scene graph relies on, without locks.

use std::sync::Arc;

use glam::Mat4;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::analysis::{
    encode_jpeg, CaptureLoop, FrameCapture, LoopState, ResponseDecision, StartDecision,
    TickDecision, WallAnalyzer, WallVerdict,
};
use crate::assets::{AssetLoader, LoadState, ModelAsset, ModelLoader};
use crate::capability::{CapabilityProber, SupportState, UnsupportedReason};
use crate::config::{PipelineConfig, TriggerPolicy};
use crate::device::{MediaStream, Notifier, XrSystem};
use crate::error::{AnalysisError, AssetLoadError, ConfigError, PipelineError};
use crate::gate::QualityGate;
use crate::lifecycle::{
    CounterSnapshot, InFlightGuard, Lifecycle, ListenerKind, ManagedTimer, ResourceCounters,
    TeardownReport,
};
use crate::models::{PlacedModel, Session, SurfaceSize};
use crate::placement::{PlacementController, SelectOutcome, ZoomOutcome};
use crate::render::{FrameSignal, RenderSessionManager, RenderState, Renderer};
use crate::status::{StatusLine, StatusMessage};

/// Everything that can happen to the pipeline.
#[derive(Debug)]
pub enum PipelineEvent {
    AnimationFrame,
    CaptureTick,
    AnalysisFinished {
        sequence: u64,
        outcome: Result<WallVerdict, AnalysisError>,
    },
    ModelLoaded(Result<ModelAsset, AssetLoadError>),
    Select {
        controller_world: Mat4,
    },
    Zoom {
        delta_y: f32,
    },
    Resize(SurfaceSize),
    /// Re-arm a stopped one-shot capture.
    RestartCapture,
    Snapshot(oneshot::Sender<PipelineSnapshot>),
    Close,
}

/// External collaborators the pipeline is wired to.
pub struct Collaborators {
    pub xr: Arc<dyn XrSystem>,
    pub notifier: Arc<dyn Notifier>,
    pub renderer: Box<dyn Renderer>,
    pub analyzer: Arc<dyn WallAnalyzer>,
    pub loader: Arc<dyn ModelLoader>,
    /// Camera stream owned by the pipeline, if the platform hands one out.
    pub media: Option<Box<dyn MediaStream>>,
}

/// Why the pipeline stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Unsupported(UnsupportedReason),
    SessionFailed(String),
    Closed,
}

impl From<PipelineError> for PipelineOutcome {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::CapabilityUnsupported(reason) => Self::Unsupported(reason),
            PipelineError::SessionRequestFailed(device) => Self::SessionFailed(device.to_string()),
            other => Self::SessionFailed(other.to_string()),
        }
    }
}

/// Read-only view of pipeline state, for hosts and tests.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub render_state: RenderState,
    pub loop_state: LoopState,
    pub load_state: LoadState,
    pub session: Option<Session>,
    pub model: Option<PlacedModel>,
    pub latest_dispatched: Option<u64>,
    pub has_capture_timer: bool,
    pub render_loop_running: bool,
    pub listeners: Vec<ListenerKind>,
    pub camera_aspect: Option<f32>,
    pub counters: CounterSnapshot,
    pub status: String,
}

/// Final summary returned when the pipeline task ends.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    pub model: Option<PlacedModel>,
    pub load_state: LoadState,
    pub latest_dispatched: Option<u64>,
    pub teardown: TeardownReport,
    pub counters: CounterSnapshot,
    pub status: String,
}

enum Flow {
    Continue,
    Stop,
}

pub struct Pipeline {
    config: PipelineConfig,
    xr: Arc<dyn XrSystem>,
    notifier: Arc<dyn Notifier>,
    analyzer: Arc<dyn WallAnalyzer>,
    loader: Arc<dyn ModelLoader>,
    status: StatusLine,
    render: RenderSessionManager,
    gate: QualityGate,
    capture: CaptureLoop,
    assets: AssetLoader,
    placement: PlacementController,
    lifecycle: Lifecycle,
    analysis_task: Option<JoinHandle<()>>,
    asset_task: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl Pipeline {
    /// Build a pipeline. The config is validated first; nothing is started.
    pub fn new(config: PipelineConfig, parts: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let counters = ResourceCounters::new();
        let mut lifecycle = Lifecycle::new(counters);
        if let Some(media) = parts.media {
            lifecycle.attach_media(media);
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            render: RenderSessionManager::new(
                config.session.clone(),
                config.camera.clone(),
                config.render.clone(),
                parts.renderer,
            ),
            gate: QualityGate::new(&config.gate),
            capture: CaptureLoop::new(&config.capture),
            assets: AssetLoader::new(&config.asset),
            placement: PlacementController::new(&config.placement),
            status: StatusLine::new(),
            xr: parts.xr,
            notifier: parts.notifier,
            analyzer: parts.analyzer,
            loader: parts.loader,
            lifecycle,
            analysis_task: None,
            asset_task: None,
            events_tx,
            events_rx,
            config,
        })
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn counters(&self) -> Arc<ResourceCounters> {
        Arc::clone(self.lifecycle.counters())
    }

    /// Run the pipeline on its own task.
    pub fn spawn(self) -> PipelineHandle {
        let events = self.events_tx.clone();
        let status = self.status.subscribe();
        let counters = self.counters();
        let task = tokio::spawn(self.run());
        PipelineHandle {
            events,
            status,
            counters,
            task: Some(task),
        }
    }

    /// Probe, start the session, then process events until closed.
    pub async fn run(mut self) -> PipelineReport {
        self.status.set(StatusMessage::Initializing);

        if let Err(e) = self.start().await {
            log_failure(&e);
            let outcome = PipelineOutcome::from(e);
            if let PipelineOutcome::SessionFailed(reason) = &outcome {
                self.status.set(StatusMessage::SessionFailed(reason.clone()));
            }
            return self.finish(outcome);
        }

        while let Some(event) = self.events_rx.recv().await {
            if let Flow::Stop = self.handle(event) {
                break;
            }
        }
        self.finish(PipelineOutcome::Closed)
    }

    async fn start(&mut self) -> Result<(), PipelineError> {
        let prober = CapabilityProber::new(
            Arc::clone(&self.xr),
            Arc::clone(&self.notifier),
            self.config.session.mode,
        );
        if let SupportState::Unsupported(reason) = prober.probe(&self.status).await {
            return Err(PipelineError::CapabilityUnsupported(reason));
        }
        self.start_session().await
    }

    async fn start_session(&mut self) -> Result<(), PipelineError> {
        let pixel_ratio = self.xr.pixel_ratio();
        self.render
            .initialize(pixel_ratio, self.lifecycle.listeners_mut())?;
        self.render.request_session(self.xr.as_ref()).await?;
        self.status.set(StatusMessage::SessionStarted);

        let events = self.events_tx.clone();
        self.render.start_render_loop(|interval| {
            ManagedTimer::repeating(interval, events, || PipelineEvent::AnimationFrame)
        });
        Ok(())
    }

    fn handle(&mut self, event: PipelineEvent) -> Flow {
        match event {
            PipelineEvent::AnimationFrame => self.on_animation_frame(),
            PipelineEvent::CaptureTick => self.on_capture_tick(),
            PipelineEvent::AnalysisFinished { sequence, outcome } => {
                self.on_analysis_finished(sequence, outcome)
            }
            PipelineEvent::ModelLoaded(result) => self.on_model_loaded(result),
            PipelineEvent::Select { controller_world } => self.on_select(controller_world),
            PipelineEvent::Zoom { delta_y } => self.on_zoom(delta_y),
            PipelineEvent::Resize(size) => {
                if self.lifecycle.listeners().is_registered(ListenerKind::Resize) {
                    if let Err(e) = self.render.resize(size) {
                        tracing::debug!("Resize ignored: {}", e);
                    }
                }
            }
            PipelineEvent::RestartCapture => {
                if self.render.state() == RenderState::SessionActive {
                    self.start_capture();
                }
            }
            PipelineEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            PipelineEvent::Close => return Flow::Stop,
        }
        Flow::Continue
    }

    fn on_animation_frame(&mut self) {
        match self.render.render_frame() {
            Ok(FrameSignal::First) => {
                self.status.set(StatusMessage::HoldCamera);
                self.start_capture();
            }
            Ok(FrameSignal::Frame | FrameSignal::Skipped) => {}
            Err(e) => tracing::warn!("Render loop iteration failed: {}", e),
        }
    }

    fn start_capture(&mut self) {
        let events = self.events_tx.clone();
        match self.capture.start() {
            StartDecision::Repeating(period) => {
                self.lifecycle.install_capture_timer(|| {
                    ManagedTimer::repeating(period, events, || PipelineEvent::CaptureTick)
                });
                self.status.set(StatusMessage::AnalysisScheduled(period));
            }
            StartDecision::Once(delay) => {
                self.lifecycle.install_capture_timer(|| {
                    ManagedTimer::once(delay, events, PipelineEvent::CaptureTick)
                });
                self.status.set(StatusMessage::AnalysisScheduled(delay));
            }
            StartDecision::AlreadyRunning | StartDecision::Finished => {
                tracing::debug!("Capture already scheduled or finished");
            }
        }
    }

    fn on_capture_tick(&mut self) {
        if self.capture.policy() == TriggerPolicy::OneShot {
            // The one-shot timer has fired; release its slot.
            self.lifecycle.cancel_capture_timer();
        }

        let render = &mut self.render;
        let quality = self.config.capture.jpeg_quality;
        let decision = self.capture.on_tick(
            Instant::now(),
            || match render.capture_frame() {
                Err(PipelineError::NotInitialized) => FrameCapture::NoRenderer,
                Err(e) => FrameCapture::Failed(e.to_string()),
                Ok(None) => FrameCapture::NotReady,
                Ok(Some(frame)) => FrameCapture::Ready(frame),
            },
            &self.gate,
            |frame| encode_jpeg(frame, quality),
        );

        match decision {
            TickDecision::Inactive | TickDecision::Suppressed => {}
            TickDecision::TimedOut { sequence } => {
                if let Some(task) = self.analysis_task.take() {
                    task.abort();
                }
                tracing::warn!(sequence, "Abandoned analysis request after timeout");
                self.status.set(StatusMessage::AnalysisTimedOut);
            }
            TickDecision::RendererMissing => {
                self.status.set(StatusMessage::RendererMissing);
            }
            TickDecision::CaptureFailed { .. } | TickDecision::Skipped { band: None, .. } => {
                self.status.set(StatusMessage::CaptureFailed);
            }
            TickDecision::Skipped {
                band: Some(band), ..
            } => {
                self.status.set(StatusMessage::Guidance(band));
            }
            TickDecision::Dispatch { sequence, payload } => {
                self.status.set(StatusMessage::Analyzing);
                let analyzer = Arc::clone(&self.analyzer);
                let events = self.events_tx.clone();
                let relevance = self.lifecycle.relevance();
                let guard = InFlightGuard::acquire(self.lifecycle.counters());
                let timeout = self.config.capture.request_timeout();
                self.analysis_task = Some(tokio::spawn(async move {
                    let outcome = match time::timeout(timeout, analyzer.analyze(payload)).await {
                        Ok(result) => result,
                        Err(_) => Err(AnalysisError::Timeout(timeout.as_millis())),
                    };
                    drop(guard);
                    if relevance.is_relevant() {
                        let _ = events.send(PipelineEvent::AnalysisFinished { sequence, outcome });
                    }
                }));
            }
        }
        if self.capture.state() == LoopState::Stopped {
            self.lifecycle.cancel_capture_timer();
        }
    }

    fn on_analysis_finished(&mut self, sequence: u64, outcome: Result<WallVerdict, AnalysisError>) {
        if self.lifecycle.is_torn_down() {
            return;
        }
        match self.capture.on_response(sequence, outcome) {
            ResponseDecision::Stale => {}
            ResponseDecision::WallDetected => {
                self.analysis_task = None;
                self.lifecycle.cancel_capture_timer();
                self.status.set(StatusMessage::WallDetected);
                self.begin_asset_load();
            }
            ResponseDecision::NoWall { retry } => {
                self.analysis_task = None;
                self.status.set(StatusMessage::NoWallRetrying);
                if !retry {
                    self.stop_capture();
                }
            }
            ResponseDecision::TransportError { error, retry } => {
                self.analysis_task = None;
                let message = match error {
                    AnalysisError::Timeout(_) => StatusMessage::AnalysisTimedOut,
                    _ => StatusMessage::AnalysisError,
                };
                log_failure(&PipelineError::from(error));
                self.status.set(message);
                if !retry {
                    self.stop_capture();
                }
            }
        }
    }

    fn stop_capture(&mut self) {
        self.lifecycle.cancel_capture_timer();
        self.status.set(StatusMessage::CaptureStopped);
    }

    fn begin_asset_load(&mut self) {
        let reference = match self.assets.begin() {
            Ok(reference) => reference,
            Err(e) => {
                tracing::debug!("Asset load not started: {}", e);
                return;
            }
        };
        self.lifecycle.counters().asset_load_started();
        let loader = Arc::clone(&self.loader);
        let events = self.events_tx.clone();
        let relevance = self.lifecycle.relevance();
        self.asset_task = Some(tokio::spawn(async move {
            let result = loader.load(&reference).await;
            if relevance.is_relevant() {
                let _ = events.send(PipelineEvent::ModelLoaded(result));
            }
        }));
    }

    fn on_model_loaded(&mut self, result: Result<ModelAsset, AssetLoadError>) {
        self.asset_task = None;
        if self.lifecycle.is_torn_down() {
            return;
        }
        match self.assets.finish(result) {
            Ok(model) => {
                if self.render.scene_mut().insert_model(model) {
                    self.status.set(StatusMessage::ModelPlaced);
                }
            }
            Err(e) => {
                log_failure(&PipelineError::from(e));
                self.status.set(StatusMessage::ModelLoadFailed);
            }
        }
    }

    fn on_select(&mut self, controller_world: Mat4) {
        if !self.lifecycle.listeners().is_registered(ListenerKind::Select) {
            return;
        }
        let scene = self.render.scene_mut();
        scene.controller.world = controller_world;
        match self.placement.on_select(scene.model_mut(), controller_world) {
            SelectOutcome::Moved { position } => {
                tracing::debug!(?position, "Model moved to controller");
            }
            SelectOutcome::NoModel => {}
        }
    }

    fn on_zoom(&mut self, delta_y: f32) {
        if !self.lifecycle.listeners().is_registered(ListenerKind::Zoom) {
            return;
        }
        match self
            .placement
            .on_zoom(self.render.scene_mut().model_mut(), delta_y)
        {
            ZoomOutcome::Applied { scale } => tracing::debug!(?scale, "Model rescaled"),
            ZoomOutcome::Rejected { candidate } => {
                tracing::debug!(?candidate, "Zoom rejected at scale bounds")
            }
            ZoomOutcome::NoModel => {}
        }
    }

    fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            render_state: self.render.state(),
            loop_state: self.capture.state(),
            load_state: self.assets.state().clone(),
            session: self.render.session().cloned(),
            model: self.render.scene().model().cloned(),
            latest_dispatched: self.capture.latest_dispatched(),
            has_capture_timer: self.lifecycle.has_capture_timer(),
            render_loop_running: self.render.is_render_loop_running(),
            listeners: [ListenerKind::Resize, ListenerKind::Zoom, ListenerKind::Select]
                .into_iter()
                .filter(|k| self.lifecycle.listeners().is_registered(*k))
                .collect(),
            camera_aspect: self.render.camera().map(|c| c.aspect),
            counters: self.lifecycle.counters().snapshot(),
            status: self.status.current(),
        }
    }

    /// Release timers, tasks, listeners, the stream and the session.
    /// Idempotent, and safe before the pipeline ever initialized.
    pub fn teardown(&mut self) -> TeardownReport {
        self.capture.cancel();
        if let Some(task) = self.analysis_task.take() {
            task.abort();
        }
        if let Some(task) = self.asset_task.take() {
            task.abort();
        }
        let report = self.lifecycle.teardown();
        if report.performed {
            let counters = self.lifecycle.counters();
            if self.render.end() {
                counters.session_ended();
                self.status.set(StatusMessage::SessionEnded);
            }
            counters.teardown_performed();
            tracing::info!(?report, "Pipeline torn down");
        }
        report
    }

    fn finish(mut self, outcome: PipelineOutcome) -> PipelineReport {
        let teardown = self.teardown();
        let model = self.render.scene().model().cloned();
        self.render.scene_mut().clear();
        PipelineReport {
            outcome,
            model,
            load_state: self.assets.state().clone(),
            latest_dispatched: self.capture.latest_dispatched(),
            teardown,
            counters: self.lifecycle.counters().snapshot(),
            status: self.status.current(),
        }
    }
}

fn log_failure(error: &PipelineError) {
    if error.is_terminal() {
        tracing::error!("{}", error);
    } else {
        tracing::warn!("{}", error);
    }
}

/// Host-side handle to a running pipeline.
///
/// Dropping the handle closes the pipeline, like navigating away.
pub struct PipelineHandle {
    events: mpsc::UnboundedSender<PipelineEvent>,
    status: watch::Receiver<String>,
    counters: Arc<ResourceCounters>,
    task: Option<JoinHandle<PipelineReport>>,
}

impl PipelineHandle {
    /// Controller `select` gesture with the controller's world transform.
    pub fn select(&self, controller_world: Mat4) -> bool {
        self.send(PipelineEvent::Select { controller_world })
    }

    /// Scroll/pinch gesture; positive `delta_y` shrinks the model.
    pub fn zoom(&self, delta_y: f32) -> bool {
        self.send(PipelineEvent::Zoom { delta_y })
    }

    pub fn resize(&self, width: u32, height: u32) -> bool {
        self.send(PipelineEvent::Resize(SurfaceSize::new(width, height)))
    }

    pub fn restart_capture(&self) -> bool {
        self.send(PipelineEvent::RestartCapture)
    }

    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.clone()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Current state, or `None` once the pipeline has stopped.
    pub async fn snapshot(&self) -> Option<PipelineSnapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.send(PipelineEvent::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// Close the pipeline and wait for its final report.
    pub async fn close(mut self) -> Option<PipelineReport> {
        self.send(PipelineEvent::Close);
        let task = self.task.take()?;
        match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!("Pipeline task failed: {}", e);
                None
            }
        }
    }

    /// Whether the pipeline task has finished on its own.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    fn send(&self, event: PipelineEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        let _ = self.events.send(PipelineEvent::Close);
    }
}
