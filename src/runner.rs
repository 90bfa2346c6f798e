// src/runner.rs - Fixed-interval driver for one printer's overlay
use crate::camera::{self, CameraRetry};
use crate::client::Transport;
use crate::config::CameraConfig;
use crate::poll::{PollOutcome, StatusPoller};
use crate::view::{OverlayView, StatusSink};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Bytes requested when checking that the camera answers.
const CAMERA_PROBE_BYTES: usize = 1024;

/// Periodically checks the camera snapshot URL and backs off on failure.
#[derive(Debug)]
pub struct CameraMonitor {
    url: String,
    retry: CameraRetry,
    next_check: Instant,
}

impl CameraMonitor {
    pub fn new(url: impl Into<String>, config: &CameraConfig) -> Self {
        Self {
            url: url.into(),
            retry: CameraRetry::new(
                config.max_retries,
                Duration::from_millis(config.base_delay_ms),
                Duration::from_millis(config.max_delay_ms),
            ),
            next_check: Instant::now(),
        }
    }

    pub fn retry(&self) -> &CameraRetry {
        &self.retry
    }

    /// Start over with a fresh retry budget.
    pub fn rearm(&mut self) {
        if !self.retry.is_visible() {
            tracing::info!("Re-arming camera feed {}", self.url);
        }
        self.retry.reset();
        self.next_check = Instant::now();
    }

    /// Check the feed if due and update the view's camera URL.
    pub async fn check<T: Transport>(&mut self, transport: &T, view: &mut OverlayView, interval: Duration) {
        if !self.retry.is_visible() || Instant::now() < self.next_check {
            return;
        }
        match transport.get_bytes(&self.url, CAMERA_PROBE_BYTES).await {
            Ok(_) => {
                self.retry.on_loaded();
                self.next_check = Instant::now() + interval;
                view.camera_url = Some(camera::frame_url(&self.url, chrono::Utc::now().timestamp_millis()));
            }
            Err(e) => {
                tracing::debug!("Camera check failed: {}", e);
                match self.retry.on_error() {
                    Some(delay) => self.next_check = Instant::now() + delay,
                    None => view.camera_url = None,
                }
            }
        }
    }
}

pub struct Runner<T> {
    poller: StatusPoller<T>,
    sink: Box<dyn StatusSink>,
    view: OverlayView,
    interval: Duration,
    camera: Option<CameraMonitor>,
}

impl<T: Transport> Runner<T> {
    pub fn new(poller: StatusPoller<T>, sink: Box<dyn StatusSink>, view: OverlayView, interval: Duration) -> Self {
        Self {
            poller,
            sink,
            view,
            interval,
            camera: None,
        }
    }

    pub fn with_camera(mut self, camera: CameraMonitor) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn view(&self) -> &OverlayView {
        &self.view
    }

    pub fn poller(&self) -> &StatusPoller<T> {
        &self.poller
    }

    /// Run one cycle and publish the resulting view.
    pub async fn tick(&mut self) -> PollOutcome {
        let outcome = self.poller.poll_once().await;
        let was_down = self.view.error;
        self.view.apply(&outcome);
        if let Some(camera) = self.camera.as_mut() {
            // A printer coming back usually means its camera did too.
            if was_down && !self.view.error {
                camera.rearm();
            }
            camera.check(self.poller.api().transport(), &mut self.view, self.interval).await;
        }
        self.sink.publish(&self.view);
        outcome
    }

    /// Poll forever.
    pub async fn run(&mut self) {
        let (_stop, shutdown) = watch::channel(false);
        self.run_until(shutdown).await;
    }

    /// Poll on a fixed interval until `shutdown` becomes `true`. A cycle that
    /// overruns the interval delays the next one rather than overlapping it.
    pub async fn run_until(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Polling every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Poll loop stopping");
                        break;
                    }
                }
            }
        }
    }
}
