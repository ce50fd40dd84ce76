//! Capture/render coordination loop
//!
//! One tick per timer period. Backends that exclude our windows natively
//! are grabbed synchronously; otherwise the tick hides our windows, waits
//! for the compositor to settle, grabs, and restores them.

use capture::{BackendKind, CaptureBackend, CaptureRegion, SelectedBackend, WindowHandle};
use crossbeam_channel::{Receiver, after, never, select, tick};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{CoordinatorConfig, FrameSink, OverlayWindow};

/// Counters kept by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub ticks: u64,
    pub frames_delivered: u64,
    /// Grabs that returned no frame
    pub empty_grabs: u64,
    pub grab_errors: u64,
    pub skipped_degenerate: u64,
    pub skipped_in_flight: u64,
    /// Completed hide/grab/restore cycles
    pub hide_cycles: u64,
}

/// What a tick (or a finished hide cycle) did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame handed to the sink
    Delivered { width: u32, height: u32 },
    /// Grab produced nothing; the sink keeps its last frame
    NoFrame,
    /// Grab failed; the sink keeps its last frame
    GrabFailed,
    /// Our windows are hidden; call `poll`/`finish_cycle` after `deadline`
    HideArmed { deadline: Instant },
    SkippedDegenerate,
    SkippedInFlight,
    /// Coordinator already shut down
    Closed,
}

/// Hide cycle waiting for the compositor to settle
struct PendingCycle {
    deadline: Instant,
    region: CaptureRegion,
    /// Indices of companions hidden by this cycle
    hidden_companions: Vec<usize>,
}

/// Puts our windows back to full opacity, also when a grab panics
struct OpacityRestore<'a> {
    overlay: &'a mut Box<dyn OverlayWindow>,
    companions: &'a mut Vec<Box<dyn OverlayWindow>>,
    hidden: &'a [usize],
}

impl Drop for OpacityRestore<'_> {
    fn drop(&mut self) {
        self.overlay.set_opacity(1.0);
        for &index in self.hidden {
            if let Some(window) = self.companions.get_mut(index) {
                window.set_opacity(1.0);
            }
        }
    }
}

pub struct Coordinator<S: FrameSink> {
    backend: Box<dyn CaptureBackend>,
    kind: BackendKind,
    overlay: Box<dyn OverlayWindow>,
    companions: Vec<Box<dyn OverlayWindow>>,
    companions_registered: bool,
    sink: S,
    config: CoordinatorConfig,
    pending: Option<PendingCycle>,
    stats: CoordinatorStats,
    closed: bool,
}

impl<S: FrameSink> Coordinator<S> {
    /// Drive `selected` for `overlay`, delivering frames to `sink`
    pub fn new(
        selected: SelectedBackend,
        overlay: Box<dyn OverlayWindow>,
        sink: S,
        config: CoordinatorConfig,
    ) -> Self {
        info!(
            "Capture coordinator using {} backend at {} fps (hide around grabs: {})",
            selected.kind,
            config.target_fps,
            selected.backend.needs_hide()
        );

        Self {
            backend: selected.backend,
            kind: selected.kind,
            overlay,
            companions: Vec::new(),
            companions_registered: false,
            sink,
            config,
            pending: None,
            stats: CoordinatorStats::default(),
            closed: false,
        }
    }

    /// Select the best backend for `overlay` and drive it
    pub fn for_overlay(overlay: Box<dyn OverlayWindow>, sink: S, config: CoordinatorConfig) -> Self {
        let selected = capture::create_capture(overlay.native_handle(), &config.capture);
        Self::new(selected, overlay, sink, config)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// True while our windows are hidden waiting for a grab
    pub fn cycle_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Hand the application's companion windows over, once, before the first tick
    pub fn register_companions(&mut self, companions: Vec<Box<dyn OverlayWindow>>) {
        if self.companions_registered {
            warn!(
                "Companion windows already registered, ignoring {} more",
                companions.len()
            );
            return;
        }
        self.companions_registered = true;

        let handles: Vec<WindowHandle> = companions.iter().map(|w| w.native_handle()).collect();
        debug!(count = handles.len(), "Registering companion windows");
        self.backend.set_companion_windows(&handles);
        self.companions = companions;
    }

    /// Run one timer tick
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.closed {
            return TickOutcome::Closed;
        }

        self.stats.ticks += 1;
        if self.config.stats_interval > 0 && self.stats.ticks % self.config.stats_interval == 0 {
            debug!(stats = ?self.stats, "Capture stats");
        }

        let region = self.overlay.screen_rect();
        if region.is_degenerate() {
            self.stats.skipped_degenerate += 1;
            return TickOutcome::SkippedDegenerate;
        }

        if self.pending.is_some() {
            self.stats.skipped_in_flight += 1;
            trace!("Hide cycle in flight, skipping tick");
            return TickOutcome::SkippedInFlight;
        }

        if !self.backend.needs_hide() {
            let result = self.backend.grab(region);
            return self.deliver(result);
        }

        // Hide our windows and let the compositor catch up before grabbing
        self.overlay.set_opacity(0.0);
        let mut hidden_companions = Vec::new();
        for (index, window) in self.companions.iter_mut().enumerate() {
            if window.is_visible() {
                window.set_opacity(0.0);
                hidden_companions.push(index);
            }
        }
        self.overlay.flush_display();
        for &index in &hidden_companions {
            self.companions[index].flush_display();
        }

        let deadline = now + self.config.hide_settle_delay();
        self.pending = Some(PendingCycle {
            deadline,
            region,
            hidden_companions,
        });
        TickOutcome::HideArmed { deadline }
    }

    /// Finish the armed hide cycle if its settle delay has passed
    pub fn poll(&mut self, now: Instant) -> Option<TickOutcome> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|cycle| now >= cycle.deadline);
        if due { self.finish_cycle() } else { None }
    }

    /// Grab, restore opacity and deliver for the armed hide cycle
    ///
    /// Returns `None` when no cycle is armed.
    pub fn finish_cycle(&mut self) -> Option<TickOutcome> {
        let cycle = self.pending.take()?;

        let result = {
            let _restore = OpacityRestore {
                overlay: &mut self.overlay,
                companions: &mut self.companions,
                hidden: &cycle.hidden_companions,
            };
            self.backend.grab(cycle.region)
        };

        self.stats.hide_cycles += 1;
        Some(self.deliver(result))
    }

    fn deliver(&mut self, result: capture::CaptureResult<Option<capture::Frame>>) -> TickOutcome {
        let outcome = match result {
            Ok(Some(frame)) => {
                let (width, height) = (frame.width, frame.height);
                self.sink.deliver(frame);
                self.stats.frames_delivered += 1;
                TickOutcome::Delivered { width, height }
            }
            Ok(None) => {
                self.stats.empty_grabs += 1;
                TickOutcome::NoFrame
            }
            Err(e) => {
                self.stats.grab_errors += 1;
                debug!("Grab failed: {}", e);
                TickOutcome::GrabFailed
            }
        };

        self.sink.request_redraw();
        outcome
    }

    /// Tick at the configured rate until `shutdown` fires or disconnects
    ///
    /// Blocks the calling thread, which must be the one owning the windows.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        let ticker = tick(self.config.tick_period());
        info!("Capture loop started");

        loop {
            let settle = match &self.pending {
                Some(cycle) => after(cycle.deadline.saturating_duration_since(Instant::now())),
                None => never(),
            };

            select! {
                recv(ticker) -> msg => {
                    if let Ok(now) = msg {
                        self.tick(now);
                    }
                }
                recv(settle) -> _ => {
                    self.finish_cycle();
                }
                recv(shutdown) -> _ => {
                    self.finish_cycle();
                    break;
                }
            }
        }

        self.shutdown();
        info!("Capture loop ended");
    }

    /// Restore hidden windows and close the backend; later calls do nothing
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(cycle) = self.pending.take() {
            drop(OpacityRestore {
                overlay: &mut self.overlay,
                companions: &mut self.companions,
                hidden: &cycle.hidden_companions,
            });
        }

        self.backend.close();
        info!(stats = ?self.stats, "Capture coordinator shut down");
    }
}

impl<S: FrameSink> Drop for Coordinator<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
