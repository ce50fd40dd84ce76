//! Window-exclusion capture: composite every on-screen window except ours
//!
//! The window server can composite an explicit list of windows into one
//! image. Listing everything not owned by this process leaves our overlay
//! and companions out without touching their visibility.

use tracing::{debug, info, trace};

use crate::{
    BackendKind, CaptureBackend, CaptureRegion, CaptureResult, Frame, WindowCompositor,
    WindowHandle, WindowRecord,
};

/// Window-exclusion capture backend
pub struct WindowExclusionBackend<C: WindowCompositor> {
    compositor: C,
    own_pid: u32,
}

impl<C: WindowCompositor> WindowExclusionBackend<C> {
    pub fn new(compositor: C) -> Self {
        Self::for_process(compositor, std::process::id())
    }

    /// Exclude the windows of `pid` instead of the current process
    pub fn for_process(compositor: C, pid: u32) -> Self {
        info!("Window-exclusion capture: excluding windows of pid {}", pid);
        Self {
            compositor,
            own_pid: pid,
        }
    }

    /// Ids of on-screen windows owned by other processes, front to back
    fn foreign_windows(&self, records: &[WindowRecord]) -> Vec<u32> {
        records
            .iter()
            .filter(|r| r.owner_pid != self.own_pid && r.id > 0)
            .map(|r| r.id)
            .collect()
    }
}

impl<C: WindowCompositor> CaptureBackend for WindowExclusionBackend<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::WindowExclusion
    }

    fn grab(&mut self, region: CaptureRegion) -> CaptureResult<Option<Frame>> {
        if region.is_degenerate() {
            return Ok(None);
        }

        let records = self.compositor.on_screen_windows()?;
        let windows = self.foreign_windows(&records);
        if windows.is_empty() {
            trace!("No foreign windows on screen");
            return Ok(None);
        }

        match self.compositor.composite(&windows, region)? {
            Some(raw) => Ok(Some(raw.into_frame()?)),
            None => {
                debug!(%region, "Window server returned no image");
                Ok(None)
            }
        }
    }

    fn needs_hide(&self) -> bool {
        false
    }

    /// Companions belong to this process and are filtered by owner already
    fn set_companion_windows(&mut self, _windows: &[WindowHandle]) {}

    fn close(&mut self) {
        debug!("Window-exclusion capture closed");
    }
}
