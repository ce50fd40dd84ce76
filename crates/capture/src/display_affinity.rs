//! Display-affinity capture: flag our windows as excluded, then grab the desktop
//!
//! Once a window carries the OS capture-exclusion flag, desktop grabs render
//! whatever is behind it. If the flag cannot be set the backend still works
//! but our windows have to be hidden around each grab.

use tracing::{debug, info, warn};

use crate::{
    AffinityControl, BackendKind, CaptureBackend, CaptureRegion, CaptureResult, DesktopGrabber,
    Frame, WindowHandle,
};

/// Display-affinity capture backend
pub struct DisplayAffinityBackend<A: AffinityControl, G: DesktopGrabber> {
    affinity: A,
    grabber: G,
    own: WindowHandle,
    /// Result of flagging our own window
    affinity_ok: bool,
    companions: Vec<WindowHandle>,
    closed: bool,
}

impl<A: AffinityControl, G: DesktopGrabber> DisplayAffinityBackend<A, G> {
    /// Flag `own` as excluded from capture
    ///
    /// A failed flag is not fatal: the backend falls back to hide-around-grab.
    pub fn new(affinity: A, grabber: G, own: WindowHandle) -> Self {
        let affinity_ok = match affinity.set_excluded(own, true) {
            Ok(()) => {
                info!("Display-affinity capture: window {} excluded from capture", own);
                true
            }
            Err(e) => {
                warn!(
                    "Could not exclude window {} from capture ({}), hiding around grabs",
                    own, e
                );
                false
            }
        };

        Self {
            affinity,
            grabber,
            own,
            affinity_ok,
            companions: Vec::new(),
            closed: false,
        }
    }

    pub fn affinity_ok(&self) -> bool {
        self.affinity_ok
    }

    /// Companion windows currently tracked for cleanup
    pub fn companions(&self) -> &[WindowHandle] {
        &self.companions
    }
}

impl<A: AffinityControl, G: DesktopGrabber> CaptureBackend for DisplayAffinityBackend<A, G> {
    fn kind(&self) -> BackendKind {
        BackendKind::DisplayAffinity
    }

    fn grab(&mut self, region: CaptureRegion) -> CaptureResult<Option<Frame>> {
        if region.is_degenerate() {
            return Ok(None);
        }

        match self.grabber.grab_desktop(region)? {
            Some(raw) => Ok(Some(raw.into_frame()?)),
            None => Ok(None),
        }
    }

    fn needs_hide(&self) -> bool {
        !self.affinity_ok
    }

    fn set_companion_windows(&mut self, windows: &[WindowHandle]) {
        for &window in windows {
            // tracked even when flagging fails so close() still clears it
            if !self.companions.contains(&window) {
                self.companions.push(window);
            }
            if let Err(e) = self.affinity.set_excluded(window, true) {
                warn!("Could not exclude companion {} from capture: {}", window, e);
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for window in std::iter::once(self.own).chain(self.companions.iter().copied()) {
            if let Err(e) = self.affinity.set_excluded(window, false) {
                warn!("Could not clear capture exclusion on {}: {}", window, e);
            }
        }
        debug!(
            "Display-affinity capture closed, cleared {} window(s)",
            1 + self.companions.len()
        );
    }
}

impl<A: AffinityControl, G: DesktopGrabber> Drop for DisplayAffinityBackend<A, G> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureError, RawImage};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Calls = Arc<Mutex<Vec<(WindowHandle, bool)>>>;

    #[derive(Clone, Default)]
    struct FakeAffinity {
        calls: Calls,
        refuse: Vec<WindowHandle>,
    }

    impl AffinityControl for FakeAffinity {
        fn set_excluded(&self, window: WindowHandle, excluded: bool) -> CaptureResult<()> {
            self.calls.lock().push((window, excluded));
            if self.refuse.contains(&window) {
                return Err(CaptureError::Platform("access denied".into()));
            }
            Ok(())
        }
    }

    struct SolidGrabber;

    impl DesktopGrabber for SolidGrabber {
        fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
            let (w, h) = (region.width as u32, region.height as u32);
            Ok(Some(RawImage {
                width: w,
                height: h,
                stride: w as usize * 4,
                bytes_per_pixel: 4,
                data: vec![0x10; w as usize * h as usize * 4],
            }))
        }
    }

    /// Fails the test if any desktop grab is attempted
    struct UnreachableGrabber;

    impl DesktopGrabber for UnreachableGrabber {
        fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
            panic!("desktop grab issued for {}", region);
        }
    }

    const OWN: WindowHandle = WindowHandle(0x100);

    #[test]
    fn test_flag_set_means_no_hide() {
        let affinity = FakeAffinity::default();
        let calls = Arc::clone(&affinity.calls);
        let mut backend = DisplayAffinityBackend::new(affinity, SolidGrabber, OWN);

        assert!(backend.affinity_ok());
        assert!(!backend.needs_hide());
        assert_eq!(calls.lock().as_slice(), &[(OWN, true)]);

        let frame = backend
            .grab(CaptureRegion::new(0, 0, 8, 4))
            .unwrap()
            .unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
    }

    #[test]
    fn test_degenerate_region_skips_desktop_grab() {
        let mut backend =
            DisplayAffinityBackend::new(FakeAffinity::default(), UnreachableGrabber, OWN);

        assert!(backend.grab(CaptureRegion::new(0, 0, 0, 10)).unwrap().is_none());
        assert!(backend.grab(CaptureRegion::new(0, 0, 10, -3)).unwrap().is_none());
    }

    #[test]
    fn test_flag_failure_falls_back_to_hiding() {
        let affinity = FakeAffinity {
            refuse: vec![OWN],
            ..Default::default()
        };
        let backend = DisplayAffinityBackend::new(affinity, SolidGrabber, OWN);

        assert!(!backend.affinity_ok());
        assert!(backend.needs_hide());
    }

    #[test]
    fn test_close_clears_own_and_every_companion_once() {
        let companion_a = WindowHandle(0x200);
        let companion_b = WindowHandle(0x300);
        let affinity = FakeAffinity {
            refuse: vec![companion_b],
            ..Default::default()
        };
        let calls = Arc::clone(&affinity.calls);
        let mut backend = DisplayAffinityBackend::new(affinity, SolidGrabber, OWN);

        backend.set_companion_windows(&[companion_a, companion_b]);
        backend.set_companion_windows(&[companion_a]);
        assert_eq!(backend.companions(), &[companion_a, companion_b]);

        calls.lock().clear();
        backend.close();
        backend.close();
        drop(backend);

        assert_eq!(
            calls.lock().as_slice(),
            &[(OWN, false), (companion_a, false), (companion_b, false)]
        );
    }

    #[test]
    fn test_drop_clears_flags() {
        let affinity = FakeAffinity::default();
        let calls = Arc::clone(&affinity.calls);
        let backend = DisplayAffinityBackend::new(affinity, SolidGrabber, OWN);

        drop(backend);
        assert_eq!(calls.lock().last(), Some(&(OWN, false)));
    }
}
