//! Backend selection
//!
//! Candidates are tried in platform preference order; the first one whose
//! construction succeeds wins. Full-composite is always last and cannot
//! fail, so selection always yields a backend.

use tracing::{info, warn};

use crate::full_composite::FullCompositeBackend;
use crate::{
    BackendKind, CaptureBackend, CaptureConfig, CaptureError, CaptureResult, DesktopGrabber,
    WindowHandle,
};

/// Operating system family the crate was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

/// Candidate backends for a platform, best first, full-composite last
pub fn preferred_order(platform: Platform) -> Vec<BackendKind> {
    let mut order = match platform {
        Platform::Linux => vec![BackendKind::DirectWindow],
        Platform::MacOs => vec![BackendKind::WindowExclusion],
        Platform::Windows => vec![BackendKind::DisplayAffinity],
        Platform::Other => Vec::new(),
    };
    order.push(BackendKind::FullComposite);
    order
}

/// Outcome of backend selection
pub struct SelectedBackend {
    pub kind: BackendKind,
    pub backend: Box<dyn CaptureBackend>,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Constructs backends for a given window
///
/// The native implementation talks to the OS; tests substitute fakes.
pub trait BackendFactory {
    /// Build a backend of `kind`, or explain why it is unavailable
    ///
    /// Never asked for [`BackendKind::FullComposite`]; selection builds that
    /// one itself from [`BackendFactory::desktop_grabber`].
    fn build(
        &self,
        kind: BackendKind,
        own: WindowHandle,
        config: &CaptureConfig,
    ) -> CaptureResult<Box<dyn CaptureBackend>>;

    /// Desktop grabber for the full-composite fallback, if one can be opened
    fn desktop_grabber(&self) -> Option<Box<dyn DesktopGrabber>>;
}

/// Select a backend for `own` using the native OS adapters
pub fn select_backend(own: WindowHandle, config: &CaptureConfig) -> SelectedBackend {
    select_with(&NativeBackends, own, Platform::current(), config)
}

/// Select a backend using `factory`
pub fn select_with<F: BackendFactory + ?Sized>(
    factory: &F,
    own: WindowHandle,
    platform: Platform,
    config: &CaptureConfig,
) -> SelectedBackend {
    let candidates: Vec<BackendKind> = match config.force_backend {
        Some(forced) => {
            info!("Capture backend forced to {}", forced);
            vec![forced]
        }
        None => preferred_order(platform),
    };

    for kind in candidates {
        if kind == BackendKind::FullComposite {
            break;
        }
        match factory.build(kind, own, config) {
            Ok(backend) => {
                info!("Selected {} capture backend for window {}", kind, own);
                return SelectedBackend { kind, backend };
            }
            Err(e) => warn!("{} capture unavailable: {}", kind, e),
        }
    }

    info!("Selected full-composite capture backend for window {}", own);
    SelectedBackend {
        kind: BackendKind::FullComposite,
        backend: Box::new(FullCompositeBackend::new(factory.desktop_grabber())),
    }
}

/// Backends over the adapters compiled for this target
struct NativeBackends;

impl BackendFactory for NativeBackends {
    fn build(
        &self,
        kind: BackendKind,
        own: WindowHandle,
        config: &CaptureConfig,
    ) -> CaptureResult<Box<dyn CaptureBackend>> {
        match kind {
            BackendKind::DirectWindow => native::direct_window(own, config),
            BackendKind::WindowExclusion => native::window_exclusion(),
            BackendKind::DisplayAffinity => native::display_affinity(own),
            BackendKind::FullComposite => Err(CaptureError::NotAvailable(
                "full-composite is built by selection, not the factory".into(),
            )),
        }
    }

    fn desktop_grabber(&self) -> Option<Box<dyn DesktopGrabber>> {
        match native::desktop_grabber() {
            Ok(grabber) => Some(grabber),
            Err(e) => {
                warn!("No desktop grabber: {}", e);
                None
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod native {
    use super::*;
    use crate::direct_window::DirectWindowBackend;
    use crate::x11::{X11RootGrabber, X11WindowTree};

    pub fn direct_window(
        own: WindowHandle,
        config: &CaptureConfig,
    ) -> CaptureResult<Box<dyn CaptureBackend>> {
        let tree = X11WindowTree::connect()?;
        Ok(Box::new(DirectWindowBackend::new(tree, own, config)?))
    }

    pub fn window_exclusion() -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::NotAvailable(
            "window-exclusion capture requires macOS".into(),
        ))
    }

    pub fn display_affinity(_own: WindowHandle) -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::NotAvailable(
            "display-affinity capture requires Windows".into(),
        ))
    }

    pub fn desktop_grabber() -> CaptureResult<Box<dyn DesktopGrabber>> {
        Ok(Box::new(X11RootGrabber::connect()?))
    }
}

#[cfg(target_os = "macos")]
mod native {
    use super::*;
    use crate::macos::{CoreGraphicsCompositor, CoreGraphicsGrabber};
    use crate::window_exclusion::WindowExclusionBackend;

    pub fn direct_window(
        _own: WindowHandle,
        _config: &CaptureConfig,
    ) -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::NotAvailable(
            "direct-window capture requires X11".into(),
        ))
    }

    pub fn window_exclusion() -> CaptureResult<Box<dyn CaptureBackend>> {
        if !crate::has_screen_recording_permission() {
            return Err(CaptureError::PermissionDenied);
        }
        Ok(Box::new(WindowExclusionBackend::new(CoreGraphicsCompositor)))
    }

    pub fn display_affinity(_own: WindowHandle) -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::NotAvailable(
            "display-affinity capture requires Windows".into(),
        ))
    }

    pub fn desktop_grabber() -> CaptureResult<Box<dyn DesktopGrabber>> {
        Ok(Box::new(CoreGraphicsGrabber))
    }
}

#[cfg(target_os = "windows")]
mod native {
    use super::*;
    use crate::display_affinity::DisplayAffinityBackend;
    use crate::windows::{GdiGrabber, Win32Affinity};

    pub fn direct_window(
        _own: WindowHandle,
        _config: &CaptureConfig,
    ) -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::NotAvailable(
            "direct-window capture requires X11".into(),
        ))
    }

    pub fn window_exclusion() -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::NotAvailable(
            "window-exclusion capture requires macOS".into(),
        ))
    }

    pub fn display_affinity(own: WindowHandle) -> CaptureResult<Box<dyn CaptureBackend>> {
        Ok(Box::new(DisplayAffinityBackend::new(
            Win32Affinity,
            GdiGrabber,
            own,
        )))
    }

    pub fn desktop_grabber() -> CaptureResult<Box<dyn DesktopGrabber>> {
        Ok(Box::new(GdiGrabber))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod native {
    use super::*;

    pub fn direct_window(
        _own: WindowHandle,
        _config: &CaptureConfig,
    ) -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::UnsupportedPlatform)
    }

    pub fn window_exclusion() -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::UnsupportedPlatform)
    }

    pub fn display_affinity(_own: WindowHandle) -> CaptureResult<Box<dyn CaptureBackend>> {
        Err(CaptureError::UnsupportedPlatform)
    }

    pub fn desktop_grabber() -> CaptureResult<Box<dyn DesktopGrabber>> {
        Err(CaptureError::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureRegion, Frame};
    use parking_lot::Mutex;

    struct StubBackend(BackendKind);

    impl CaptureBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            self.0
        }
        fn grab(&mut self, _region: CaptureRegion) -> CaptureResult<Option<Frame>> {
            Ok(None)
        }
        fn needs_hide(&self) -> bool {
            false
        }
        fn set_companion_windows(&mut self, _windows: &[WindowHandle]) {}
        fn close(&mut self) {}
    }

    /// Builds only the kinds in `available`, recording every attempt
    struct FakeFactory {
        available: Vec<BackendKind>,
        attempts: Mutex<Vec<BackendKind>>,
    }

    impl FakeFactory {
        fn new(available: &[BackendKind]) -> Self {
            Self {
                available: available.to_vec(),
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    impl BackendFactory for FakeFactory {
        fn build(
            &self,
            kind: BackendKind,
            _own: WindowHandle,
            _config: &CaptureConfig,
        ) -> CaptureResult<Box<dyn CaptureBackend>> {
            self.attempts.lock().push(kind);
            if self.available.contains(&kind) {
                Ok(Box::new(StubBackend(kind)))
            } else {
                Err(CaptureError::NotAvailable(format!("{} missing", kind)))
            }
        }

        fn desktop_grabber(&self) -> Option<Box<dyn DesktopGrabber>> {
            None
        }
    }

    const OWN: WindowHandle = WindowHandle(0x42);

    #[test]
    fn test_preferred_order_ends_with_full_composite() {
        for platform in [
            Platform::Linux,
            Platform::MacOs,
            Platform::Windows,
            Platform::Other,
        ] {
            let order = preferred_order(platform);
            assert_eq!(order.last(), Some(&BackendKind::FullComposite));
        }
        assert_eq!(
            preferred_order(Platform::Linux),
            vec![BackendKind::DirectWindow, BackendKind::FullComposite]
        );
        assert_eq!(
            preferred_order(Platform::Other),
            vec![BackendKind::FullComposite]
        );
    }

    #[test]
    fn test_first_constructible_candidate_wins() {
        let factory = FakeFactory::new(&[BackendKind::WindowExclusion]);
        let selected = select_with(&factory, OWN, Platform::MacOs, &CaptureConfig::default());

        assert_eq!(selected.kind, BackendKind::WindowExclusion);
        assert_eq!(selected.backend.kind(), BackendKind::WindowExclusion);
    }

    #[test]
    fn test_construction_failure_falls_through_to_full_composite() {
        let factory = FakeFactory::new(&[]);
        let selected = select_with(&factory, OWN, Platform::Linux, &CaptureConfig::default());

        assert_eq!(selected.kind, BackendKind::FullComposite);
        assert!(selected.backend.needs_hide());
        assert_eq!(
            factory.attempts.lock().as_slice(),
            &[BackendKind::DirectWindow]
        );
    }

    #[test]
    fn test_unknown_platform_goes_straight_to_full_composite() {
        let factory = FakeFactory::new(&[BackendKind::DirectWindow]);
        let selected = select_with(&factory, OWN, Platform::Other, &CaptureConfig::default());

        assert_eq!(selected.kind, BackendKind::FullComposite);
        assert!(factory.attempts.lock().is_empty());
    }

    #[test]
    fn test_forced_backend_overrides_platform_order() {
        let factory = FakeFactory::new(&[BackendKind::DirectWindow, BackendKind::DisplayAffinity]);
        let config = CaptureConfig {
            force_backend: Some(BackendKind::DisplayAffinity),
            ..CaptureConfig::default()
        };
        let selected = select_with(&factory, OWN, Platform::Linux, &config);

        assert_eq!(selected.kind, BackendKind::DisplayAffinity);
        assert_eq!(
            factory.attempts.lock().as_slice(),
            &[BackendKind::DisplayAffinity]
        );
    }

    #[test]
    fn test_native_factory_does_not_build_full_composite() {
        let result = NativeBackends.build(BackendKind::FullComposite, OWN, &CaptureConfig::default());
        assert!(matches!(result, Err(CaptureError::NotAvailable(_))));
    }

    #[test]
    fn test_forced_full_composite_skips_other_candidates() {
        let factory = FakeFactory::new(&[BackendKind::DirectWindow]);
        let config = CaptureConfig {
            force_backend: Some(BackendKind::FullComposite),
            ..CaptureConfig::default()
        };
        let selected = select_with(&factory, OWN, Platform::Linux, &config);

        assert_eq!(selected.kind, BackendKind::FullComposite);
        assert!(factory.attempts.lock().is_empty());
    }
}
