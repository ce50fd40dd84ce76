//! Capture backend trait abstraction and the OS adapter seams behind it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{CaptureRegion, CaptureResult, Frame, RawImage, StackingOrder, WindowHandle};

/// Capture strategy implemented by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Compositor backing-pixmap read of the window below ours
    DirectWindow,
    /// Composite of every on-screen window not owned by this process
    WindowExclusion,
    /// OS capture-exclusion flag plus a plain desktop grab
    DisplayAffinity,
    /// Plain desktop grab, no exclusion at all
    FullComposite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectWindow => "direct-window",
            Self::WindowExclusion => "window-exclusion",
            Self::DisplayAffinity => "display-affinity",
            Self::FullComposite => "full-composite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the direct-window backend finds the window below the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Walk the stacking list inside every grab
    #[default]
    Inline,
    /// Resolve on a worker thread and reuse the cached target between refreshes
    Background,
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target discovery strategy for the direct-window backend
    pub discovery: DiscoveryMode,
    /// Grabs between background target refreshes
    pub refresh_interval: u32,
    /// Background discovery results older than this are discarded
    pub discovery_timeout_ms: u64,
    /// Only try this backend (the full-composite fallback still applies)
    pub force_backend: Option<BackendKind>,
}

impl CaptureConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryMode::Inline,
            refresh_interval: 300, // ~10 s at 30 fps
            discovery_timeout_ms: 2000,
            force_backend: None,
        }
    }
}

/// Capture backend trait
///
/// Exactly one backend lives for the lifetime of the overlay. `close` is
/// called once on shutdown and must leave no window flagged or hidden.
pub trait CaptureBackend: Send {
    /// Which strategy this backend implements
    fn kind(&self) -> BackendKind;

    /// Capture the screen contents behind our windows inside `region`
    ///
    /// `Ok(None)` means nothing was captured this time (degenerate region,
    /// no target, transient OS failure). The returned frame's dimensions
    /// are authoritative and may differ from the region.
    fn grab(&mut self, region: CaptureRegion) -> CaptureResult<Option<Frame>>;

    /// True when our windows must be hidden around each grab
    fn needs_hide(&self) -> bool;

    /// Register auxiliary always-on-top windows of this application
    fn set_companion_windows(&mut self, windows: &[WindowHandle]);

    /// Release OS resources and undo any per-window state
    fn close(&mut self);
}

/// Window hierarchy and pixel access for compositor backing-store reads
pub trait WindowTree: Send + Sync {
    /// Desktop root window
    fn root(&self) -> WindowHandle;

    /// Parent of `window`, `None` at the top of the hierarchy
    fn parent_of(&self, window: WindowHandle) -> CaptureResult<Option<WindowHandle>>;

    /// Managed top-level windows as ordered by the window manager
    fn managed_stacking(&self) -> CaptureResult<StackingOrder>;

    /// Every direct child of the root, including unmanaged tool windows
    fn all_windows(&self) -> CaptureResult<StackingOrder>;

    /// Absolute screen bounds; `None` for unmapped or vanished windows
    fn screen_bounds(&self, window: WindowHandle) -> Option<CaptureRegion>;

    /// Read `local` (window coordinates) from the window's backing store
    fn read_pixels(&self, window: WindowHandle, local: CaptureRegion) -> CaptureResult<RawImage>;
}

/// On-screen window as reported by the window server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    /// Window server id
    pub id: u32,
    /// Process owning the window
    pub owner_pid: u32,
}

/// Composite capture restricted to an explicit window set
pub trait WindowCompositor: Send {
    /// Enumerate on-screen windows with their owning process
    fn on_screen_windows(&self) -> CaptureResult<Vec<WindowRecord>>;

    /// Composite `windows` inside `region`, ignoring window framing
    fn composite(&self, windows: &[u32], region: CaptureRegion) -> CaptureResult<Option<RawImage>>;
}

/// Per-window capture-exclusion flag
pub trait AffinityControl: Send {
    /// Mark `window` as excluded from (or included in) screen captures
    fn set_excluded(&self, window: WindowHandle, excluded: bool) -> CaptureResult<()>;
}

/// Unfiltered composite grab of the desktop
pub trait DesktopGrabber: Send {
    fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>>;
}
