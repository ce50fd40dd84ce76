//! Screen Capture - flicker-free capture of the screen behind an overlay
//!
//! Backends, best first per platform:
//! - Linux/X11: compositor backing-store read of the window below ours
//! - macOS: window-list composite excluding this process's windows
//! - Windows: display-affinity exclusion plus a GDI desktop grab
//! - anywhere: full desktop grab, overlay hidden around each grab

mod direct_window;
mod display_affinity;
mod error;
mod frame;
mod full_composite;
mod selector;
mod target_cache;
mod traits;
mod window_exclusion;

#[cfg(target_os = "linux")]
mod x11;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

pub use direct_window::{DirectWindowBackend, Exclusions, find_target, top_level_frame};
pub use display_affinity::DisplayAffinityBackend;
pub use error::*;
pub use frame::*;
pub use full_composite::FullCompositeBackend;
pub use selector::*;
pub use target_cache::{Target, TargetCache};
pub use traits::*;
pub use window_exclusion::WindowExclusionBackend;

#[cfg(target_os = "linux")]
pub use x11::{X11RootGrabber, X11WindowTree};

#[cfg(target_os = "macos")]
pub use macos::{CoreGraphicsCompositor, CoreGraphicsGrabber};

#[cfg(target_os = "windows")]
pub use self::windows::{GdiGrabber, Win32Affinity};

#[cfg(target_os = "macos")]
pub fn has_screen_recording_permission() -> bool {
    core_graphics::access::ScreenCaptureAccess::default().preflight()
}

#[cfg(not(target_os = "macos"))]
pub fn has_screen_recording_permission() -> bool {
    true
}

/// Create the best capture backend available for `own_window`
///
/// Never fails: when nothing better works the full-composite fallback is
/// returned.
pub fn create_capture(own_window: WindowHandle, config: &CaptureConfig) -> SelectedBackend {
    select_backend(own_window, config)
}
