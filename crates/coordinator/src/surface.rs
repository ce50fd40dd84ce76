//! Seams to the windowing layer and the renderer

use capture::{CaptureRegion, Frame, WindowHandle};

/// A top-level window of this application: the overlay or a companion
///
/// All calls happen on the thread that owns the windows.
pub trait OverlayWindow {
    fn native_handle(&self) -> WindowHandle;

    /// Current on-screen rectangle in screen coordinates
    fn screen_rect(&self) -> CaptureRegion;

    /// Window opacity in [0, 1]
    fn opacity(&self) -> f64;

    fn set_opacity(&mut self, opacity: f64);

    fn is_visible(&self) -> bool;

    fn set_visible(&mut self, visible: bool);

    /// Push pending display updates to the compositor before returning
    fn flush_display(&mut self) {}
}

/// Consumer of captured frames
///
/// Keeps showing the last delivered frame until a new one arrives.
pub trait FrameSink {
    fn deliver(&mut self, frame: Frame);

    fn request_redraw(&mut self);
}
