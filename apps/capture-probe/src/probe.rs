//! Stand-ins for the overlay window and renderer

use capture::{CaptureRegion, Frame, WindowHandle};
use coordinator::{FrameSink, OverlayWindow};
use tracing::trace;

/// Overlay that exists only as a handle and a fixed rectangle
///
/// Opacity changes are logged rather than applied.
pub struct StaticWindow {
    handle: WindowHandle,
    rect: CaptureRegion,
    opacity: f64,
    visible: bool,
}

impl StaticWindow {
    pub fn new(handle: WindowHandle, rect: CaptureRegion) -> Self {
        Self {
            handle,
            rect,
            opacity: 1.0,
            visible: true,
        }
    }
}

impl OverlayWindow for StaticWindow {
    fn native_handle(&self) -> WindowHandle {
        self.handle
    }

    fn screen_rect(&self) -> CaptureRegion {
        self.rect
    }

    fn opacity(&self) -> f64 {
        self.opacity
    }

    fn set_opacity(&mut self, opacity: f64) {
        trace!(window = %self.handle, opacity, "set_opacity");
        self.opacity = opacity;
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Keeps the last frame and counts deliveries
#[derive(Default)]
pub struct ProbeSink {
    pub frames: u64,
    pub redraws: u64,
    pub last: Option<Frame>,
}

impl FrameSink for ProbeSink {
    fn deliver(&mut self, frame: Frame) {
        self.frames += 1;
        self.last = Some(frame);
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
    }
}

/// Encode an RGBA frame as binary PPM (alpha dropped)
pub fn encode_ppm(frame: &Frame) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", frame.width, frame.height);
    let mut out = Vec::with_capacity(header.len() + frame.width as usize * frame.height as usize * 3);
    out.extend_from_slice(header.as_bytes());
    for px in frame.data.chunks_exact(4) {
        out.extend_from_slice(&px[..3]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ppm() {
        let frame = Frame::from_rgba(2, 1, vec![1, 2, 3, 255, 4, 5, 6, 255]).unwrap();
        let ppm = encode_ppm(&frame);

        let header = b"P6\n2 1\n255\n";
        assert_eq!(&ppm[..header.len()], header);
        assert_eq!(&ppm[header.len()..], &[1u8, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_static_window_keeps_rect_and_opacity() {
        let rect = CaptureRegion::new(5, 5, 10, 10);
        let mut window = StaticWindow::new(WindowHandle(1), rect);
        window.set_opacity(0.0);

        assert_eq!(window.screen_rect(), rect);
        assert_eq!(window.opacity(), 0.0);
        assert!(window.is_visible());
    }
}
