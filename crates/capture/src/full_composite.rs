//! Full-composite capture: plain desktop grab with no exclusion
//!
//! Always constructible. The caller hides every one of our windows around
//! each grab, which costs one visible flicker per frame.

use tracing::{debug, info, warn};

use crate::{
    BackendKind, CaptureBackend, CaptureRegion, CaptureResult, DesktopGrabber, Frame, WindowHandle,
};

/// Last-resort capture backend
pub struct FullCompositeBackend {
    grabber: Option<Box<dyn DesktopGrabber>>,
}

impl FullCompositeBackend {
    pub fn new(grabber: Option<Box<dyn DesktopGrabber>>) -> Self {
        match grabber {
            Some(_) => info!("Full-composite capture: hiding overlay around every grab"),
            None => warn!("Full-composite capture has no desktop grabber, frames will be empty"),
        }
        Self { grabber }
    }
}

impl CaptureBackend for FullCompositeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::FullComposite
    }

    fn grab(&mut self, region: CaptureRegion) -> CaptureResult<Option<Frame>> {
        if region.is_degenerate() {
            return Ok(None);
        }
        let Some(grabber) = self.grabber.as_ref() else {
            return Ok(None);
        };

        match grabber.grab_desktop(region)? {
            Some(raw) => Ok(Some(raw.into_frame()?)),
            None => Ok(None),
        }
    }

    fn needs_hide(&self) -> bool {
        true
    }

    fn set_companion_windows(&mut self, _windows: &[WindowHandle]) {}

    fn close(&mut self) {
        debug!("Full-composite capture closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawImage;

    /// Returns a smaller image than requested, as a clipped screen edge would
    struct ClippedGrabber;

    impl DesktopGrabber for ClippedGrabber {
        fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
            let (w, h) = (region.width as u32 / 2, region.height as u32);
            Ok(Some(RawImage {
                width: w,
                height: h,
                stride: w as usize * 3,
                bytes_per_pixel: 3,
                data: vec![0x20; w as usize * h as usize * 3],
            }))
        }
    }

    #[test]
    fn test_always_needs_hide() {
        let backend = FullCompositeBackend::new(None);
        assert!(backend.needs_hide());
        assert_eq!(backend.kind(), BackendKind::FullComposite);
    }

    #[test]
    fn test_frame_uses_returned_dimensions() {
        let mut backend = FullCompositeBackend::new(Some(Box::new(ClippedGrabber)));
        let frame = backend
            .grab(CaptureRegion::new(0, 0, 64, 48))
            .unwrap()
            .unwrap();
        assert_eq!((frame.width, frame.height), (32, 48));
    }

    #[test]
    fn test_degenerate_region_returns_before_grabbing() {
        struct UnreachableGrabber;
        impl DesktopGrabber for UnreachableGrabber {
            fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
                panic!("desktop grab issued for {}", region);
            }
        }

        let mut backend = FullCompositeBackend::new(Some(Box::new(UnreachableGrabber)));
        assert!(backend.grab(CaptureRegion::new(0, 0, -5, 48)).unwrap().is_none());
    }

    #[test]
    fn test_without_grabber_yields_nothing() {
        let mut backend = FullCompositeBackend::new(None);
        assert!(backend.grab(CaptureRegion::new(0, 0, 64, 48)).unwrap().is_none());
    }
}
