//! macOS adapters over CoreGraphics window lists
//!
//! Requires the Screen Recording permission on macOS 10.15+.

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::image::CGImage;
use core_graphics::window::{
    CGWindowID, CGWindowImageOption, CGWindowListOption, copy_window_info, create_image,
    create_image_from_array,
};
use std::ffi::c_void;
use tracing::{debug, trace};

use crate::{
    CaptureError, CaptureRegion, CaptureResult, DesktopGrabber, RawImage, WindowCompositor,
    WindowRecord,
};

const LIST_ON_SCREEN_ONLY: CGWindowListOption = 1 << 0;
const NULL_WINDOW_ID: CGWindowID = 0;
const IMAGE_BOUNDS_IGNORE_FRAMING: CGWindowImageOption = 1 << 0;
const IMAGE_NOMINAL_RESOLUTION: CGWindowImageOption = 1 << 4;

/// Ignore window shadows and capture at point (not pixel) resolution
const IMAGE_OPTIONS: CGWindowImageOption = IMAGE_BOUNDS_IGNORE_FRAMING | IMAGE_NOMINAL_RESOLUTION;

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    static kCGWindowNumber: CFStringRef;
    static kCGWindowOwnerPID: CFStringRef;
}

fn cg_rect(region: CaptureRegion) -> CGRect {
    CGRect::new(
        &CGPoint::new(region.x as f64, region.y as f64),
        &CGSize::new(region.width as f64, region.height as f64),
    )
}

/// Copy a CGImage into a raw BGRA description, honouring row padding
fn decode_image(image: &CGImage) -> CaptureResult<Option<RawImage>> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Ok(None);
    }
    if image.bits_per_pixel() != 32 {
        return Err(CaptureError::UnsupportedFormat(format!(
            "{} bits per pixel",
            image.bits_per_pixel()
        )));
    }

    let data = image.data();
    Ok(Some(RawImage {
        width: width as u32,
        height: height as u32,
        stride: image.bytes_per_row(),
        bytes_per_pixel: 4,
        data: data.bytes().to_vec(),
    }))
}

fn number_field(info: &CFDictionary<CFString, CFType>, key: CFStringRef) -> Option<i64> {
    // SAFETY: the key is a static CFString owned by CoreGraphics
    let key = unsafe { CFString::wrap_under_get_rule(key) };
    info.find(&key)?.downcast::<CFNumber>()?.to_i64()
}

/// Window-list compositor of the current login session
pub struct CoreGraphicsCompositor;

impl WindowCompositor for CoreGraphicsCompositor {
    fn on_screen_windows(&self) -> CaptureResult<Vec<WindowRecord>> {
        let list = copy_window_info(LIST_ON_SCREEN_ONLY, NULL_WINDOW_ID)
            .ok_or_else(|| CaptureError::CaptureFailed("window list unavailable".into()))?;

        let mut records = Vec::with_capacity(list.len() as usize);
        for item in list.iter() {
            let raw = *item as CFDictionaryRef;
            if raw.is_null() {
                continue;
            }
            // SAFETY: entries of the window info list are CFDictionaries
            let info: CFDictionary<CFString, CFType> =
                unsafe { CFDictionary::wrap_under_get_rule(raw) };

            // SAFETY: reading immutable framework constants
            let (pid_key, number_key) = unsafe { (kCGWindowOwnerPID, kCGWindowNumber) };
            let (Some(pid), Some(number)) =
                (number_field(&info, pid_key), number_field(&info, number_key))
            else {
                continue;
            };

            if let (Ok(owner_pid), Ok(id)) = (u32::try_from(pid), u32::try_from(number)) {
                records.push(WindowRecord { id, owner_pid });
            }
        }

        trace!(count = records.len(), "On-screen windows");
        Ok(records)
    }

    fn composite(&self, windows: &[u32], region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
        // Window ids travel as raw pointer-sized values, not CF objects
        let ids: Vec<*const c_void> = windows
            .iter()
            .map(|&id| id as usize as *const c_void)
            .collect();
        let array = CFArray::from_copyable(&ids);

        match create_image_from_array(cg_rect(region), array, IMAGE_OPTIONS) {
            Some(image) => decode_image(&image),
            None => {
                debug!(%region, "CGWindowListCreateImageFromArray returned no image");
                Ok(None)
            }
        }
    }
}

/// Composite of every on-screen window, ours included
pub struct CoreGraphicsGrabber;

impl DesktopGrabber for CoreGraphicsGrabber {
    fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
        match create_image(
            cg_rect(region),
            LIST_ON_SCREEN_ONLY,
            NULL_WINDOW_ID,
            IMAGE_OPTIONS,
        ) {
            Some(image) => decode_image(&image),
            None => Ok(None),
        }
    }
}
