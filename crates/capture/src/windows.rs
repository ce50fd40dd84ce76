//! Win32 adapters: display affinity flag and GDI desktop grab

use std::ffi::c_void;
use tracing::debug;
use ::windows::Win32::Foundation::HWND;
use ::windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CAPTUREBLT, CreateCompatibleBitmap,
    CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ROP_CODE,
    ReleaseDC, SRCCOPY, SelectObject,
};
use ::windows::Win32::UI::WindowsAndMessaging::{
    SetWindowDisplayAffinity, WDA_EXCLUDEFROMCAPTURE, WDA_NONE,
};

use crate::{
    AffinityControl, CaptureError, CaptureRegion, CaptureResult, DesktopGrabber, RawImage,
    WindowHandle,
};

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw() as isize as *mut c_void)
}

/// `SetWindowDisplayAffinity` on top-level windows of this process
pub struct Win32Affinity;

impl AffinityControl for Win32Affinity {
    fn set_excluded(&self, window: WindowHandle, excluded: bool) -> CaptureResult<()> {
        let affinity = if excluded {
            WDA_EXCLUDEFROMCAPTURE
        } else {
            WDA_NONE
        };

        unsafe {
            SetWindowDisplayAffinity(hwnd(window), affinity).map_err(|e| {
                CaptureError::Platform(format!("SetWindowDisplayAffinity({}): {}", window, e))
            })
        }
    }
}

/// Screen DC blit; honours display affinity and includes layered windows
pub struct GdiGrabber;

impl DesktopGrabber for GdiGrabber {
    fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
        let (width, height) = (region.width, region.height);
        let stride = width as usize * 4;
        let mut data = vec![0u8; stride * height as usize];

        unsafe {
            let screen_dc = GetDC(None);
            if screen_dc.is_invalid() {
                return Err(CaptureError::CaptureFailed("failed to get screen DC".into()));
            }

            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let old_bitmap = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                screen_dc,
                region.x,
                region.y,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            );

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    biHeight: -height, // top-down
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                bmiColors: [Default::default()],
            };

            let lines = if blit.is_ok() {
                GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(data.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(None, screen_dc);

            if let Err(e) = blit {
                return Err(CaptureError::CaptureFailed(format!("BitBlt: {}", e)));
            }
            if lines != height {
                debug!(lines, %region, "GetDIBits copied a partial image");
                return Ok(None);
            }
        }

        Ok(Some(RawImage {
            width: width as u32,
            height: height as u32,
            stride,
            bytes_per_pixel: 4,
            data,
        }))
    }
}
