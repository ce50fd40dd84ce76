//! Captured frame data structures

use bytes::Bytes;
use std::fmt;
use std::time::Instant;

use crate::{CaptureError, CaptureResult};

/// Bytes per pixel of a delivered frame (RGBA8)
pub const FRAME_BYTES_PER_PIXEL: usize = 4;

/// Screen-space rectangle in integer pixels
///
/// Width and height are signed: a live window rectangle can collapse to
/// zero or negative extents during a resize, and such a region is never
/// captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when there is nothing to capture
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Calculate area (zero for degenerate regions)
    pub fn area(&self) -> u64 {
        if self.is_degenerate() {
            return 0;
        }
        self.width as u64 * self.height as u64
    }

    /// Strict overlap test: touching edges do not overlap
    pub fn overlaps(&self, other: &CaptureRegion) -> bool {
        if self.is_degenerate() || other.is_degenerate() {
            return false;
        }
        (self.x as i64) < other.right()
            && self.right() > other.x as i64
            && (self.y as i64) < other.bottom()
            && self.bottom() > other.y as i64
    }

    /// Overlapping part of two regions, if any
    pub fn intersection(&self, other: &CaptureRegion) -> Option<CaptureRegion> {
        if !self.overlaps(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        Some(CaptureRegion {
            x,
            y,
            width: (right - x as i64) as i32,
            height: (bottom - y as i64) as i32,
        })
    }

    /// Express this region relative to another region's origin
    pub fn relative_to(&self, origin: &CaptureRegion) -> CaptureRegion {
        CaptureRegion {
            x: self.x.saturating_sub(origin.x),
            y: self.y.saturating_sub(origin.y),
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Opaque platform-native window identifier
///
/// X11 window ids, CoreGraphics window numbers and Win32 `HWND`s all fit
/// in 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u64);

impl WindowHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u32> for WindowHandle {
    fn from(id: u32) -> Self {
        Self(id as u64)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Window stacking order as maintained by the window manager
///
/// Stored front-to-back; built from whichever direction the OS reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackingOrder {
    front_to_back: Vec<WindowHandle>,
}

impl StackingOrder {
    pub fn from_front_to_back(windows: Vec<WindowHandle>) -> Self {
        Self {
            front_to_back: windows,
        }
    }

    /// EWMH `_NET_CLIENT_LIST_STACKING` and `XQueryTree` both list
    /// bottom-most first
    pub fn from_bottom_to_top(mut windows: Vec<WindowHandle>) -> Self {
        windows.reverse();
        Self {
            front_to_back: windows,
        }
    }

    pub fn front_to_back(&self) -> impl Iterator<Item = WindowHandle> + '_ {
        self.front_to_back.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.front_to_back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.front_to_back.is_empty()
    }

    /// Front-to-back index of a window
    pub fn position(&self, window: WindowHandle) -> Option<usize> {
        self.front_to_back.iter().position(|w| *w == window)
    }
}

/// Captured frame: RGBA8, row-major, top-down, tightly packed
///
/// Dimensions are whatever the backend produced; they may differ from the
/// requested region (DPI scaling, screen-edge clipping).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data
    pub data: Bytes,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap an RGBA8 buffer, checking its length against the dimensions
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> CaptureResult<Self> {
        let expected = width as usize * height as usize * FRAME_BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(CaptureError::CaptureFailed(format!(
                "RGBA buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self {
            data: Bytes::from(data),
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * FRAME_BYTES_PER_PIXEL
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * FRAME_BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + FRAME_BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Place this frame at (`offset_x`, `offset_y`) on an opaque black canvas
    /// of the given size. Parts falling outside the canvas are dropped.
    pub fn padded(&self, width: u32, height: u32, offset_x: u32, offset_y: u32) -> Frame {
        let canvas_stride = width as usize * FRAME_BYTES_PER_PIXEL;
        let mut canvas = opaque_black(width, height);

        let copy_width = self.width.min(width.saturating_sub(offset_x)) as usize;
        let copy_height = self.height.min(height.saturating_sub(offset_y)) as usize;
        let row_bytes = copy_width * FRAME_BYTES_PER_PIXEL;

        for row in 0..copy_height {
            let src = row * self.stride();
            let dst = (row + offset_y as usize) * canvas_stride
                + offset_x as usize * FRAME_BYTES_PER_PIXEL;
            canvas[dst..dst + row_bytes].copy_from_slice(&self.data[src..src + row_bytes]);
        }

        Frame {
            data: Bytes::from(canvas),
            width,
            height,
            captured_at: self.captured_at,
        }
    }
}

fn opaque_black(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0u8; width as usize * height as usize * FRAME_BYTES_PER_PIXEL];
    for px in data.chunks_exact_mut(FRAME_BYTES_PER_PIXEL) {
        px[3] = 0xFF;
    }
    data
}

/// Pixel data as handed back by an OS capture call
///
/// Channels are stored little-endian blue-green-red, optionally followed
/// by an alpha or padding byte. Rows may carry trailing padding.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * bytes_per_pixel`
    pub stride: usize,
    /// 3 (BGR) or 4 (BGRA / BGRX)
    pub bytes_per_pixel: usize,
    pub data: Vec<u8>,
}

impl RawImage {
    /// Convert to an RGBA8 frame with alpha forced to fully opaque
    pub fn into_frame(self) -> CaptureResult<Frame> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::CaptureFailed(format!(
                "empty image {}x{}",
                self.width, self.height
            )));
        }
        if self.bytes_per_pixel != 3 && self.bytes_per_pixel != 4 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{} bits per pixel",
                self.bytes_per_pixel * 8
            )));
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let row_bytes = width * self.bytes_per_pixel;
        if self.stride < row_bytes {
            return Err(CaptureError::UnsupportedFormat(format!(
                "stride {} shorter than row of {} bytes",
                self.stride, row_bytes
            )));
        }
        let needed = self.stride * (height - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(CaptureError::CaptureFailed(format!(
                "pixel buffer truncated: {} bytes, need {}",
                self.data.len(),
                needed
            )));
        }

        let mut rgba = Vec::with_capacity(width * height * FRAME_BYTES_PER_PIXEL);
        for row in self.data.chunks(self.stride).take(height) {
            for px in row[..row_bytes].chunks_exact(self.bytes_per_pixel) {
                rgba.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
            }
        }

        Frame::from_rgba(self.width, self.height, rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_overlap_excludes_touching_edges() {
        let a = CaptureRegion::new(0, 0, 100, 100);
        let b = CaptureRegion::new(100, 0, 50, 50);
        let c = CaptureRegion::new(99, 99, 10, 10);

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert_eq!(a.intersection(&c), Some(CaptureRegion::new(99, 99, 1, 1)));
    }

    #[test]
    fn test_degenerate_region_never_overlaps() {
        let a = CaptureRegion::new(0, 0, 100, 100);
        let empty = CaptureRegion::new(10, 10, 0, 20);
        let negative = CaptureRegion::new(10, 10, 20, -5);

        assert!(empty.is_degenerate());
        assert!(negative.is_degenerate());
        assert!(!a.overlaps(&empty));
        assert!(!negative.overlaps(&a));
        assert_eq!(negative.area(), 0);
    }

    #[test]
    fn test_stacking_order_from_bottom_to_top() {
        let order = StackingOrder::from_bottom_to_top(vec![
            WindowHandle(1),
            WindowHandle(2),
            WindowHandle(3),
        ]);
        let front: Vec<_> = order.front_to_back().collect();
        assert_eq!(front, vec![WindowHandle(3), WindowHandle(2), WindowHandle(1)]);
        assert_eq!(order.position(WindowHandle(1)), Some(2));
    }

    #[test]
    fn test_raw_image_bgrx_with_stride_padding() {
        // 2x2 BGRX, 12-byte rows (4 bytes of padding)
        let data = vec![
            1, 2, 3, 0, 4, 5, 6, 0, 0xAA, 0xAA, 0xAA, 0xAA, //
            7, 8, 9, 0, 10, 11, 12, 0, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        let raw = RawImage {
            width: 2,
            height: 2,
            stride: 12,
            bytes_per_pixel: 4,
            data,
        };

        let frame = raw.into_frame().unwrap();
        assert_eq!(frame.data.len(), 16);
        assert_eq!(frame.pixel(0, 0), Some([3, 2, 1, 255]));
        assert_eq!(frame.pixel(1, 1), Some([12, 11, 10, 255]));
    }

    #[test]
    fn test_raw_image_24_bit() {
        let raw = RawImage {
            width: 2,
            height: 1,
            stride: 8,
            bytes_per_pixel: 3,
            data: vec![10, 20, 30, 40, 50, 60, 0, 0],
        };

        let frame = raw.into_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some([30, 20, 10, 255]));
        assert_eq!(frame.pixel(1, 0), Some([60, 50, 40, 255]));
    }

    #[test]
    fn test_raw_image_rejects_truncated_buffer() {
        let raw = RawImage {
            width: 4,
            height: 4,
            stride: 16,
            bytes_per_pixel: 4,
            data: vec![0; 40],
        };
        assert!(raw.into_frame().is_err());
    }

    #[test]
    fn test_padded_places_content_at_offset() {
        let frame = Frame::from_rgba(1, 1, vec![9, 9, 9, 255]).unwrap();
        let padded = frame.padded(3, 2, 2, 1);

        assert_eq!(padded.width, 3);
        assert_eq!(padded.height, 2);
        assert_eq!(padded.pixel(2, 1), Some([9, 9, 9, 255]));
        assert_eq!(padded.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(padded.pixel(1, 1), Some([0, 0, 0, 255]));
    }
}
