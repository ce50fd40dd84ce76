//! X11 adapters over x11rb
//!
//! Protocol errors come back as `ReplyError` values on the request that
//! caused them, so a window that vanished between two requests simply
//! yields an error for that request.

use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::ErrorKind;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, GetImageReply, ImageFormat, ImageOrder, MapState,
};
use x11rb::rust_connection::RustConnection;

use crate::{
    CaptureError, CaptureRegion, CaptureResult, DesktopGrabber, RawImage, StackingOrder,
    WindowHandle, WindowTree,
};

const ALL_PLANES: u32 = !0;

/// Open display connection plus the setup data needed to decode images
struct X11Display {
    conn: RustConnection,
    root: u32,
}

impl X11Display {
    fn open() -> CaptureResult<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| CaptureError::NotAvailable(format!("cannot open X11 display: {}", e)))?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| CaptureError::InitFailed(format!("no X11 screen {}", screen_num)))?;

        if conn.setup().image_byte_order != ImageOrder::LSB_FIRST {
            return Err(CaptureError::UnsupportedFormat(
                "MSB-first X11 image byte order".into(),
            ));
        }

        Ok(Self { conn, root })
    }

    /// Run one request/reply pair, mapping errors against `window`
    fn checked<R>(
        &self,
        window: u32,
        request: impl FnOnce(&RustConnection) -> Result<R, ReplyError>,
    ) -> CaptureResult<R> {
        request(&self.conn).map_err(|e| map_reply_error(window, e))
    }

    fn get_image(&self, drawable: u32, area: CaptureRegion) -> CaptureResult<RawImage> {
        let (x, y) = (to_i16(area.x)?, to_i16(area.y)?);
        let (width, height) = (to_u16(area.width)?, to_u16(area.height)?);

        let reply = self.checked(drawable, |conn| {
            Ok(conn
                .get_image(ImageFormat::Z_PIXMAP, drawable, x, y, width, height, ALL_PLANES)?
                .reply()?)
        })?;

        self.decode(reply, width, height)
    }

    fn decode(&self, reply: GetImageReply, width: u16, height: u16) -> CaptureResult<RawImage> {
        let format = self
            .conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == reply.depth)
            .ok_or_else(|| {
                CaptureError::UnsupportedFormat(format!("no pixmap format for depth {}", reply.depth))
            })?;

        let bits_per_pixel = format.bits_per_pixel as usize;
        if bits_per_pixel != 24 && bits_per_pixel != 32 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "{} bits per pixel",
                bits_per_pixel
            )));
        }

        let pad = (format.scanline_pad as usize).max(8);
        let stride = (width as usize * bits_per_pixel).div_ceil(pad) * pad / 8;

        Ok(RawImage {
            width: width as u32,
            height: height as u32,
            stride,
            bytes_per_pixel: bits_per_pixel / 8,
            data: reply.data,
        })
    }
}

fn map_reply_error(window: u32, error: ReplyError) -> CaptureError {
    match error {
        ReplyError::X11Error(e)
            if matches!(e.error_kind, ErrorKind::Window | ErrorKind::Drawable) =>
        {
            CaptureError::StaleTarget(window as u64)
        }
        ReplyError::X11Error(e) => {
            CaptureError::CaptureFailed(format!("X11 {:?} error on {:#x}", e.error_kind, window))
        }
        ReplyError::ConnectionError(e) => connection_error(e),
    }
}

fn connection_error(error: ConnectionError) -> CaptureError {
    CaptureError::Platform(format!("X11 connection: {}", error))
}

fn to_i16(value: i32) -> CaptureResult<i16> {
    i16::try_from(value)
        .map_err(|_| CaptureError::CaptureFailed(format!("coordinate {} out of X11 range", value)))
}

fn to_u16(value: i32) -> CaptureResult<u16> {
    u16::try_from(value)
        .map_err(|_| CaptureError::CaptureFailed(format!("extent {} out of X11 range", value)))
}

fn window_id(window: WindowHandle) -> CaptureResult<u32> {
    u32::try_from(window.raw())
        .map_err(|_| CaptureError::StaleTarget(window.raw()))
}

/// Window hierarchy of the default X11 screen
pub struct X11WindowTree {
    display: X11Display,
    stacking_atom: u32,
}

impl X11WindowTree {
    pub fn connect() -> CaptureResult<Self> {
        let display = X11Display::open()?;
        let root = display.root;
        let stacking_atom = display.checked(root, |conn| {
            Ok(conn
                .intern_atom(false, b"_NET_CLIENT_LIST_STACKING")?
                .reply()?
                .atom)
        })?;

        info!("Connected to X11 display, root window {:#x}", root);
        Ok(Self {
            display,
            stacking_atom,
        })
    }
}

impl WindowTree for X11WindowTree {
    fn root(&self) -> WindowHandle {
        WindowHandle::from(self.display.root)
    }

    fn parent_of(&self, window: WindowHandle) -> CaptureResult<Option<WindowHandle>> {
        let id = window_id(window)?;
        let tree = self
            .display
            .checked(id, |conn| Ok(conn.query_tree(id)?.reply()?))?;

        Ok((tree.parent != 0).then(|| WindowHandle::from(tree.parent)))
    }

    fn managed_stacking(&self) -> CaptureResult<StackingOrder> {
        let root = self.display.root;
        let atom = self.stacking_atom;
        let reply = self.display.checked(root, |conn| {
            Ok(conn
                .get_property(false, root, atom, AtomEnum::WINDOW, 0, u32::MAX)?
                .reply()?)
        })?;

        let windows = reply.value32().ok_or_else(|| {
            CaptureError::NotAvailable("_NET_CLIENT_LIST_STACKING not set on root".into())
        })?;

        Ok(StackingOrder::from_bottom_to_top(
            windows.map(WindowHandle::from).collect(),
        ))
    }

    fn all_windows(&self) -> CaptureResult<StackingOrder> {
        let root = self.display.root;
        let tree = self
            .display
            .checked(root, |conn| Ok(conn.query_tree(root)?.reply()?))?;

        Ok(StackingOrder::from_bottom_to_top(
            tree.children.into_iter().map(WindowHandle::from).collect(),
        ))
    }

    fn screen_bounds(&self, window: WindowHandle) -> Option<CaptureRegion> {
        let id = window_id(window).ok()?;
        let root = self.display.root;

        let lookup = self.display.checked(id, |conn| {
            let attributes = conn.get_window_attributes(id)?.reply()?;
            if attributes.map_state != MapState::VIEWABLE {
                return Ok(None);
            }
            let geometry = conn.get_geometry(id)?.reply()?;
            let origin = conn.translate_coordinates(id, root, 0, 0)?.reply()?;
            Ok(Some(CaptureRegion::new(
                origin.dst_x as i32,
                origin.dst_y as i32,
                geometry.width as i32,
                geometry.height as i32,
            )))
        });

        match lookup {
            Ok(bounds) => bounds,
            Err(e) => {
                debug!("No bounds for window {}: {}", window, e);
                None
            }
        }
    }

    fn read_pixels(&self, window: WindowHandle, local: CaptureRegion) -> CaptureResult<RawImage> {
        self.display.get_image(window_id(window)?, local)
    }
}

/// Root-window grab of the composited desktop
pub struct X11RootGrabber {
    display: X11Display,
}

impl X11RootGrabber {
    pub fn connect() -> CaptureResult<Self> {
        Ok(Self {
            display: X11Display::open()?,
        })
    }
}

impl DesktopGrabber for X11RootGrabber {
    fn grab_desktop(&self, region: CaptureRegion) -> CaptureResult<Option<RawImage>> {
        let root = self.display.root;
        let geometry = self
            .display
            .checked(root, |conn| Ok(conn.get_geometry(root)?.reply()?))?;
        let screen = CaptureRegion::new(0, 0, geometry.width as i32, geometry.height as i32);

        // GetImage fails outright on areas outside the root
        let Some(visible) = region.intersection(&screen) else {
            return Ok(None);
        };

        self.display.get_image(root, visible).map(Some)
    }
}
