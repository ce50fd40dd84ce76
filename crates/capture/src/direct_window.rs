//! Direct-window capture: read the compositor backing store of the window
//! below the overlay
//!
//! On a composited desktop every window keeps an off-screen backing store
//! that stays valid while it is occluded. Reading it from the window just
//! below ours never sees our own pixels, so nothing has to be hidden.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::target_cache::{Target, TargetCache};
use crate::{
    BackendKind, CaptureBackend, CaptureConfig, CaptureError, CaptureRegion, CaptureResult,
    DiscoveryMode, Frame, WindowHandle, WindowTree,
};

/// Bound on parent-link walks; real hierarchies are a handful deep
const MAX_TREE_DEPTH: usize = 64;

/// Windows the target search must never return
///
/// Only our own window and frame mark where the stacking walk starts;
/// companions are skipped wherever they sit, usually above us.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    own: Vec<WindowHandle>,
    companions: Vec<WindowHandle>,
}

impl Exclusions {
    /// Exclusions for our window and its top-level frame
    pub fn new(own: WindowHandle, own_frame: WindowHandle) -> Self {
        Self {
            own: dedup(vec![own, own_frame]),
            companions: Vec::new(),
        }
    }

    /// Add companion windows (and their frames) to the skip list
    pub fn with_companions(mut self, companions: impl IntoIterator<Item = WindowHandle>) -> Self {
        self.companions.extend(companions);
        self.companions = dedup(std::mem::take(&mut self.companions));
        self
    }

    pub fn is_own(&self, window: WindowHandle) -> bool {
        self.own.contains(&window)
    }

    pub fn contains(&self, window: WindowHandle) -> bool {
        self.is_own(window) || self.companions.contains(&window)
    }

    pub fn companions(&self) -> &[WindowHandle] {
        &self.companions
    }
}

/// Direct-window capture backend over any [`WindowTree`]
pub struct DirectWindowBackend<W: WindowTree + 'static> {
    tree: Arc<W>,
    own: WindowHandle,
    excluded: Arc<Exclusions>,
    cache: Option<TargetCache>,
}

impl<W: WindowTree + 'static> DirectWindowBackend<W> {
    /// Resolve our top-level frame and prepare target discovery
    pub fn new(tree: W, own: WindowHandle, config: &CaptureConfig) -> CaptureResult<Self> {
        let own_frame = top_level_frame(&tree, own)?;
        info!(
            "Direct-window capture: own window {} framed by {} ({:?} discovery)",
            own, own_frame, config.discovery
        );

        let cache = match config.discovery {
            DiscoveryMode::Inline => None,
            DiscoveryMode::Background => Some(TargetCache::new(
                config.refresh_interval,
                config.discovery_timeout(),
            )),
        };

        Ok(Self {
            tree: Arc::new(tree),
            own,
            excluded: Arc::new(Exclusions::new(own, own_frame)),
            cache,
        })
    }

    /// Our window, its frame and every registered companion
    pub fn exclusions(&self) -> &Exclusions {
        &self.excluded
    }

    fn grab_inline(&self, region: CaptureRegion) -> CaptureResult<Option<Frame>> {
        let Some(target) = find_target(self.tree.as_ref(), &self.excluded, region) else {
            trace!(%region, "No window below the overlay");
            return Ok(None);
        };

        match read_region(self.tree.as_ref(), target, region) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                debug!("Capture target {} unreadable: {}", target.window, e);
                Ok(None)
            }
        }
    }
}

impl<W: WindowTree + 'static> CaptureBackend for DirectWindowBackend<W> {
    fn kind(&self) -> BackendKind {
        BackendKind::DirectWindow
    }

    fn grab(&mut self, region: CaptureRegion) -> CaptureResult<Option<Frame>> {
        if region.is_degenerate() {
            return Ok(None);
        }

        let Some(cache) = self.cache.as_mut() else {
            return self.grab_inline(region);
        };

        let tree = Arc::clone(&self.tree);
        let excluded = Arc::clone(&self.excluded);
        let cached = cache.lookup(region, move |r| find_target(tree.as_ref(), &excluded, r));
        let Some(target) = cached else {
            return Ok(None);
        };

        match read_region(self.tree.as_ref(), target, region) {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                trace!(%region, "Cached capture target {} no longer overlaps", target.window);
                cache.invalidate();
                Ok(None)
            }
            Err(e) => {
                debug!("Cached capture target {} unreadable: {}", target.window, e);
                cache.invalidate();
                Ok(None)
            }
        }
    }

    fn needs_hide(&self) -> bool {
        false
    }

    fn set_companion_windows(&mut self, windows: &[WindowHandle]) {
        let mut companions = Vec::with_capacity(windows.len() * 2);
        for &window in windows {
            companions.push(window);
            match top_level_frame(self.tree.as_ref(), window) {
                Ok(frame) => companions.push(frame),
                Err(e) => warn!("Cannot resolve frame of companion {}: {}", window, e),
            }
        }
        self.excluded = Arc::new(self.excluded.as_ref().clone().with_companions(companions));

        if let Some(cache) = self.cache.as_mut() {
            cache.invalidate();
        }
    }

    fn close(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.invalidate();
        }
        debug!("Direct-window capture for {} closed", self.own);
    }
}

fn dedup(mut windows: Vec<WindowHandle>) -> Vec<WindowHandle> {
    windows.sort_unstable();
    windows.dedup();
    windows
}

/// Walk parent links up to the immediate child of the root
///
/// A reparenting window manager wraps each client in a decoration frame;
/// the frame, not the client, is what sits in the root's stacking order.
pub fn top_level_frame<W: WindowTree + ?Sized>(
    tree: &W,
    window: WindowHandle,
) -> CaptureResult<WindowHandle> {
    let root = tree.root();
    let mut current = window;

    for _ in 0..MAX_TREE_DEPTH {
        match tree.parent_of(current)? {
            Some(parent) if parent != root && parent.raw() != 0 => current = parent,
            _ => return Ok(current),
        }
    }

    Err(CaptureError::InitFailed(format!(
        "window hierarchy above {} deeper than {} levels",
        window, MAX_TREE_DEPTH
    )))
}

/// Find the window whose pixels lie directly below ours in `region`
///
/// Walks the managed stacking order front to back: everything up to and
/// including our own window or frame is skipped, the first later window
/// overlapping the region wins. Companions are skipped on both sides. Tool windows can be missing from the managed list, so
/// when that walk finds nothing the largest overlapping window among all
/// top-level windows below ours is used instead.
pub fn find_target<W: WindowTree + ?Sized>(
    tree: &W,
    excluded: &Exclusions,
    region: CaptureRegion,
) -> Option<Target> {
    match tree.managed_stacking() {
        Ok(stacking) => {
            let mut below_self = false;
            for window in stacking.front_to_back() {
                if excluded.is_own(window) {
                    below_self = true;
                    continue;
                }
                if !below_self || excluded.contains(window) {
                    continue;
                }
                if let Some(bounds) = tree.screen_bounds(window) {
                    if bounds.overlaps(&region) {
                        return Some(Target { window, bounds });
                    }
                }
            }
        }
        Err(e) => debug!("Managed stacking order unavailable: {}", e),
    }

    let all = match tree.all_windows() {
        Ok(all) => all,
        Err(e) => {
            debug!("Top-level window list unavailable: {}", e);
            return None;
        }
    };

    // Windows in front of ours are never candidates
    let first_below = all
        .front_to_back()
        .position(|window| excluded.is_own(window))
        .map_or(0, |pos| pos + 1);

    let mut best: Option<Target> = None;
    for window in all.front_to_back().skip(first_below) {
        if excluded.contains(window) {
            continue;
        }
        let Some(bounds) = tree.screen_bounds(window) else {
            continue;
        };
        if !bounds.overlaps(&region) {
            continue;
        }
        if best.is_none_or(|b| bounds.area() > b.bounds.area()) {
            best = Some(Target { window, bounds });
        }
    }
    best
}

/// Read the part of `region` covered by `target`, padded to the region size
fn read_region<W: WindowTree + ?Sized>(
    tree: &W,
    target: Target,
    region: CaptureRegion,
) -> CaptureResult<Option<Frame>> {
    let Some(visible) = region.intersection(&target.bounds) else {
        return Ok(None);
    };

    let local = visible.relative_to(&target.bounds);
    let frame = tree.read_pixels(target.window, local)?.into_frame()?;

    let (width, height) = (region.width as u32, region.height as u32);
    if frame.width == width && frame.height == height {
        return Ok(Some(frame));
    }

    let offset_x = (visible.x - region.x) as u32;
    let offset_y = (visible.y - region.y) as u32;
    Ok(Some(frame.padded(width, height, offset_x, offset_y)))
}
