//! Capture Coordinator - drives a capture backend behind a live overlay
//!
//! Ticks at a fixed rate on the window-owning thread and hands frames to
//! the renderer. When the backend cannot exclude our windows natively,
//! every grab is wrapped in a hide/settle/restore cycle.

mod config;
mod coordinator;
mod error;
mod surface;

pub use config::*;
pub use coordinator::*;
pub use error::*;
pub use surface::*;
