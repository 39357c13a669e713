//! rtl-core: Pure decode + tracking library for RTL rear-view bike radars.
//!
//! No async and no I/O, only the protocol and state machines. The
//! `rtl-monitor` binary wires these to notification sources and a display.

pub mod config;
pub mod continuation;
pub mod frame;
pub mod monitor;
pub mod projector;
pub mod registry;
pub mod render;
pub mod types;

// Re-export commonly used types at crate root
pub use continuation::ContinuationResolver;
pub use frame::{parse_frame, Frame};
pub use monitor::ThreatMonitor;
pub use projector::{Projector, ProjectorConfig};
pub use registry::{Diff, ThreatRegistry, ThreatView, VisualHooks};
pub use render::{HandleAllocator, Renderer, Scene, VisualId};
pub use types::*;
