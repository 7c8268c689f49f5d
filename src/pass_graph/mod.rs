//! The render-pass graph: targets, feedback buffers and ordered passes.
//!
//! One preset is one statically registered [`PassGraph`]. Every frame the graph
//! walks its passes in order, resolves each pass's uniforms against the current
//! state of the resources, draws, and swaps feedback buffers:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │   Flow   │──▶│ Cascade  │──▶│  Lines   │──▶│  Output  │──▶ screen
//! │ feedback │   │ feedback │   │  target  │   │          │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!   ▲      │       ▲      │
//!   └ swap ┘       └ swap ┘
//! ```
//!
//! Non-feedback reads are same-frame fresh; feedback reads of a pass's own
//! buffer see the previous frame.

mod graph;
mod pass;
mod render_target;

pub use graph::PassGraph;
pub use pass::{BindFn, FrameState, Pass, PassTarget, ProgramHandle};
pub use render_target::{FeedbackBuffer, RenderTarget, ResourceId, ResourceSpec, scaled_size};
