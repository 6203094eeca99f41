//! Map / navigation planner (§4.3): a pure planning function plus the
//! process-wide grid/calibration store and the async state machine that
//! drives a plan through the arbiter one pulse at a time.

mod navigator;
mod plan;
mod shared_state;

pub use navigator::{NavigationState, NavigatorError, NavigatorHandle};
pub use plan::plan;
pub use shared_state::SharedState;
