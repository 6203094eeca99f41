//! Camera capture, object detector integration, and streaming encode
//! (§4.4, §4.5). The camera driver and detector model are opaque external
//! collaborators (§1); this crate defines the traits they implement and
//! the frame pipeline around them.

mod capture;
mod detector;
mod encode;
mod frame;

pub use capture::CaptureLoop;
pub use detector::{Detector, FilteredDetector, NullDetector};
pub use encode::{encode_jpeg, encode_with_overlay, EncodeError};
pub use frame::{FrameSource, TestPatternSource, VisionError};
