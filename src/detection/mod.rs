//! Classification of audio units: admission control, the remote call and
//! threshold gating.

mod decision;
mod dispatcher;
mod policy;

pub use decision::{ClassificationDecision, UNKNOWN_LABEL};
pub use dispatcher::{DetectionDispatcher, InFlightGuard};
pub use policy::{raw_top, ThresholdPolicy};
