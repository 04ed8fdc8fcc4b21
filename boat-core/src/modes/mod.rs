//! The three-level mode hierarchy: Boat → Nav → (RC | Auto).
//!
//! Each level is a tagged variant type with an `enter` factory and a
//! `tick` that may return the identifier of a successor; the owner swaps
//! the variant in place. All construction and ticking happens on the
//! control task, so no other task ever observes a half-transitioned mode.

mod auto;
mod boat;
mod nav;
mod rc;

pub use auto::AutoMode;
pub use boat::BoatMode;
pub use nav::NavMode;
pub use rc::RcMode;

use crate::state::{BoatState, Fault};

/// Fold an actuator result into the fault set; actuator failures surface
/// as a hardware fault the armed guards act on, never as a panic.
pub(crate) fn note_hw<T>(state: &mut BoatState, result: Result<T, crate::actuators::HardwareError>) {
    if let Err(err) = result {
        tracing::warn!(%err, "actuator write failed");
        state.insert_fault(Fault::Hardware);
    }
}
