//! Atomic definitions of the Tacit array VM: verb opcodes, the compiled
//! byte-stream encoding, and the fault codes surfaced by the evaluator.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod fault;
mod stream;
mod verb;

pub use fault::Fault;
pub use stream::{Code, SLOT_COUNT, STREAM_BYTES};
pub use verb::Verb;
