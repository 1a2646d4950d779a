//! Tagged value word of the Tacit array VM.
//!
//! A [`Value`] is one 64-bit word: either an immediate scalar (an *atom*)
//! or a handle to a refcounted heap array (a *boxed* value). The packing is
//! canonical: two atoms with the same logical content are bit-identical.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod sym;
mod tag;
mod value;

pub use sym::Sym;
pub use tag::Tag;
pub use value::{Atom, Value};

/// Maximum element count representable in a boxed word (27 bits).
pub const MAX_COUNT: usize = (1 << 27) - 1;

/// Maximum row count representable in a boxed word (16 bits).
pub const MAX_ROWS: usize = (1 << 16) - 1;

/// Number of entries in the handle table; handle indices fit in 8 bits.
pub const HANDLE_COUNT: usize = 256;
