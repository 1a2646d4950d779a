use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
/// Fault representation for the evaluator.
///
/// Every primitive either returns a value or one of these codes. The
/// evaluator releases pending operands and surfaces the code together with
/// the glyph of the failing verb; [`Fault::is_fatal`] faults terminate the
/// process instead of resuming the read loop.
pub enum Fault {
    /// The verb exists but this operand combination is not implemented.
    NotYetImplemented = 0x00,
    /// Operand shapes disagree (e.g. matrix dimensions in a product).
    Rank = 0x01,
    /// Two arrays disagree on element count.
    Length = 0x02,
    /// No kernel exists for this tag combination.
    Type = 0x03,
    /// Mathematically invalid argument, e.g. modulo by zero or the square
    /// root of a negative number.
    Domain = 0x04,
    /// An index lies outside the bounds of the indexed array.
    Index = 0x05,
    /// Both the pool and the handle free list are exhausted. Fatal.
    OutOfMemory = 0x06,
    /// A reference count would exceed its 6-bit ceiling. Fatal.
    RefcountOverflow = 0x07,
    /// The source line could not be compiled.
    Parse = 0x08,
    /// A scope body was applied or redefined while already on the call
    /// stack.
    InUse = 0x09,
}

impl Fault {
    /// The four-byte token printed for this fault, leading space included.
    pub const fn token(self) -> &'static str {
        match self {
            Fault::NotYetImplemented => " nyi",
            Fault::Rank => " rnk",
            Fault::Length => " len",
            Fault::Type => " typ",
            Fault::Domain => " dom",
            Fault::Index => " idx",
            Fault::OutOfMemory => " oom",
            Fault::RefcountOverflow => " ref",
            Fault::Parse => " prs",
            Fault::InUse => " use",
        }
    }

    /// Whether the fault terminates the process rather than the expression.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Fault::OutOfMemory | Fault::RefcountOverflow)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<u8> for Fault {
    /// Converts the `u8` into a `Fault`, defaulting to `NotYetImplemented`.
    fn from(b: u8) -> Self {
        use Fault::*;
        match b {
            0x01 => Rank,
            0x02 => Length,
            0x03 => Type,
            0x04 => Domain,
            0x05 => Index,
            0x06 => OutOfMemory,
            0x07 => RefcountOverflow,
            0x08 => Parse,
            0x09 => InUse,
            _ => NotYetImplemented,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn token_shape() {
        for fault in Fault::iter() {
            let token = fault.token();
            assert_eq!(token.len(), 4, "{fault} token must be four bytes");
            assert!(token.starts_with(' '));
        }
    }

    #[test]
    fn code_round_trip() {
        for fault in Fault::iter() {
            assert_eq!(fault, Fault::from(fault as u8));
        }
    }

    #[test]
    fn fatality() {
        assert!(Fault::OutOfMemory.is_fatal());
        assert!(Fault::RefcountOverflow.is_fatal());
        assert!(!Fault::Rank.is_fatal());
        assert!(!Fault::Parse.is_fatal());
    }
}
