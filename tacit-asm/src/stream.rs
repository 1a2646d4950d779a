use crate::Verb;

/// Workspace slots per scope. Stream bytes below this value name a slot.
pub const SLOT_COUNT: usize = 32;

/// Capacity of a compiled scope body.
pub const STREAM_BYTES: usize = 256;

const VERB_BASE: u8 = 32;
const ASSIGN: u8 = 64;
const OPEN: u8 = 66;
const CLOSE: u8 = 67;

/// One byte of a compiled scope body.
///
/// The ranges follow the layout the evaluator scans: slot references below
/// [`SLOT_COUNT`], verb opcodes offset by 32, and a small set of control
/// bytes above the verb region. Parser-materialised literals are plain
/// `Slot` bytes; the constant lives in the slot it was compiled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Load the value bound in a workspace slot.
    Slot(u8),
    /// Apply a primitive verb.
    Verb(Verb),
    /// Store the accumulator into the slot named by the preceding byte.
    Assign,
    /// Start of a parenthesised group (the byte the evaluator recurses at).
    Open,
    /// End of a parenthesised group.
    Close,
}

impl Code {
    /// Pack into the single-byte stream representation.
    pub const fn encode(self) -> u8 {
        match self {
            Code::Slot(slot) => slot,
            Code::Verb(verb) => VERB_BASE + verb as u8,
            Code::Assign => ASSIGN,
            Code::Open => OPEN,
            Code::Close => CLOSE,
        }
    }

    /// Decode a stream byte. `None` marks a corrupt stream.
    pub fn decode(byte: u8) -> Option<Code> {
        match byte {
            b if (b as usize) < SLOT_COUNT => Some(Code::Slot(b)),
            b if (VERB_BASE..ASSIGN).contains(&b) => {
                Verb::try_from(b - VERB_BASE).ok().map(Code::Verb)
            }
            ASSIGN => Some(Code::Assign),
            OPEN => Some(Code::Open),
            CLOSE => Some(Code::Close),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use test_case::test_case;

    #[test_case(Code::Slot(0))]
    #[test_case(Code::Slot(31))]
    #[test_case(Code::Verb(Verb::Plus))]
    #[test_case(Code::Verb(Verb::MinOver))]
    #[test_case(Code::Assign)]
    #[test_case(Code::Open)]
    #[test_case(Code::Close)]
    fn encode_decode(code: Code) {
        assert_eq!(Some(code), Code::decode(code.encode()));
    }

    #[test]
    fn verb_bytes_stay_in_range() {
        for verb in Verb::iter() {
            let byte = Code::Verb(verb).encode();
            assert!((32..=95).contains(&byte));
        }
    }

    #[test]
    fn out_of_range_bytes_are_rejected() {
        assert_eq!(Code::decode(0xff), None);
        assert_eq!(Code::decode(96), None);
    }
}
