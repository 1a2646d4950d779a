//! Runtime error surface.
//!
//! Primitives report a bare [`Fault`]; the evaluator attaches the glyph of
//! the failing verb before the error escapes to the read loop, which prints
//! the glyph followed by the fault's four-byte token.

use tacit_asm::Fault;

/// Result of a primitive or of one evaluation step.
pub(crate) type FaultResult<T> = Result<T, Fault>;

/// Error escaping the interpreter's public entry points.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// A fault, tagged with the glyph of the failing verb (or a space when
    /// no verb is at fault). The display form is the exact REPL output.
    #[error("{glyph}{}", fault.token())]
    Fault {
        /// Context glyph printed before the token.
        glyph: char,
        /// The underlying fault code.
        fault: Fault,
    },
    /// I/O failure while reading input or loading a script.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VmError {
    /// The underlying fault, if any.
    pub fn fault(&self) -> Option<Fault> {
        match self {
            VmError::Fault { fault, .. } => Some(*fault),
            VmError::Io(_) => None,
        }
    }

    /// Whether this error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        self.fault().is_some_and(Fault::is_fatal)
    }
}

impl From<Fault> for VmError {
    fn from(fault: Fault) -> Self {
        VmError::Fault { glyph: ' ', fault }
    }
}

pub(crate) trait WithGlyph<T> {
    /// Attach a context glyph to a bare fault.
    fn glyph(self, glyph: char) -> Result<T, VmError>;
}

impl<T> WithGlyph<T> for FaultResult<T> {
    fn glyph(self, glyph: char) -> Result<T, VmError> {
        self.map_err(|fault| VmError::Fault { glyph, fault })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_printed_form() {
        let err = VmError::Fault {
            glyph: '%',
            fault: Fault::Domain,
        };
        assert_eq!(err.to_string(), "% dom");
    }

    #[test]
    fn fatality_follows_the_fault() {
        assert!(VmError::from(Fault::OutOfMemory).is_fatal());
        assert!(!VmError::from(Fault::Rank).is_fatal());
    }
}
