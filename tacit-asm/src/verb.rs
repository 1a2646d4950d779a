use core::fmt;

/// Primitive verb opcodes.
///
/// A verb is an opcode in `0..32`. Most glyphs carry both a monadic and a
/// dyadic meaning, resolved by the evaluator from the presence of a left
/// operand. The trailing `*Over` entries are the reduction-derived forms
/// the compiler emits for a verb glyph followed by `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Verb {
    /// `+` — flip (transpose) / add.
    Plus = 0x00,
    /// `-` — negate / subtract.
    Minus = 0x01,
    /// `*` — square root / multiply.
    Star = 0x02,
    /// `%` — reciprocal / divide.
    Percent = 0x03,
    /// `!` — iota / modulo.
    Bang = 0x04,
    /// `&` — absolute value / minimum.
    Amp = 0x05,
    /// `|` — reverse / maximum.
    Pipe = 0x06,
    /// `<` — grade up / less-than.
    Lt = 0x07,
    /// `>` — grade down / greater-than.
    Gt = 0x08,
    /// `=` — diagonal / equal.
    Eq = 0x09,
    /// `~` — logical not.
    Tilde = 0x0a,
    /// `,` — ravel / catenate.
    Comma = 0x0b,
    /// `#` — count / reshape.
    Hash = 0x0c,
    /// `@` — gather by index array.
    At = 0x0d,
    /// `?` — deterministic random floats.
    Query = 0x0e,
    /// `.` — matrix product, dot product on two vectors.
    Dot = 0x0f,
    /// `^` — exponential.
    Caret = 0x10,
    /// `$` — RMS-normalise / cast to the tag named by a symbol.
    Dollar = 0x11,
    /// `'` — softmax.
    Quote = 0x12,
    /// `+/` — sum over.
    SumOver = 0x13,
    /// `|/` — max over.
    MaxOver = 0x14,
    /// `&/` — min over.
    MinOver = 0x15,
}

impl Verb {
    /// Number of defined opcodes.
    pub const COUNT: usize = 22;

    /// The source glyph. Derived forms report the glyph of their base verb;
    /// the `/` suffix is a compiler artifact, not a verb of its own.
    pub const fn glyph(self) -> char {
        match self {
            Verb::Plus | Verb::SumOver => '+',
            Verb::Minus => '-',
            Verb::Star => '*',
            Verb::Percent => '%',
            Verb::Bang => '!',
            Verb::Amp | Verb::MinOver => '&',
            Verb::Pipe | Verb::MaxOver => '|',
            Verb::Lt => '<',
            Verb::Gt => '>',
            Verb::Eq => '=',
            Verb::Tilde => '~',
            Verb::Comma => ',',
            Verb::Hash => '#',
            Verb::At => '@',
            Verb::Query => '?',
            Verb::Dot => '.',
            Verb::Caret => '^',
            Verb::Dollar => '$',
            Verb::Quote => '\'',
        }
    }

    /// Base verb for a glyph.
    pub const fn from_glyph(glyph: char) -> Option<Verb> {
        Some(match glyph {
            '+' => Verb::Plus,
            '-' => Verb::Minus,
            '*' => Verb::Star,
            '%' => Verb::Percent,
            '!' => Verb::Bang,
            '&' => Verb::Amp,
            '|' => Verb::Pipe,
            '<' => Verb::Lt,
            '>' => Verb::Gt,
            '=' => Verb::Eq,
            '~' => Verb::Tilde,
            ',' => Verb::Comma,
            '#' => Verb::Hash,
            '@' => Verb::At,
            '?' => Verb::Query,
            '.' => Verb::Dot,
            '^' => Verb::Caret,
            '$' => Verb::Dollar,
            '\'' => Verb::Quote,
            _ => return None,
        })
    }

    /// The reduction-derived form, if the glyph admits one.
    pub const fn over(self) -> Option<Verb> {
        match self {
            Verb::Plus => Some(Verb::SumOver),
            Verb::Pipe => Some(Verb::MaxOver),
            Verb::Amp => Some(Verb::MinOver),
            _ => None,
        }
    }

    /// Whether the verb has a monadic meaning.
    pub const fn monadic(self) -> bool {
        !matches!(self, Verb::At | Verb::Dot)
    }

    /// Whether the verb has a dyadic meaning.
    pub const fn dyadic(self) -> bool {
        !matches!(
            self,
            Verb::Tilde
                | Verb::Query
                | Verb::Caret
                | Verb::Quote
                | Verb::SumOver
                | Verb::MaxOver
                | Verb::MinOver
        )
    }

    /// Short name of the monadic meaning, for the help listing.
    pub const fn monadic_name(self) -> Option<&'static str> {
        Some(match self {
            Verb::Plus => "flip",
            Verb::Minus => "negate",
            Verb::Star => "sqrt",
            Verb::Percent => "reciprocal",
            Verb::Bang => "iota",
            Verb::Amp => "abs",
            Verb::Pipe => "reverse",
            Verb::Lt => "grade up",
            Verb::Gt => "grade down",
            Verb::Eq => "diagonal",
            Verb::Tilde => "not",
            Verb::Comma => "ravel",
            Verb::Hash => "count",
            Verb::Query => "random",
            Verb::Caret => "exp",
            Verb::Dollar => "normalise",
            Verb::Quote => "softmax",
            Verb::SumOver => "sum over",
            Verb::MaxOver => "max over",
            Verb::MinOver => "min over",
            Verb::At | Verb::Dot => return None,
        })
    }

    /// Short name of the dyadic meaning, for the help listing.
    pub const fn dyadic_name(self) -> Option<&'static str> {
        Some(match self {
            Verb::Plus => "add",
            Verb::Minus => "subtract",
            Verb::Star => "multiply",
            Verb::Percent => "divide",
            Verb::Bang => "modulo",
            Verb::Amp => "min",
            Verb::Pipe => "max",
            Verb::Lt => "less",
            Verb::Gt => "greater",
            Verb::Eq => "equal",
            Verb::Comma => "catenate",
            Verb::Hash => "reshape",
            Verb::At => "gather",
            Verb::Dot => "matrix product",
            Verb::Dollar => "cast",
            _ => return None,
        })
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self, Verb::SumOver | Verb::MaxOver | Verb::MinOver) {
            write!(f, "{}/", self.glyph())
        } else {
            write!(f, "{}", self.glyph())
        }
    }
}

impl TryFrom<u8> for Verb {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        use Verb::*;
        Ok(match code {
            0x00 => Plus,
            0x01 => Minus,
            0x02 => Star,
            0x03 => Percent,
            0x04 => Bang,
            0x05 => Amp,
            0x06 => Pipe,
            0x07 => Lt,
            0x08 => Gt,
            0x09 => Eq,
            0x0a => Tilde,
            0x0b => Comma,
            0x0c => Hash,
            0x0d => At,
            0x0e => Query,
            0x0f => Dot,
            0x10 => Caret,
            0x11 => Dollar,
            0x12 => Quote,
            0x13 => SumOver,
            0x14 => MaxOver,
            0x15 => MinOver,
            _ => return Err(code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn codes_round_trip() {
        for verb in Verb::iter() {
            assert_eq!(Ok(verb), Verb::try_from(verb as u8));
        }
        assert!(Verb::try_from(Verb::COUNT as u8).is_err());
        assert_eq!(Verb::iter().count(), Verb::COUNT);
    }

    #[test]
    fn glyphs_resolve_to_base_verbs() {
        for verb in Verb::iter() {
            let base = Verb::from_glyph(verb.glyph()).expect("glyph must map back");
            assert!(base == verb || base.over() == Some(verb));
        }
    }

    #[test]
    fn every_verb_has_a_valence() {
        for verb in Verb::iter() {
            assert!(verb.monadic() || verb.dyadic(), "{verb:?} has no meaning");
            if verb.monadic() {
                assert!(verb.monadic_name().is_some());
            }
            if verb.dyadic() {
                assert!(verb.dyadic_name().is_some());
            }
        }
    }

    #[test]
    fn over_forms() {
        assert_eq!(Verb::Plus.over(), Some(Verb::SumOver));
        assert_eq!(Verb::Pipe.over(), Some(Verb::MaxOver));
        assert_eq!(Verb::Amp.over(), Some(Verb::MinOver));
        assert_eq!(Verb::Star.over(), None);
    }
}
