//! Verb dispatch: resolve (verb, operand types, shapes) to a kernel.
//!
//! Dispatch owns the result-tag table and the convert-then-kernel rule:
//! operands are widened to the table's result tag, then a single-type
//! kernel runs. Operands are borrowed; every returned value is a fresh
//! reference the caller owns.

use tacit_asm::{Fault, Verb};
use tacit_types::{Atom, Sym, Tag, Value};

use crate::error::FaultResult;
use crate::heap::Heap;
use crate::kernels::rand::XorShift;
use crate::workers::Workers;

mod elementwise;
mod numeric;
mod shape;

/// Mutable context threaded through every dispatch entry point.
pub(crate) struct Ctx<'vm> {
    pub(crate) heap: &'vm mut Heap,
    pub(crate) workers: &'vm Workers,
    pub(crate) rng: &'vm mut XorShift,
}

/// Tags that participate in the result-tag table.
const TABLE_TAGS: [Tag; 6] = [Tag::Bit, Tag::Byte, Tag::Int, Tag::Sym, Tag::Float, Tag::Mixed];

/// Dyadic element-wise verbs are the opcodes below this bound.
const ELEMENTWISE_VERBS: usize = 10;

const fn elementwise_result(code: usize, l: Tag, r: Tag) -> Option<Tag> {
    // Symbol equality compares words and yields bits.
    if code == Verb::Eq as usize && matches!((l, r), (Tag::Sym, Tag::Sym)) {
        return Some(Tag::Bit);
    }
    let promoted = match l.promote(r) {
        Some(tag) => tag,
        None => return None,
    };
    // Arithmetic widens bits to ints; comparisons and min/max keep them.
    let arith = code <= Verb::Bang as usize;
    if arith && matches!(promoted, Tag::Bit) {
        return Some(Tag::Int);
    }
    Some(promoted)
}

/// (verb, left tag, right tag) → result tag, per spec: computed once.
static RESULT_TAGS: [[[Option<Tag>; 16]; 16]; ELEMENTWISE_VERBS] = {
    let mut table = [[[None; 16]; 16]; ELEMENTWISE_VERBS];
    let mut code = 0;
    while code < ELEMENTWISE_VERBS {
        let mut i = 0;
        while i < TABLE_TAGS.len() {
            let mut j = 0;
            while j < TABLE_TAGS.len() {
                let (l, r) = (TABLE_TAGS[i], TABLE_TAGS[j]);
                table[code][l as usize][r as usize] = elementwise_result(code, l, r);
                j += 1;
            }
            i += 1;
        }
        code += 1;
    }
    table
};

pub(crate) fn result_tag(verb: Verb, l: Tag, r: Tag) -> Option<Tag> {
    RESULT_TAGS[verb as usize][l as usize][r as usize]
}

impl Ctx<'_> {
    /// Dispatch a dyadic verb application.
    pub(crate) fn dyad(&mut self, verb: Verb, l: Value, r: Value) -> FaultResult<Value> {
        tracing::trace!(?verb, ?l, ?r, "dyad");
        match verb {
            Verb::Plus
            | Verb::Minus
            | Verb::Star
            | Verb::Percent
            | Verb::Bang
            | Verb::Amp
            | Verb::Pipe
            | Verb::Lt
            | Verb::Gt
            | Verb::Eq => self.elementwise(verb, l, r),
            Verb::Comma => self.catenate(l, r),
            Verb::Hash => self.reshape(l, r),
            Verb::At => self.gather(l, r),
            Verb::Dot => self.matrix_product(l, r),
            Verb::Dollar => self.cast(l, r),
            _ => Err(Fault::NotYetImplemented),
        }
    }

    /// Dispatch a monadic verb application.
    pub(crate) fn monad(&mut self, verb: Verb, r: Value) -> FaultResult<Value> {
        tracing::trace!(?verb, ?r, "monad");
        match verb {
            Verb::Plus => self.flip(r),
            Verb::Minus => self.negate(r),
            Verb::Star => self.sqrt(r),
            Verb::Percent => self.reciprocal(r),
            Verb::Bang => self.iota(r),
            Verb::Amp => self.abs(r),
            Verb::Pipe => self.reverse(r),
            Verb::Lt => self.grade(r, false),
            Verb::Gt => self.grade(r, true),
            Verb::Eq => self.diagonal(r),
            Verb::Tilde => self.not(r),
            Verb::Comma => self.ravel(r),
            Verb::Hash => Ok(Value::int(r.count() as i32)),
            Verb::Query => self.random(r),
            Verb::Caret => self.exp(r),
            Verb::Dollar => self.normalise(r),
            Verb::Quote => self.softmax(r),
            Verb::SumOver => self.reduce_sum(r),
            Verb::MaxOver => self.reduce_extreme(r, true),
            Verb::MinOver => self.reduce_extreme(r, false),
            Verb::At | Verb::Dot => Err(Fault::NotYetImplemented),
        }
    }

    /// `` `f$x `` style cast: the left symbol names the target tag.
    fn cast(&mut self, l: Value, r: Value) -> FaultResult<Value> {
        if l.is_boxed() || !matches!(l.tag(), Tag::Sym) {
            return Err(Fault::Type);
        }
        let target = match l.as_sym() {
            s if s == Sym::new("b") => Tag::Bit,
            s if s == Sym::new("c") => Tag::Byte,
            s if s == Sym::new("i") => Tag::Int,
            s if s == Sym::new("f") => Tag::Float,
            _ => return Err(Fault::Domain),
        };
        self.convert_new(r, target)
    }

    /// A fresh reference to `value` as `to`-tagged data: a retained alias
    /// when the tag already matches, otherwise a converted copy.
    pub(crate) fn convert_new(&mut self, value: Value, to: Tag) -> FaultResult<Value> {
        if value.tag() == to {
            return self.heap.retain(value);
        }
        if value.is_atom() {
            let atom = value.atom().expect("non-boxed value unpacks");
            return convert_atom(atom, to);
        }
        self.convert_array(value, to)
    }

    /// Result shape copied from `like`, freshly allocated and zeroed.
    pub(crate) fn alloc_like(&mut self, tag: Tag, like: Value) -> FaultResult<Value> {
        if like.is_matrix() {
            let rows = like.rows();
            let stride_log = shape::stride_log_for(tag, like.cols());
            let out = self
                .heap
                .alloc_cap(tag, like.count(), rows << stride_log)?;
            Ok(out.with_shape(rows, stride_log))
        } else {
            self.heap.alloc(tag, like.count())
        }
    }
}

/// Scalar conversion between numeric atoms.
fn convert_atom(atom: Atom, to: Tag) -> FaultResult<Value> {
    use crate::kernels::convert as k;
    let value = match (atom, to) {
        (Atom::Bit(b), Tag::Byte) => Value::byte(b as u8),
        (Atom::Bit(b), Tag::Int) => Value::int(b as i32),
        (Atom::Bit(b), Tag::Float) => Value::float(b as i32 as f32),
        (Atom::Byte(b), Tag::Bit) => Value::bit(b != 0),
        (Atom::Byte(b), Tag::Int) => Value::int(k::byte_to_int(b)),
        (Atom::Byte(b), Tag::Float) => Value::float(k::byte_to_float(b)),
        (Atom::Int(i), Tag::Bit) => Value::bit(i != 0),
        (Atom::Int(i), Tag::Byte) => Value::byte(k::int_to_byte(i)),
        (Atom::Int(i), Tag::Float) => Value::float(k::int_to_float(i)),
        (Atom::Float(f), Tag::Bit) => Value::bit(f != 0.0),
        (Atom::Float(f), Tag::Byte) => Value::byte(k::float_to_byte(f)),
        (Atom::Float(f), Tag::Int) => Value::int(k::float_to_int(f)),
        _ => return Err(Fault::Type),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_table_widens() {
        assert_eq!(result_tag(Verb::Plus, Tag::Int, Tag::Float), Some(Tag::Float));
        assert_eq!(result_tag(Verb::Plus, Tag::Byte, Tag::Byte), Some(Tag::Byte));
        assert_eq!(result_tag(Verb::Plus, Tag::Bit, Tag::Bit), Some(Tag::Int));
        assert_eq!(result_tag(Verb::Amp, Tag::Bit, Tag::Bit), Some(Tag::Bit));
        assert_eq!(result_tag(Verb::Lt, Tag::Int, Tag::Int), Some(Tag::Int));
        assert_eq!(result_tag(Verb::Eq, Tag::Sym, Tag::Sym), Some(Tag::Bit));
        assert_eq!(result_tag(Verb::Plus, Tag::Sym, Tag::Int), None);
        assert_eq!(result_tag(Verb::Plus, Tag::Mixed, Tag::Int), None);
    }

    #[test]
    fn atom_conversions_are_exact() {
        assert_eq!(convert_atom(Atom::Int(3), Tag::Float), Ok(Value::float(3.0)));
        assert_eq!(convert_atom(Atom::Float(-2.9), Tag::Int), Ok(Value::int(-2)));
        assert_eq!(convert_atom(Atom::Bit(true), Tag::Int), Ok(Value::int(1)));
        assert_eq!(convert_atom(Atom::Sym(Sym::new("x")), Tag::Int), Err(Fault::Type));
    }
}
