//! Element-wise dyadic verbs: widen operands to the table tag, pick the
//! kernel for the (atom, array) sides, optionally fan out to workers.

use bytemuck::{cast_slice, cast_slice_mut};
use tacit_asm::{Fault, Verb};
use tacit_types::{Atom, Tag, Value};

use super::{result_tag, Ctx};
use crate::error::FaultResult;
use crate::heap::Heap;
use crate::kernels::arith;
use crate::kernels::convert;

/// Logical element ranges of a value: one per matrix row, or the whole
/// array for rank-1. Padding between rows is never visited.
pub(super) fn logical_ranges(value: Value) -> Vec<core::ops::Range<usize>> {
    if value.is_matrix() {
        let cols = value.cols();
        (0..value.rows())
            .map(|r| {
                let start = r << value.stride_log();
                start..start + cols
            })
            .collect()
    } else {
        vec![0..value.count()]
    }
}

fn same_shape(l: Value, r: Value) -> FaultResult<()> {
    if l.is_matrix() != r.is_matrix() || l.rows() != r.rows() {
        return Err(Fault::Rank);
    }
    if l.count() != r.count() {
        return Err(Fault::Length);
    }
    Ok(())
}

fn f32_op(verb: Verb) -> fn(f32, f32) -> f32 {
    match verb {
        Verb::Plus => |a, b| a + b,
        Verb::Minus => |a, b| a - b,
        Verb::Star => |a, b| a * b,
        Verb::Percent => |a, b| a / b,
        Verb::Bang => arith::float_mod,
        Verb::Amp => f32::min,
        Verb::Pipe => f32::max,
        Verb::Lt => |a, b| (a < b) as i32 as f32,
        Verb::Gt => |a, b| (a > b) as i32 as f32,
        Verb::Eq => |a, b| (a == b) as i32 as f32,
        _ => unreachable!("not an element-wise verb"),
    }
}

/// Int kernels; `None` marks the divisor-checked verbs.
fn i32_op(verb: Verb) -> Option<fn(i32, i32) -> i32> {
    Some(match verb {
        Verb::Plus => i32::wrapping_add,
        Verb::Minus => i32::wrapping_sub,
        Verb::Star => i32::wrapping_mul,
        Verb::Amp => i32::min,
        Verb::Pipe => i32::max,
        Verb::Lt => |a, b| (a < b) as i32,
        Verb::Gt => |a, b| (a > b) as i32,
        Verb::Eq => |a, b| (a == b) as i32,
        Verb::Percent | Verb::Bang => return None,
        _ => unreachable!("not an element-wise verb"),
    })
}

fn u8_op(verb: Verb) -> Option<fn(u8, u8) -> u8> {
    Some(match verb {
        Verb::Plus => u8::wrapping_add,
        Verb::Minus => u8::wrapping_sub,
        Verb::Star => u8::wrapping_mul,
        Verb::Amp => u8::min,
        Verb::Pipe => u8::max,
        Verb::Lt => |a, b| (a < b) as u8,
        Verb::Gt => |a, b| (a > b) as u8,
        Verb::Eq => |a, b| (a == b) as u8,
        Verb::Percent | Verb::Bang => return None,
        _ => unreachable!("not an element-wise verb"),
    })
}

impl Ctx<'_> {
    pub(super) fn elementwise(&mut self, verb: Verb, l: Value, r: Value) -> FaultResult<Value> {
        if matches!(l.tag(), Tag::Sym) || matches!(r.tag(), Tag::Sym) {
            if verb == Verb::Eq && l.tag() == Tag::Sym && r.tag() == Tag::Sym {
                return self.sym_eq(l, r);
            }
            return Err(Fault::Type);
        }
        let rtag = result_tag(verb, l.tag(), r.tag()).ok_or(Fault::Type)?;
        if l.is_boxed() && r.is_boxed() {
            same_shape(l, r)?;
        }
        let lc = self.convert_new(l, rtag)?;
        let rc = match self.convert_new(r, rtag) {
            Ok(value) => value,
            Err(fault) => {
                self.heap.release(lc);
                return Err(fault);
            }
        };
        let result = self.elementwise_typed(verb, lc, rc, rtag);
        self.heap.release(lc);
        self.heap.release(rc);
        result
    }

    fn elementwise_typed(
        &mut self,
        verb: Verb,
        l: Value,
        r: Value,
        rtag: Tag,
    ) -> FaultResult<Value> {
        if l.is_atom() && r.is_atom() {
            return scalar_op(verb, rtag, l, r);
        }
        let like = if l.is_boxed() { l } else { r };
        let out = self.alloc_like(rtag, like)?;
        let result = match rtag {
            Tag::Float => self.run_f32(verb, out, l, r),
            Tag::Int => self.run_i32(verb, out, l, r),
            Tag::Byte => self.run_u8(verb, out, l, r),
            Tag::Bit => self.run_bits(verb, out, l, r),
            Tag::Sym | Tag::Mixed => Err(Fault::Type),
        };
        if result.is_err() {
            self.heap.release(out);
        }
        result.map(|()| out)
    }

    fn run_f32(&mut self, verb: Verb, out: Value, l: Value, r: Value) -> FaultResult<()> {
        let op = f32_op(verb);
        let cap = Heap::cap(out);
        match (l.atom(), r.atom()) {
            (None, None) => {
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let o = &mut cast_slice_mut::<u64, f32>(ow)[..cap];
                let a = &cast_slice::<u64, f32>(aw)[..cap];
                let b = &cast_slice::<u64, f32>(bw)[..cap];
                self.workers.run(o, 1, |off, chunk| {
                    arith::zip(chunk, &a[off..off + chunk.len()], &b[off..off + chunk.len()], op)
                });
            }
            (Some(Atom::Float(x)), None) => {
                let (ow, bw) = self.heap.bufs2(out, r);
                let o = &mut cast_slice_mut::<u64, f32>(ow)[..cap];
                let b = &cast_slice::<u64, f32>(bw)[..cap];
                self.workers.run(o, 1, |off, chunk| {
                    arith::zip_left(chunk, x, &b[off..off + chunk.len()], op)
                });
            }
            (None, Some(Atom::Float(y))) => {
                let (ow, aw) = self.heap.bufs2(out, l);
                let o = &mut cast_slice_mut::<u64, f32>(ow)[..cap];
                let a = &cast_slice::<u64, f32>(aw)[..cap];
                self.workers.run(o, 1, |off, chunk| {
                    arith::zip_right(chunk, &a[off..off + chunk.len()], y, op)
                });
            }
            _ => unreachable!("atom-atom pairs take the scalar path"),
        }
        Ok(())
    }

    fn run_i32(&mut self, verb: Verb, out: Value, l: Value, r: Value) -> FaultResult<()> {
        let cap = Heap::cap(out);
        if let Some(op) = i32_op(verb) {
            match (l.atom(), r.atom()) {
                (None, None) => {
                    let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                    let o = &mut cast_slice_mut::<u64, i32>(ow)[..cap];
                    let a = &cast_slice::<u64, i32>(aw)[..cap];
                    let b = &cast_slice::<u64, i32>(bw)[..cap];
                    self.workers.run(o, 1, |off, chunk| {
                        arith::zip(chunk, &a[off..off + chunk.len()], &b[off..off + chunk.len()], op)
                    });
                }
                (Some(Atom::Int(x)), None) => {
                    let (ow, bw) = self.heap.bufs2(out, r);
                    let o = &mut cast_slice_mut::<u64, i32>(ow)[..cap];
                    let b = &cast_slice::<u64, i32>(bw)[..cap];
                    self.workers.run(o, 1, |off, chunk| {
                        arith::zip_left(chunk, x, &b[off..off + chunk.len()], op)
                    });
                }
                (None, Some(Atom::Int(y))) => {
                    let (ow, aw) = self.heap.bufs2(out, l);
                    let o = &mut cast_slice_mut::<u64, i32>(ow)[..cap];
                    let a = &cast_slice::<u64, i32>(aw)[..cap];
                    self.workers.run(o, 1, |off, chunk| {
                        arith::zip_right(chunk, &a[off..off + chunk.len()], y, op)
                    });
                }
                _ => unreachable!("atom-atom pairs take the scalar path"),
            }
            return Ok(());
        }

        // Floor division and modulo, divisor-checked.
        let want_mod = verb == Verb::Bang;
        if let Some(Atom::Int(z)) = r.atom() {
            // Scalar divisor: one reciprocal for the whole kernel, so the
            // split across workers stays divide-free.
            if z <= 0 {
                return Err(Fault::Domain);
            }
            let recip = arith::recip_u16(z);
            let (ow, aw) = self.heap.bufs2(out, l);
            let o = &mut cast_slice_mut::<u64, i32>(ow)[..cap];
            let a = &cast_slice::<u64, i32>(aw)[..cap];
            self.workers.run(o, 1, |off, chunk| {
                arith::zip_right(chunk, &a[off..off + chunk.len()], z, |y, z| {
                    let (quot, rem) = arith::floor_divmod(y, z, recip);
                    if want_mod {
                        rem
                    } else {
                        quot
                    }
                })
            });
            return Ok(());
        }

        // Array divisor: per-element checks over the logical rows only.
        let ranges = logical_ranges(out);
        match l.atom() {
            None => {
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let o = cast_slice_mut::<u64, i32>(ow);
                let a = cast_slice::<u64, i32>(aw);
                let b = cast_slice::<u64, i32>(bw);
                for range in ranges {
                    arith::try_zip(&mut o[range.clone()], &a[range.clone()], &b[range], |y, z| {
                        if want_mod {
                            arith::int_mod(y, z)
                        } else {
                            arith::int_div(y, z)
                        }
                    })?;
                }
            }
            Some(Atom::Int(x)) => {
                let (ow, bw) = self.heap.bufs2(out, r);
                let o = cast_slice_mut::<u64, i32>(ow);
                let b = cast_slice::<u64, i32>(bw);
                for range in ranges {
                    for i in range {
                        o[i] = if want_mod {
                            arith::int_mod(x, b[i])?
                        } else {
                            arith::int_div(x, b[i])?
                        };
                    }
                }
            }
            _ => unreachable!("operands were converted to ints"),
        }
        Ok(())
    }

    fn run_u8(&mut self, verb: Verb, out: Value, l: Value, r: Value) -> FaultResult<()> {
        let cap = Heap::cap(out);
        if let Some(op) = u8_op(verb) {
            match (l.atom(), r.atom()) {
                (None, None) => {
                    let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                    let o = &mut cast_slice_mut::<u64, u8>(ow)[..cap];
                    let a = &cast_slice::<u64, u8>(aw)[..cap];
                    let b = &cast_slice::<u64, u8>(bw)[..cap];
                    self.workers.run(o, 1, |off, chunk| {
                        arith::zip(chunk, &a[off..off + chunk.len()], &b[off..off + chunk.len()], op)
                    });
                }
                (Some(Atom::Byte(x)), None) => {
                    let (ow, bw) = self.heap.bufs2(out, r);
                    let o = &mut cast_slice_mut::<u64, u8>(ow)[..cap];
                    let b = &cast_slice::<u64, u8>(bw)[..cap];
                    self.workers.run(o, 1, |off, chunk| {
                        arith::zip_left(chunk, x, &b[off..off + chunk.len()], op)
                    });
                }
                (None, Some(Atom::Byte(y))) => {
                    let (ow, aw) = self.heap.bufs2(out, l);
                    let o = &mut cast_slice_mut::<u64, u8>(ow)[..cap];
                    let a = &cast_slice::<u64, u8>(aw)[..cap];
                    self.workers.run(o, 1, |off, chunk| {
                        arith::zip_right(chunk, &a[off..off + chunk.len()], y, op)
                    });
                }
                _ => unreachable!("atom-atom pairs take the scalar path"),
            }
            return Ok(());
        }

        let want_mod = verb == Verb::Bang;
        let ranges = logical_ranges(out);
        let byte_op = |y: u8, z: u8| -> FaultResult<u8> {
            if z == 0 {
                return Err(Fault::Domain);
            }
            Ok(if want_mod { y % z } else { y / z })
        };
        match (l.atom(), r.atom()) {
            (None, None) => {
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let o = cast_slice_mut::<u64, u8>(ow);
                let a = cast_slice::<u64, u8>(aw);
                let b = cast_slice::<u64, u8>(bw);
                for range in ranges {
                    arith::try_zip(&mut o[range.clone()], &a[range.clone()], &b[range], byte_op)?;
                }
            }
            (Some(Atom::Byte(x)), None) => {
                let (ow, bw) = self.heap.bufs2(out, r);
                let o = cast_slice_mut::<u64, u8>(ow);
                let b = cast_slice::<u64, u8>(bw);
                for range in ranges {
                    for i in range {
                        o[i] = byte_op(x, b[i])?;
                    }
                }
            }
            (None, Some(Atom::Byte(y))) => {
                if y == 0 {
                    return Err(Fault::Domain);
                }
                let (ow, aw) = self.heap.bufs2(out, l);
                let o = &mut cast_slice_mut::<u64, u8>(ow)[..cap];
                let a = &cast_slice::<u64, u8>(aw)[..cap];
                arith::zip_right(o, a, y, |x, z| if want_mod { x % z } else { x / z });
            }
            _ => unreachable!("atom-atom pairs take the scalar path"),
        }
        Ok(())
    }

    /// Bit results run word-parallel; every row's padding is masked back
    /// to zero so bit counts stay exact.
    fn run_bits(&mut self, verb: Verb, out: Value, l: Value, r: Value) -> FaultResult<()> {
        let word_op: fn(u64, u64) -> u64 = match verb {
            Verb::Amp => |a, b| a & b,
            Verb::Pipe => |a, b| a | b,
            Verb::Lt => |a, b| !a & b,
            Verb::Gt => |a, b| a & !b,
            Verb::Eq => |a, b| !(a ^ b),
            _ => unreachable!("bit results only come from min/max/compare"),
        };
        let rows = word_rows(out);
        match (l.atom(), r.atom()) {
            (None, None) => {
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                for (range, count) in rows {
                    arith::zip(&mut ow[range.clone()], &aw[range.clone()], &bw[range.clone()], word_op);
                    arith::mask_tail(&mut ow[range], count);
                }
            }
            (Some(Atom::Bit(x)), None) => {
                let broadcast = if x { u64::MAX } else { 0 };
                let (ow, bw) = self.heap.bufs2(out, r);
                for (range, count) in rows {
                    arith::zip_left(&mut ow[range.clone()], broadcast, &bw[range.clone()], word_op);
                    arith::mask_tail(&mut ow[range], count);
                }
            }
            (None, Some(Atom::Bit(y))) => {
                let broadcast = if y { u64::MAX } else { 0 };
                let (ow, aw) = self.heap.bufs2(out, l);
                for (range, count) in rows {
                    arith::zip_right(&mut ow[range.clone()], &aw[range.clone()], broadcast, word_op);
                    arith::mask_tail(&mut ow[range], count);
                }
            }
            _ => unreachable!("atom-atom pairs take the scalar path"),
        }
        Ok(())
    }

    /// `=` over symbols: compare words, emit bits.
    fn sym_eq(&mut self, l: Value, r: Value) -> FaultResult<Value> {
        if l.is_atom() && r.is_atom() {
            return Ok(Value::bit(l.as_sym() == r.as_sym()));
        }
        if l.is_boxed() && r.is_boxed() {
            same_shape(l, r)?;
        }
        let like = if l.is_boxed() { l } else { r };
        if like.is_matrix() {
            // Symbol matrices cannot be compared row-wise into the packed
            // bit layout without a per-row repack; not worth a kernel.
            return Err(Fault::NotYetImplemented);
        }
        let out = self.heap.alloc(Tag::Bit, like.count())?;
        match (l.atom(), r.atom()) {
            (None, None) => {
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let a = cast_slice::<u64, u32>(aw);
                let b = cast_slice::<u64, u32>(bw);
                for i in 0..like.count() {
                    if a[i] == b[i] {
                        ow[i >> 6] |= 1u64 << (i & 63);
                    }
                }
            }
            (Some(atom), None) | (None, Some(atom)) => {
                let Atom::Sym(sym) = atom else {
                    return Err(Fault::Type);
                };
                let array = if l.is_boxed() { l } else { r };
                let (ow, aw) = self.heap.bufs2(out, array);
                let a = cast_slice::<u64, u32>(aw);
                for i in 0..like.count() {
                    if a[i] == sym.bits() {
                        ow[i >> 6] |= 1u64 << (i & 63);
                    }
                }
            }
            _ => unreachable!("atom-atom pairs were handled above"),
        }
        Ok(out)
    }

    /// Array conversion: same shape, new tag.
    pub(super) fn convert_array(&mut self, value: Value, to: Tag) -> FaultResult<Value> {
        let from = value.tag();
        if from.numeric_rank().is_none() || to.numeric_rank().is_none() {
            return Err(Fault::Type);
        }
        let out = self.alloc_like(to, value)?;
        let src_ranges = logical_ranges(value);
        let dst_ranges = logical_ranges(out);
        let (ow, aw) = self.heap.bufs2(out, value);
        for (dst, src) in dst_ranges.into_iter().zip(src_ranges) {
            convert_span(from, to, ow, aw, dst, src);
        }
        Ok(out)
    }
}

/// Word ranges and bit counts of each logical row of a bit array.
pub(super) fn word_rows(value: Value) -> Vec<(core::ops::Range<usize>, usize)> {
    if value.is_matrix() {
        let cols = value.cols();
        let row_words = 1usize << (value.stride_log() - 6);
        (0..value.rows())
            .map(|r| {
                let start = r * row_words;
                (start..start + cols.div_ceil(64), cols)
            })
            .collect()
    } else {
        let count = value.count();
        vec![(0..count.div_ceil(64), count)]
    }
}

/// Copy one logical row between differently-tagged buffers. Bit rows are
/// word-aligned by the stride rules, so bit spans start on word bounds.
fn convert_span(
    from: Tag,
    to: Tag,
    dst_words: &mut [u64],
    src_words: &[u64],
    dst: core::ops::Range<usize>,
    src: core::ops::Range<usize>,
) {
    debug_assert_eq!(dst.len(), src.len());
    let len = src.len();
    match (from, to) {
        (Tag::Bit, _) => {
            debug_assert_eq!(src.start % 64, 0);
            let bits = &src_words[src.start >> 6..];
            match to {
                Tag::Byte => {
                    let d = cast_slice_mut::<u64, u8>(dst_words);
                    convert::unpack_bits(&mut d[dst], bits, 1u8, 0u8);
                }
                Tag::Int => {
                    let d = cast_slice_mut::<u64, i32>(dst_words);
                    convert::unpack_bits(&mut d[dst], bits, 1i32, 0i32);
                }
                Tag::Float => {
                    let d = cast_slice_mut::<u64, f32>(dst_words);
                    convert::unpack_bits(&mut d[dst], bits, 1.0f32, 0.0f32);
                }
                _ => unreachable!("bit-to-bit is a retain"),
            }
        }
        (_, Tag::Bit) => {
            debug_assert_eq!(dst.start % 64, 0);
            let words = &mut dst_words[dst.start >> 6..(dst.start >> 6) + len.div_ceil(64)];
            match from {
                Tag::Byte => {
                    let s = cast_slice::<u64, u8>(src_words);
                    convert::pack_bits(words, &s[src], |x| x != 0);
                }
                Tag::Int => {
                    let s = cast_slice::<u64, i32>(src_words);
                    convert::pack_bits(words, &s[src], |x| x != 0);
                }
                Tag::Float => {
                    let s = cast_slice::<u64, f32>(src_words);
                    convert::pack_bits(words, &s[src], |x| x != 0.0);
                }
                _ => unreachable!("bit-to-bit is a retain"),
            }
        }
        (Tag::Byte, Tag::Int) => {
            let s = cast_slice::<u64, u8>(src_words);
            let d = cast_slice_mut::<u64, i32>(dst_words);
            arith::map(&mut d[dst], &s[src], convert::byte_to_int);
        }
        (Tag::Byte, Tag::Float) => {
            let s = cast_slice::<u64, u8>(src_words);
            let d = cast_slice_mut::<u64, f32>(dst_words);
            arith::map(&mut d[dst], &s[src], convert::byte_to_float);
        }
        (Tag::Int, Tag::Byte) => {
            let s = cast_slice::<u64, i32>(src_words);
            let d = cast_slice_mut::<u64, u8>(dst_words);
            arith::map(&mut d[dst], &s[src], convert::int_to_byte);
        }
        (Tag::Int, Tag::Float) => {
            let s = cast_slice::<u64, i32>(src_words);
            let d = cast_slice_mut::<u64, f32>(dst_words);
            arith::map(&mut d[dst], &s[src], convert::int_to_float);
        }
        (Tag::Float, Tag::Byte) => {
            let s = cast_slice::<u64, f32>(src_words);
            let d = cast_slice_mut::<u64, u8>(dst_words);
            arith::map(&mut d[dst], &s[src], convert::float_to_byte);
        }
        (Tag::Float, Tag::Int) => {
            let s = cast_slice::<u64, f32>(src_words);
            let d = cast_slice_mut::<u64, i32>(dst_words);
            arith::map(&mut d[dst], &s[src], convert::float_to_int);
        }
        _ => unreachable!("convert_array screens non-numeric tags"),
    }
}

/// Atom-atom fast path: no allocation.
fn scalar_op(verb: Verb, rtag: Tag, l: Value, r: Value) -> FaultResult<Value> {
    Ok(match rtag {
        Tag::Float => Value::float(f32_op(verb)(l.as_float(), r.as_float())),
        Tag::Int => match i32_op(verb) {
            Some(op) => Value::int(op(l.as_int(), r.as_int())),
            None if verb == Verb::Bang => Value::int(arith::int_mod(l.as_int(), r.as_int())?),
            None => Value::int(arith::int_div(l.as_int(), r.as_int())?),
        },
        Tag::Byte => match u8_op(verb) {
            Some(op) => Value::byte(op(l.as_byte(), r.as_byte())),
            None => {
                let (y, z) = (l.as_byte(), r.as_byte());
                if z == 0 {
                    return Err(Fault::Domain);
                }
                Value::byte(if verb == Verb::Bang { y % z } else { y / z })
            }
        },
        Tag::Bit => {
            let (a, b) = (l.as_bit(), r.as_bit());
            let bit = match verb {
                Verb::Amp => a & b,
                Verb::Pipe => a | b,
                Verb::Lt => !a & b,
                Verb::Gt => a & !b,
                Verb::Eq => a == b,
                _ => unreachable!("bit results only come from min/max/compare"),
            };
            Value::bit(bit)
        }
        Tag::Sym | Tag::Mixed => return Err(Fault::Type),
    })
}
