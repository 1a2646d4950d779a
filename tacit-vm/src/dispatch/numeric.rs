//! Numeric verbs: unary math, reductions, normalisation, the matrix
//! product family, and the PRNG surface.

use bytemuck::{cast_slice, cast_slice_mut};
use tacit_asm::Fault;
use tacit_types::{Atom, Tag, Value};

use super::elementwise::logical_ranges;
use super::Ctx;
use crate::error::FaultResult;
use crate::heap::Heap;
use crate::kernels::{arith, convert, matmul, norm, reduce};

impl Ctx<'_> {
    /// Monadic `-`.
    pub(super) fn negate(&mut self, r: Value) -> FaultResult<Value> {
        match r.tag() {
            Tag::Float => self.unary_f32(r, |x| -x),
            Tag::Bit | Tag::Byte | Tag::Int => self.unary_i32(r, i32::wrapping_neg),
            Tag::Sym | Tag::Mixed => Err(Fault::Type),
        }
    }

    /// Monadic `&`: absolute value. Bits and bytes are their own magnitude.
    pub(super) fn abs(&mut self, r: Value) -> FaultResult<Value> {
        match r.tag() {
            Tag::Float => self.unary_f32(r, f32::abs),
            Tag::Int => self.unary_i32(r, i32::wrapping_abs),
            Tag::Bit | Tag::Byte => self.heap.retain(r),
            Tag::Sym | Tag::Mixed => Err(Fault::Type),
        }
    }

    /// Monadic `%`: reciprocal in float.
    pub(super) fn reciprocal(&mut self, r: Value) -> FaultResult<Value> {
        self.unary_f32(r, |x| 1.0 / x)
    }

    /// Monadic `^`.
    pub(super) fn exp(&mut self, r: Value) -> FaultResult<Value> {
        self.unary_f32(r, arith::exp_f32)
    }

    /// Monadic `*`: square root, `Domain` on any negative element.
    pub(super) fn sqrt(&mut self, r: Value) -> FaultResult<Value> {
        let rc = self.convert_new(r, Tag::Float)?;
        let result = self.sqrt_converted(rc);
        self.heap.release(rc);
        result
    }

    fn sqrt_converted(&mut self, rc: Value) -> FaultResult<Value> {
        if let Some(Atom::Float(x)) = rc.atom() {
            return arith::sqrt_f32(x).map(Value::float);
        }
        let out = self.alloc_like(Tag::Float, rc)?;
        let filled = (|| -> FaultResult<()> {
            let ranges = logical_ranges(out);
            let (ow, aw) = self.heap.bufs2(out, rc);
            let o = cast_slice_mut::<u64, f32>(ow);
            let a = cast_slice::<u64, f32>(aw);
            for range in ranges {
                for i in range {
                    o[i] = arith::sqrt_f32(a[i])?;
                }
            }
            Ok(())
        })();
        if let Err(fault) = filled {
            self.heap.release(out);
            return Err(fault);
        }
        Ok(out)
    }

    /// Monadic `~`: 1 where the element is zero.
    pub(super) fn not(&mut self, r: Value) -> FaultResult<Value> {
        if let Some(atom) = r.atom() {
            let bit = match atom {
                Atom::Bit(b) => !b,
                Atom::Byte(b) => b == 0,
                Atom::Int(i) => i == 0,
                Atom::Float(f) => f == 0.0,
                Atom::Sym(_) => return Err(Fault::Type),
            };
            return Ok(Value::bit(bit));
        }
        match r.tag() {
            Tag::Bit => {
                let out = self.alloc_like(Tag::Bit, r)?;
                let rows = super::elementwise::word_rows(out);
                let (ow, aw) = self.heap.bufs2(out, r);
                for (range, count) in rows {
                    arith::bit_not(&mut ow[range.clone()], &aw[range], count);
                }
                Ok(out)
            }
            Tag::Byte | Tag::Int | Tag::Float => {
                let out = self.alloc_like(Tag::Bit, r)?;
                let tag = r.tag();
                let dst_rows = logical_ranges(out);
                let src_rows = logical_ranges(r);
                let (ow, aw) = self.heap.bufs2(out, r);
                for (dst, src) in dst_rows.into_iter().zip(src_rows) {
                    let words = &mut ow[dst.start >> 6..(dst.start >> 6) + dst.len().div_ceil(64)];
                    match tag {
                        Tag::Byte => {
                            let s = cast_slice::<u64, u8>(aw);
                            convert::pack_bits(words, &s[src], |x| x == 0);
                        }
                        Tag::Int => {
                            let s = cast_slice::<u64, i32>(aw);
                            convert::pack_bits(words, &s[src], |x| x == 0);
                        }
                        Tag::Float => {
                            let s = cast_slice::<u64, f32>(aw);
                            convert::pack_bits(words, &s[src], |x| x == 0.0);
                        }
                        _ => unreachable!("matched above"),
                    }
                }
                Ok(out)
            }
            Tag::Sym | Tag::Mixed => Err(Fault::Type),
        }
    }

    /// Monadic `?`: deterministic uniform floats.
    pub(super) fn random(&mut self, r: Value) -> FaultResult<Value> {
        let atom = r.atom().ok_or(Fault::Rank)?;
        let n = match atom {
            Atom::Int(i) => i64::from(i),
            Atom::Byte(b) => i64::from(b),
            Atom::Bit(b) => i64::from(b),
            _ => return Err(Fault::Type),
        };
        let n = usize::try_from(n).map_err(|_| Fault::Domain)?;
        let out = self.heap.alloc(Tag::Float, n)?;
        // Drawing is sequential state evolution, so it never splits.
        let rng = &mut *self.rng;
        rng.fill(self.heap.f32s_mut(out));
        Ok(out)
    }

    /// Monadic `$`: reciprocal-RMS scaling, per row on matrices.
    pub(super) fn normalise(&mut self, r: Value) -> FaultResult<Value> {
        self.rowwise(r, norm::rms_norm)
    }

    /// Monadic `'`: softmax, per row on matrices.
    pub(super) fn softmax(&mut self, r: Value) -> FaultResult<Value> {
        self.rowwise(r, norm::softmax)
    }

    fn rowwise(
        &mut self,
        r: Value,
        kernel: fn(&mut [f32], &[f32]),
    ) -> FaultResult<Value> {
        let rc = self.convert_new(r, Tag::Float)?;
        let result = (|| {
            if let Some(Atom::Float(x)) = rc.atom() {
                let mut out = [0.0f32];
                kernel(&mut out, &[x]);
                return Ok(Value::float(out[0]));
            }
            let out = self.alloc_like(Tag::Float, rc)?;
            let cap = Heap::cap(out);
            let (cols, stride) = if out.is_matrix() {
                (out.cols(), 1usize << out.stride_log())
            } else {
                (out.count(), out.count().max(1))
            };
            let (ow, aw) = self.heap.bufs2(out, rc);
            let o = &mut cast_slice_mut::<u64, f32>(ow)[..cap];
            let a = &cast_slice::<u64, f32>(aw)[..cap];
            // Row-parallel only: each row is a serial reduction chain.
            self.workers.run(o, stride, |off, chunk| {
                for (row_chunk, row_off) in chunk.chunks_mut(stride).zip((off..).step_by(stride)) {
                    kernel(&mut row_chunk[..cols], &a[row_off..row_off + cols]);
                }
            });
            Ok(out)
        })();
        self.heap.release(rc);
        result
    }

    /// `+/`: sum, widening bits and bytes to int.
    pub(super) fn reduce_sum(&mut self, r: Value) -> FaultResult<Value> {
        if let Some(atom) = r.atom() {
            return match atom {
                Atom::Bit(b) => Ok(Value::int(i32::from(b))),
                Atom::Byte(b) => Ok(Value::int(i32::from(b))),
                Atom::Int(_) | Atom::Float(_) => self.heap.retain(r),
                Atom::Sym(_) => Err(Fault::Type),
            };
        }
        if r.is_matrix() {
            let flat = self.ravel(r)?;
            let result = self.reduce_sum(flat);
            self.heap.release(flat);
            return result;
        }
        let count = r.count();
        match r.tag() {
            Tag::Bit => Ok(Value::int(reduce::sum_bits(self.heap.words(r)))),
            Tag::Byte => Ok(Value::int(reduce::sum_u8(&self.heap.u8s(r)[..count]))),
            Tag::Int => Ok(Value::int(reduce::sum_i32(&self.heap.i32s(r)[..count]))),
            Tag::Float => Ok(Value::float(reduce::sum_f32(&self.heap.f32s(r)[..count]))),
            Tag::Sym | Tag::Mixed => Err(Fault::Type),
        }
    }

    /// `|/` and `&/`: extreme of the elements; empty arrays yield the
    /// type's zero.
    pub(super) fn reduce_extreme(&mut self, r: Value, is_max: bool) -> FaultResult<Value> {
        if r.is_atom() {
            return match r.tag() {
                Tag::Sym | Tag::Mixed => Err(Fault::Type),
                _ => self.heap.retain(r),
            };
        }
        if r.is_matrix() {
            let flat = self.ravel(r)?;
            let result = self.reduce_extreme(flat, is_max);
            self.heap.release(flat);
            return result;
        }
        let count = r.count();
        match r.tag() {
            Tag::Bit => {
                let words = self.heap.words(r);
                let bit = if is_max {
                    reduce::max_bits(words)
                } else {
                    reduce::min_bits(words, count)
                };
                Ok(Value::bit(bit))
            }
            Tag::Byte => {
                let a = &self.heap.u8s(r)[..count];
                Ok(Value::byte(if is_max {
                    reduce::max_u8(a)
                } else {
                    reduce::min_u8(a)
                }))
            }
            Tag::Int => {
                let a = &self.heap.i32s(r)[..count];
                Ok(Value::int(if is_max {
                    reduce::max_i32(a)
                } else {
                    reduce::min_i32(a)
                }))
            }
            Tag::Float => {
                let a = &self.heap.f32s(r)[..count];
                Ok(Value::float(if is_max {
                    reduce::max_f32(a)
                } else {
                    reduce::min_f32(a)
                }))
            }
            Tag::Sym | Tag::Mixed => Err(Fault::Type),
        }
    }

    /// Dyadic `.`: matrix x matrix, matrix x vector, vector x matrix, or
    /// the dot product of two vectors. Float operands only.
    pub(super) fn matrix_product(&mut self, l: Value, r: Value) -> FaultResult<Value> {
        if l.is_atom() || r.is_atom() {
            return Err(Fault::Rank);
        }
        if !matches!(l.tag(), Tag::Float) || !matches!(r.tag(), Tag::Float) {
            return Err(Fault::Type);
        }
        match (l.is_matrix(), r.is_matrix()) {
            (true, true) => {
                if l.cols() != r.rows() {
                    return Err(Fault::Rank);
                }
                let (rows, inner, cols) = (l.rows(), l.cols(), r.cols());
                let stride_log = super::shape::stride_log_for(Tag::Float, cols);
                let out = self
                    .heap
                    .alloc_cap(Tag::Float, rows * cols, rows << stride_log)?
                    .with_shape(rows, stride_log);
                let cap = Heap::cap(out);
                let (am, bm, om) = (l.stride_log(), r.stride_log(), stride_log);
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let o = &mut cast_slice_mut::<u64, f32>(ow)[..cap];
                let a = cast_slice::<u64, f32>(aw);
                let b = cast_slice::<u64, f32>(bw);
                self.workers.run(o, 1 << om, |off, chunk| {
                    let row0 = off >> om;
                    let chunk_rows = chunk.len() >> om;
                    matmul::matmat(chunk, om, &a[row0 << am..], am, b, bm, chunk_rows, inner, cols);
                });
                Ok(out)
            }
            (true, false) => {
                if l.cols() != r.count() {
                    return Err(Fault::Rank);
                }
                let (rows, inner) = (l.rows(), l.cols());
                let am = l.stride_log();
                let out = self.heap.alloc(Tag::Float, rows)?;
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let o = &mut cast_slice_mut::<u64, f32>(ow)[..rows];
                let a = cast_slice::<u64, f32>(aw);
                let x = &cast_slice::<u64, f32>(bw)[..inner];
                self.workers.run(o, 1, |off, chunk| {
                    matmul::matvec(chunk, &a[off << am..], am, inner, x);
                });
                Ok(out)
            }
            (false, true) => {
                if l.count() != r.rows() {
                    return Err(Fault::Rank);
                }
                let (inner, cols) = (r.rows(), r.cols());
                let bm = r.stride_log();
                let out = self.heap.alloc(Tag::Float, cols)?;
                let (ow, aw, bw) = self.heap.bufs3(out, l, r);
                let o = &mut cast_slice_mut::<u64, f32>(ow)[..cols];
                let x = &cast_slice::<u64, f32>(aw)[..inner];
                let b = cast_slice::<u64, f32>(bw);
                self.workers.run(o, 1, |off, chunk| {
                    matmul::vecmat(chunk, x, &b[off..], bm, inner, chunk.len());
                });
                Ok(out)
            }
            (false, false) => {
                if l.count() != r.count() {
                    return Err(Fault::Length);
                }
                let count = l.count();
                let a = &self.heap.f32s(l)[..count];
                let b = &self.heap.f32s(r)[..count];
                Ok(Value::float(reduce::dot_f32(a, b)))
            }
        }
    }

    fn unary_f32<F: Fn(f32) -> f32 + Sync>(&mut self, r: Value, f: F) -> FaultResult<Value> {
        let rc = self.convert_new(r, Tag::Float)?;
        let result = (|| {
            if let Some(Atom::Float(x)) = rc.atom() {
                return Ok(Value::float(f(x)));
            }
            let out = self.alloc_like(Tag::Float, rc)?;
            let cap = Heap::cap(out);
            let (ow, aw) = self.heap.bufs2(out, rc);
            let o = &mut cast_slice_mut::<u64, f32>(ow)[..cap];
            let a = &cast_slice::<u64, f32>(aw)[..cap];
            self.workers.run(o, 1, |off, chunk| {
                arith::map(chunk, &a[off..off + chunk.len()], &f)
            });
            Ok(out)
        })();
        self.heap.release(rc);
        result
    }

    fn unary_i32(&mut self, r: Value, f: fn(i32) -> i32) -> FaultResult<Value> {
        let rc = self.convert_new(r, Tag::Int)?;
        let result = (|| {
            if let Some(Atom::Int(x)) = rc.atom() {
                return Ok(Value::int(f(x)));
            }
            let out = self.alloc_like(Tag::Int, rc)?;
            let cap = Heap::cap(out);
            let (ow, aw) = self.heap.bufs2(out, rc);
            let o = &mut cast_slice_mut::<u64, i32>(ow)[..cap];
            let a = &cast_slice::<u64, i32>(aw)[..cap];
            self.workers.run(o, 1, |off, chunk| {
                arith::map(chunk, &a[off..off + chunk.len()], f)
            });
            Ok(out)
        })();
        self.heap.release(rc);
        result
    }
}
