//! Structural verbs: flip, reverse, ravel, catenate, reshape, gather,
//! grade, diagonal, iota.

use bytemuck::{cast_slice, cast_slice_mut};
use tacit_asm::Fault;
use tacit_types::{Atom, Tag, Value};

use super::elementwise::logical_ranges;
use super::Ctx;
use crate::error::FaultResult;
use crate::heap::Heap;
use crate::kernels::permute;

/// Minimal power-of-two row stride for a matrix of `cols` columns. Bit
/// rows stay word-aligned so row kernels can work on whole words.
pub(super) fn stride_log_for(tag: Tag, cols: usize) -> u32 {
    let log = cols.max(1).next_power_of_two().trailing_zeros();
    if matches!(tag, Tag::Bit) {
        log.max(6)
    } else {
        log
    }
}

impl Ctx<'_> {
    /// Monadic `+`: transpose. Atoms and rank-1 arrays pass through.
    pub(super) fn flip(&mut self, r: Value) -> FaultResult<Value> {
        if !r.is_matrix() {
            return self.heap.retain(r);
        }
        let tag = r.tag();
        if matches!(tag, Tag::Mixed) {
            return Err(Fault::Type);
        }
        let (rows, cols) = (r.rows(), r.cols());
        let out_stride = stride_log_for(tag, rows);
        let out = self
            .heap
            .alloc_cap(tag, r.count(), cols << out_stride)?
            .with_shape(cols, out_stride);
        let (ow, aw) = self.heap.bufs2(out, r);
        match tag {
            Tag::Bit => permute::transpose_bits(ow, out_stride, aw, r.stride_log(), rows, cols),
            Tag::Byte => permute::transpose(
                cast_slice_mut::<u64, u8>(ow),
                out_stride,
                cast_slice::<u64, u8>(aw),
                r.stride_log(),
                rows,
                cols,
            ),
            Tag::Int | Tag::Sym | Tag::Float => permute::transpose(
                cast_slice_mut::<u64, u32>(ow),
                out_stride,
                cast_slice::<u64, u32>(aw),
                r.stride_log(),
                rows,
                cols,
            ),
            Tag::Mixed => unreachable!("mixed matrices were screened above"),
        }
        Ok(out)
    }

    /// Monadic `|`: reverse the elements of a rank-1 array.
    pub(super) fn reverse(&mut self, r: Value) -> FaultResult<Value> {
        if r.is_atom() {
            return self.heap.retain(r);
        }
        if r.is_matrix() {
            return Err(Fault::Rank);
        }
        let count = r.count();
        let out = self.heap.alloc(r.tag(), count)?;
        let (ow, aw) = self.heap.bufs2(out, r);
        match r.tag() {
            Tag::Bit => permute::reverse_bits(ow, aw, count),
            Tag::Byte => permute::reverse(
                &mut cast_slice_mut::<u64, u8>(ow)[..count],
                &cast_slice::<u64, u8>(aw)[..count],
            ),
            Tag::Int | Tag::Sym | Tag::Float => permute::reverse(
                &mut cast_slice_mut::<u64, u32>(ow)[..count],
                &cast_slice::<u64, u32>(aw)[..count],
            ),
            Tag::Mixed => permute::reverse(ow, aw),
        }
        if r.tag() == Tag::Mixed {
            self.retain_elements(out)?;
        }
        Ok(out)
    }

    /// Monadic `,`: atoms become one-element arrays, matrices flatten to
    /// their logical elements, rank-1 arrays pass through.
    pub(super) fn ravel(&mut self, r: Value) -> FaultResult<Value> {
        if let Some(atom) = r.atom() {
            let out = self.heap.alloc(r.tag(), 1)?;
            write_atom(self.heap, out, 0, atom);
            return Ok(out);
        }
        if !r.is_matrix() {
            return self.heap.retain(r);
        }
        let out = self.heap.alloc(r.tag(), r.count())?;
        let src_ranges = logical_ranges(r);
        let (ow, aw) = self.heap.bufs2(out, r);
        let mut written = 0;
        for src in src_ranges {
            copy_span(r.tag(), ow, written, aw, src.start, src.len());
            written += src.len();
        }
        if r.tag() == Tag::Mixed {
            self.retain_elements(out)?;
        }
        Ok(out)
    }

    /// Dyadic `,`: catenate. Equal-or-promotable tags concatenate flat;
    /// anything else boxes into a mixed array.
    pub(super) fn catenate(&mut self, l: Value, r: Value) -> FaultResult<Value> {
        let total = l.count() + r.count();
        if l.tag().numeric_rank().is_some() && r.tag().numeric_rank().is_some() {
            let tag = l.tag().promote(r.tag()).expect("both sides are numeric");
            return self.catenate_flat(tag, l, r, total);
        }
        if l.tag() == r.tag() && !matches!(l.tag(), Tag::Mixed) {
            return self.catenate_flat(l.tag(), l, r, total);
        }
        self.catenate_mixed(l, r, total)
    }

    fn catenate_flat(&mut self, tag: Tag, l: Value, r: Value, total: usize) -> FaultResult<Value> {
        let lc = self.convert_new(l, tag)?;
        let rc = match self.convert_new(r, tag) {
            Ok(value) => value,
            Err(fault) => {
                self.heap.release(lc);
                return Err(fault);
            }
        };
        let result = self.catenate_parts(tag, lc, rc, total);
        self.heap.release(lc);
        self.heap.release(rc);
        result
    }

    fn catenate_parts(&mut self, tag: Tag, lc: Value, rc: Value, total: usize) -> FaultResult<Value> {
        let out = self.heap.alloc(tag, total)?;
        let mut written = 0;
        for part in [lc, rc] {
            if let Some(atom) = part.atom() {
                write_atom(self.heap, out, written, atom);
                written += 1;
                continue;
            }
            let src_ranges = logical_ranges(part);
            let (ow, aw) = self.heap.bufs2(out, part);
            for src in src_ranges {
                copy_span(tag, ow, written, aw, src.start, src.len());
                written += src.len();
            }
        }
        Ok(out)
    }

    fn catenate_mixed(&mut self, l: Value, r: Value, total: usize) -> FaultResult<Value> {
        let out = self.heap.alloc(Tag::Mixed, total)?;
        let mut elements = Vec::with_capacity(total);
        for part in [l, r] {
            match self.boxed_elements(part) {
                Ok(mut side) => elements.append(&mut side),
                Err(fault) => {
                    // Elements collected so far hold fresh references.
                    for value in elements {
                        self.heap.release(value);
                    }
                    self.heap.release(out);
                    return Err(fault);
                }
            }
        }
        let words = self.heap.words_mut(out);
        for (slot, value) in words.iter_mut().zip(&elements) {
            *slot = value.bits();
        }
        Ok(out)
    }

    /// Elements of a value as owned value words: atoms pass through,
    /// basic arrays box each element, mixed arrays retain each element.
    fn boxed_elements(&mut self, value: Value) -> FaultResult<Vec<Value>> {
        if let Some(atom) = value.atom() {
            return Ok(vec![atom_value(atom)]);
        }
        let mut elements = Vec::with_capacity(value.count());
        if value.tag() == Tag::Mixed {
            for element in self.heap.mixed_values(value) {
                elements.push(self.heap.retain(element)?);
            }
            return Ok(elements);
        }
        for range in logical_ranges(value) {
            for i in range {
                elements.push(read_element(self.heap, value, i));
            }
        }
        Ok(elements)
    }

    /// Dyadic `#`: reshape. An int atom takes that many elements cycling;
    /// a two-element int vector builds a matrix.
    pub(super) fn reshape(&mut self, l: Value, r: Value) -> FaultResult<Value> {
        let dims = self.shape_spec(l)?;
        // Matrices source their logical elements through a flat copy.
        let flat = self.ravel(r)?;
        let result = self.reshape_flat(dims, flat);
        self.heap.release(flat);
        result
    }

    fn shape_spec(&mut self, l: Value) -> FaultResult<(usize, Option<usize>)> {
        if let Some(atom) = l.atom() {
            let n = int_of(atom).ok_or(Fault::Type)?;
            let n = usize::try_from(n).map_err(|_| Fault::Domain)?;
            return Ok((n, None));
        }
        if l.tag() != Tag::Int || l.is_matrix() || l.count() != 2 {
            return Err(Fault::Rank);
        }
        let dims = self.heap.i32s(l);
        let rows = usize::try_from(dims[0]).map_err(|_| Fault::Domain)?;
        let cols = usize::try_from(dims[1]).map_err(|_| Fault::Domain)?;
        if rows == 0 || cols == 0 {
            return Err(Fault::Domain);
        }
        Ok((rows, Some(cols)))
    }

    fn reshape_flat(&mut self, dims: (usize, Option<usize>), flat: Value) -> FaultResult<Value> {
        let tag = flat.tag();
        let src_count = flat.count();
        let (out, ranges) = match dims {
            (n, None) => {
                let out = self.heap.alloc(tag, n)?;
                (out, vec![0..n])
            }
            (rows, Some(cols)) => {
                if rows > crate::consts::MAX_ROWS {
                    return Err(Fault::OutOfMemory);
                }
                let stride_log = stride_log_for(tag, cols);
                let out = self
                    .heap
                    .alloc_cap(tag, rows * cols, rows << stride_log)?
                    .with_shape(rows, stride_log);
                (out, logical_ranges(out))
            }
        };
        if out.count() > 0 && src_count == 0 {
            self.heap.release(out);
            return Err(Fault::Length);
        }
        if out.count() > 0 {
            let (ow, aw) = self.heap.bufs2(out, flat);
            let mut taken = 0usize;
            for range in ranges {
                let mut dst = range.start;
                let mut remaining = range.len();
                while remaining > 0 {
                    let src = taken % src_count;
                    let len = remaining.min(src_count - src);
                    copy_span(tag, ow, dst, aw, src, len);
                    dst += len;
                    taken += len;
                    remaining -= len;
                }
            }
            if tag == Tag::Mixed {
                self.retain_elements(out)?;
            }
        }
        Ok(out)
    }

    /// Dyadic `@` and array application: gather with bounds checks.
    pub(super) fn gather(&mut self, l: Value, r: Value) -> FaultResult<Value> {
        if l.is_atom() {
            return Err(Fault::Rank);
        }
        if l.is_matrix() || r.is_matrix() {
            return Err(Fault::NotYetImplemented);
        }
        let idx = self.index_operand(r)?;
        let result = self.gather_flat(l, idx);
        self.heap.release(idx);
        result
    }

    /// Coerce an index operand to ints.
    fn index_operand(&mut self, r: Value) -> FaultResult<Value> {
        match r.tag() {
            Tag::Int => self.heap.retain(r),
            Tag::Bit | Tag::Byte => self.convert_new(r, Tag::Int),
            _ => Err(Fault::Type),
        }
    }

    fn gather_flat(&mut self, src: Value, idx: Value) -> FaultResult<Value> {
        let src_count = src.count();
        if let Some(Atom::Int(i)) = idx.atom() {
            let i = usize::try_from(i).map_err(|_| Fault::Index)?;
            if i >= src_count {
                return Err(Fault::Index);
            }
            let element = read_element(self.heap, src, i);
            return if src.tag() == Tag::Mixed {
                self.heap.retain(element)
            } else {
                Ok(element)
            };
        }
        let out = self.heap.alloc(src.tag(), idx.count())?;
        let result = (|| {
            let (ow, aw, iw) = self.heap.bufs3(out, src, idx);
            let indices = &cast_slice::<u64, i32>(iw)[..idx.count()];
            match src.tag() {
                Tag::Bit => permute::gather_bits(ow, aw, src_count, indices),
                Tag::Byte => permute::gather(
                    &mut cast_slice_mut::<u64, u8>(ow)[..indices.len()],
                    &cast_slice::<u64, u8>(aw)[..src_count],
                    indices,
                ),
                Tag::Int | Tag::Sym | Tag::Float => permute::gather(
                    &mut cast_slice_mut::<u64, u32>(ow)[..indices.len()],
                    &cast_slice::<u64, u32>(aw)[..src_count],
                    indices,
                ),
                Tag::Mixed => permute::gather(ow, aw, indices),
            }
        })();
        if let Err(fault) = result {
            self.heap.release(out);
            return Err(fault);
        }
        if src.tag() == Tag::Mixed {
            self.retain_elements(out)?;
        }
        Ok(out)
    }

    /// Monadic `<` and `>`: sort permutation of a rank-1 numeric array.
    pub(super) fn grade(&mut self, r: Value, descending: bool) -> FaultResult<Value> {
        if r.is_atom() || r.is_matrix() {
            return Err(Fault::Rank);
        }
        let count = r.count();
        let out = match r.tag() {
            Tag::Int => {
                let out = self.heap.alloc(Tag::Int, count)?;
                let (ow, aw) = self.heap.bufs2(out, r);
                let keys = &cast_slice::<u64, i32>(aw)[..count];
                let slots = &mut cast_slice_mut::<u64, i32>(ow)[..count];
                permute::grade(slots, keys, |a, b| if descending { b.cmp(a) } else { a.cmp(b) });
                out
            }
            Tag::Byte => {
                let out = self.heap.alloc(Tag::Int, count)?;
                let (ow, aw) = self.heap.bufs2(out, r);
                let keys = &cast_slice::<u64, u8>(aw)[..count];
                let slots = &mut cast_slice_mut::<u64, i32>(ow)[..count];
                permute::grade(slots, keys, |a, b| if descending { b.cmp(a) } else { a.cmp(b) });
                out
            }
            Tag::Float => {
                let out = self.heap.alloc(Tag::Int, count)?;
                let (ow, aw) = self.heap.bufs2(out, r);
                let keys = &cast_slice::<u64, f32>(aw)[..count];
                let slots = &mut cast_slice_mut::<u64, i32>(ow)[..count];
                permute::grade(slots, keys, |a, b| {
                    if descending {
                        b.total_cmp(a)
                    } else {
                        a.total_cmp(b)
                    }
                });
                out
            }
            _ => return Err(Fault::Type),
        };
        Ok(out)
    }

    /// Monadic `=`: copy the main diagonal of a matrix.
    pub(super) fn diagonal(&mut self, r: Value) -> FaultResult<Value> {
        if !r.is_matrix() {
            return Err(Fault::Rank);
        }
        if matches!(r.tag(), Tag::Mixed) {
            return Err(Fault::Type);
        }
        let len = r.rows().min(r.cols());
        let out = self.heap.alloc(r.tag(), len)?;
        let stride_log = r.stride_log();
        let (ow, aw) = self.heap.bufs2(out, r);
        match r.tag() {
            Tag::Byte => permute::diagonal(
                &mut cast_slice_mut::<u64, u8>(ow)[..len],
                cast_slice::<u64, u8>(aw),
                stride_log,
            ),
            Tag::Int | Tag::Sym | Tag::Float => permute::diagonal(
                &mut cast_slice_mut::<u64, u32>(ow)[..len],
                cast_slice::<u64, u32>(aw),
                stride_log,
            ),
            Tag::Bit => {
                for i in 0..len {
                    let j = (i << stride_log) + i;
                    let bit = (aw[j >> 6] >> (j & 63)) & 1;
                    ow[i >> 6] |= bit << (i & 63);
                }
            }
            Tag::Mixed => unreachable!("mixed matrices were screened above"),
        }
        Ok(out)
    }

    /// Monadic `!`: `0 1 … n-1`.
    pub(super) fn iota(&mut self, r: Value) -> FaultResult<Value> {
        let atom = r.atom().ok_or(Fault::Rank)?;
        let n = int_of(atom).ok_or(Fault::Type)?;
        let n = usize::try_from(n).map_err(|_| Fault::Domain)?;
        let out = self.heap.alloc(Tag::Int, n)?;
        for (i, slot) in self.heap.i32s_mut(out).iter_mut().enumerate() {
            *slot = i as i32;
        }
        Ok(out)
    }

    /// Bump each boxed element of a freshly copied mixed array. A failure
    /// is a refcount overflow, which is fatal upstream.
    fn retain_elements(&mut self, out: Value) -> FaultResult<()> {
        for element in self.heap.mixed_values(out) {
            if element.is_boxed() {
                self.heap.retain(element)?;
            }
        }
        Ok(())
    }
}

fn int_of(atom: Atom) -> Option<i32> {
    match atom {
        Atom::Int(i) => Some(i),
        Atom::Byte(b) => Some(i32::from(b)),
        Atom::Bit(b) => Some(i32::from(b)),
        _ => None,
    }
}

/// Box an atom as a value word for mixed storage.
fn atom_value(atom: Atom) -> Value {
    match atom {
        Atom::Bit(b) => Value::bit(b),
        Atom::Byte(b) => Value::byte(b),
        Atom::Int(i) => Value::int(i),
        Atom::Sym(s) => Value::sym(s),
        Atom::Float(f) => Value::float(f),
    }
}

/// Read element `i` of an array as an atom value (mixed: the raw word).
fn read_element(heap: &Heap, value: Value, i: usize) -> Value {
    match value.tag() {
        Tag::Bit => {
            let words = heap.words(value);
            Value::bit((words[i >> 6] >> (i & 63)) & 1 != 0)
        }
        Tag::Byte => Value::byte(heap.u8s(value)[i]),
        Tag::Int => Value::int(heap.i32s(value)[i]),
        Tag::Sym => Value::sym(tacit_types::Sym::from_bits(heap.u32s(value)[i])),
        Tag::Float => Value::float(heap.f32s(value)[i]),
        Tag::Mixed => Value::from_bits(heap.words(value)[i]),
    }
}

/// Write an atom into element `i` of an array of matching tag.
fn write_atom(heap: &mut Heap, out: Value, i: usize, atom: Atom) {
    match atom {
        Atom::Bit(b) => {
            let words = heap.words_mut(out);
            if b {
                words[i >> 6] |= 1u64 << (i & 63);
            } else {
                words[i >> 6] &= !(1u64 << (i & 63));
            }
        }
        Atom::Byte(b) => heap.u8s_mut(out)[i] = b,
        Atom::Int(v) => heap.i32s_mut(out)[i] = v,
        Atom::Sym(s) => heap.u32s_mut(out)[i] = s.bits(),
        Atom::Float(f) => heap.f32s_mut(out)[i] = f,
    }
}

/// Copy `len` elements from `src_off` of one buffer to `dst_off` of
/// another of the same tag. Bit copies go bit by bit.
fn copy_span(
    tag: Tag,
    dst_words: &mut [u64],
    dst_off: usize,
    src_words: &[u64],
    src_off: usize,
    len: usize,
) {
    match tag {
        Tag::Bit => {
            for k in 0..len {
                let s = src_off + k;
                let d = dst_off + k;
                let bit = (src_words[s >> 6] >> (s & 63)) & 1;
                if bit != 0 {
                    dst_words[d >> 6] |= 1u64 << (d & 63);
                } else {
                    dst_words[d >> 6] &= !(1u64 << (d & 63));
                }
            }
        }
        Tag::Byte => {
            let dst = cast_slice_mut::<u64, u8>(dst_words);
            let src = cast_slice::<u64, u8>(src_words);
            dst[dst_off..dst_off + len].copy_from_slice(&src[src_off..src_off + len]);
        }
        Tag::Int | Tag::Sym | Tag::Float => {
            let dst = cast_slice_mut::<u64, u32>(dst_words);
            let src = cast_slice::<u64, u32>(src_words);
            dst[dst_off..dst_off + len].copy_from_slice(&src[src_off..src_off + len]);
        }
        Tag::Mixed => {
            dst_words[dst_off..dst_off + len].copy_from_slice(&src_words[src_off..src_off + len]);
        }
    }
}
