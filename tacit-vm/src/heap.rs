//! Handle table and refcounted array storage.
//!
//! Every boxed [`Value`] names an entry here by index; entries map to pool
//! blocks by lane offset. Nothing outside this module sees a pointer into
//! the arena, only handle indices and borrowed slices.

use bytemuck::cast_slice;
use bytemuck::cast_slice_mut;
use tacit_asm::Fault;
use tacit_types::{Tag, Value};

use crate::consts::{HANDLE_COUNT, MAX_COUNT, REFS_MAX};
use crate::error::FaultResult;

mod pool;

pub(crate) use pool::words_for;
use pool::{class_for, LaneOffset, Pool};

#[derive(Debug, Clone, Copy)]
struct Entry {
    offset: LaneOffset,
    class: u8,
    refs: u8,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Free { next: Option<u8> },
    Live(Entry),
}

/// The handle table plus the pool feeding it.
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free_head: Option<u8>,
    pool: Pool,
}

impl Heap {
    pub(crate) fn new() -> Heap {
        let slots = (0..HANDLE_COUNT)
            .map(|i| Slot::Free {
                next: if i + 1 < HANDLE_COUNT {
                    Some((i + 1) as u8)
                } else {
                    None
                },
            })
            .collect();
        Heap {
            slots,
            free_head: Some(0),
            pool: Pool::new(),
        }
    }

    /// Allocate a rank-1 array of `count` elements, refcount 1.
    pub(crate) fn alloc(&mut self, tag: Tag, count: usize) -> FaultResult<Value> {
        self.alloc_cap(tag, count, count)
    }

    /// Allocate with extra capacity, for matrices with padded row strides.
    /// The block comes back zeroed.
    pub(crate) fn alloc_cap(&mut self, tag: Tag, count: usize, cap: usize) -> FaultResult<Value> {
        if count > MAX_COUNT || cap > MAX_COUNT {
            return Err(Fault::OutOfMemory);
        }
        let class = class_for(words_for(tag, cap).max(1) * 8)?;
        let handle = self.free_head.ok_or(Fault::OutOfMemory)?;
        let offset = self.pool.alloc(class)?;
        let Slot::Free { next } = self.slots[handle as usize] else {
            unreachable!("free list head points at a live slot")
        };
        self.free_head = next;
        self.slots[handle as usize] = Slot::Live(Entry {
            offset,
            class: class as u8,
            refs: 1,
        });
        Ok(Value::boxed(tag, count, handle as usize))
    }

    /// Bump the refcount of a boxed value; atoms pass through untouched.
    pub(crate) fn retain(&mut self, value: Value) -> FaultResult<Value> {
        if value.is_atom() {
            return Ok(value);
        }
        let entry = self.entry_mut(value);
        if entry.refs >= REFS_MAX {
            return Err(Fault::RefcountOverflow);
        }
        entry.refs += 1;
        Ok(value)
    }

    /// Drop one reference. On the last one, mixed elements are released
    /// recursively and the block goes back to its pool class.
    pub(crate) fn release(&mut self, value: Value) {
        if value.is_atom() {
            return;
        }
        let entry = self.entry_mut(value);
        if entry.refs > 1 {
            entry.refs -= 1;
            return;
        }
        if value.tag() == Tag::Mixed {
            for element in self.mixed_values(value) {
                self.release(element);
            }
        }
        let handle = value.handle();
        let Slot::Live(entry) = self.slots[handle] else {
            unreachable!("released value names a live slot")
        };
        self.pool.free(entry.offset, entry.class as usize);
        self.slots[handle] = Slot::Free {
            next: self.free_head,
        };
        self.free_head = Some(handle as u8);
    }

    /// Element capacity of the backing block: padded for matrices.
    pub(crate) fn cap(value: Value) -> usize {
        if value.is_matrix() {
            value.rows() << value.stride_log()
        } else {
            value.count()
        }
    }

    fn entry(&self, value: Value) -> Entry {
        let Slot::Live(entry) = self.slots[value.handle()] else {
            unreachable!("boxed value names a live slot")
        };
        entry
    }

    fn entry_mut(&mut self, value: Value) -> &mut Entry {
        let Slot::Live(entry) = &mut self.slots[value.handle()] else {
            unreachable!("boxed value names a live slot")
        };
        entry
    }

    fn word_range(&self, value: Value) -> core::ops::Range<usize> {
        let entry = self.entry(value);
        let start = entry.offset as usize * crate::consts::LANE_WORDS;
        start..start + words_for(value.tag(), Self::cap(value))
    }

    /// Backing words (bit arrays and mixed arrays use these directly).
    pub(crate) fn words(&self, value: Value) -> &[u64] {
        let range = self.word_range(value);
        self.pool.words(self.entry(value).offset, range.len())
    }

    /// Mutable backing words.
    pub(crate) fn words_mut(&mut self, value: Value) -> &mut [u64] {
        let range = self.word_range(value);
        self.pool.words_mut(self.entry(value).offset, range.len())
    }

    /// Float view covering the block's element capacity.
    pub(crate) fn f32s(&self, value: Value) -> &[f32] {
        &cast_slice(self.words(value))[..Self::cap(value)]
    }

    /// Mutable float view.
    pub(crate) fn f32s_mut(&mut self, value: Value) -> &mut [f32] {
        let cap = Self::cap(value);
        &mut cast_slice_mut(self.words_mut(value))[..cap]
    }

    /// Int view.
    pub(crate) fn i32s(&self, value: Value) -> &[i32] {
        &cast_slice(self.words(value))[..Self::cap(value)]
    }

    /// Mutable int view.
    pub(crate) fn i32s_mut(&mut self, value: Value) -> &mut [i32] {
        let cap = Self::cap(value);
        &mut cast_slice_mut(self.words_mut(value))[..cap]
    }

    /// Symbol-word view.
    pub(crate) fn u32s(&self, value: Value) -> &[u32] {
        &cast_slice(self.words(value))[..Self::cap(value)]
    }

    /// Mutable symbol-word view.
    pub(crate) fn u32s_mut(&mut self, value: Value) -> &mut [u32] {
        let cap = Self::cap(value);
        &mut cast_slice_mut(self.words_mut(value))[..cap]
    }

    /// Byte view.
    pub(crate) fn u8s(&self, value: Value) -> &[u8] {
        &cast_slice(self.words(value))[..Self::cap(value)]
    }

    /// Mutable byte view.
    pub(crate) fn u8s_mut(&mut self, value: Value) -> &mut [u8] {
        let cap = Self::cap(value);
        &mut cast_slice_mut(self.words_mut(value))[..cap]
    }

    /// Elements of a mixed array, copied out as value words.
    pub(crate) fn mixed_values(&self, value: Value) -> Vec<Value> {
        debug_assert_eq!(value.tag(), Tag::Mixed);
        self.words(value)[..value.count()]
            .iter()
            .map(|&bits| Value::from_bits(bits))
            .collect()
    }

    /// The output block's words mutably plus two input blocks' words.
    /// The output must be a different block from both inputs.
    pub(crate) fn bufs3(&mut self, out: Value, a: Value, b: Value) -> (&mut [u64], &[u64], &[u64]) {
        debug_assert_ne!(out.handle(), a.handle());
        debug_assert_ne!(out.handle(), b.handle());
        let out_range = self.word_range(out);
        let a_range = self.word_range(a);
        let b_range = self.word_range(b);
        self.pool.split_out(out_range, a_range, b_range)
    }

    /// The output block's words mutably plus one input block's words.
    pub(crate) fn bufs2(&mut self, out: Value, a: Value) -> (&mut [u64], &[u64]) {
        let (out_words, a_words, _) = self.bufs3(out, a, a);
        (out_words, a_words)
    }

    /// Count of live handle entries.
    pub(crate) fn live_handles(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    /// Refcount of a boxed value, for assertions.
    #[cfg(test)]
    pub(crate) fn refs(&self, value: Value) -> u8 {
        self.entry(value).refs
    }

    /// Bytes of arena currently backing live blocks.
    pub(crate) fn used_bytes(&self) -> usize {
        (self.pool.total_lanes() - self.pool.free_lanes()) * 64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_lifecycle() {
        let mut heap = Heap::new();
        let value = heap.alloc(Tag::Int, 10).unwrap();
        assert_eq!(heap.refs(value), 1);
        assert_eq!(heap.live_handles(), 1);

        let value = heap.retain(value).unwrap();
        assert_eq!(heap.refs(value), 2);

        heap.release(value);
        assert_eq!(heap.refs(value), 1);
        heap.release(value);
        assert_eq!(heap.live_handles(), 0);
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn atoms_never_touch_the_table() {
        let mut heap = Heap::new();
        let atom = Value::int(7);
        let atom = heap.retain(atom).unwrap();
        heap.release(atom);
        assert_eq!(heap.live_handles(), 0);
    }

    #[test]
    fn refcount_ceiling_faults() {
        let mut heap = Heap::new();
        let value = heap.alloc(Tag::Byte, 1).unwrap();
        for _ in 1..REFS_MAX {
            heap.retain(value).unwrap();
        }
        assert_eq!(heap.retain(value), Err(Fault::RefcountOverflow));
    }

    #[test]
    fn handles_exhaust_to_oom() {
        let mut heap = Heap::new();
        let mut held = Vec::new();
        for _ in 0..HANDLE_COUNT {
            held.push(heap.alloc(Tag::Int, 1).unwrap());
        }
        assert_eq!(heap.alloc(Tag::Int, 1), Err(Fault::OutOfMemory));
        for value in held {
            heap.release(value);
        }
        assert_eq!(heap.live_handles(), 0);
    }

    #[test]
    fn mixed_release_is_recursive() {
        let mut heap = Heap::new();
        let inner = heap.alloc(Tag::Float, 4).unwrap();
        let outer = heap.alloc(Tag::Mixed, 2).unwrap();
        heap.words_mut(outer)[0] = inner.bits();
        heap.words_mut(outer)[1] = Value::int(1).bits();
        // The mixed array owns the only reference to `inner`.
        heap.release(outer);
        assert_eq!(heap.live_handles(), 0);
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn typed_views_round_trip() {
        let mut heap = Heap::new();
        let value = heap.alloc(Tag::Float, 3).unwrap();
        heap.f32s_mut(value).copy_from_slice(&[1.0, 2.5, -3.0]);
        assert_eq!(heap.f32s(value), &[1.0, 2.5, -3.0]);
        heap.release(value);
    }

    #[test]
    fn capacity_views_cover_matrix_padding() {
        let mut heap = Heap::new();
        // 3 rows, 3 columns, stride 4.
        let value = heap.alloc_cap(Tag::Int, 9, 12).unwrap().with_shape(3, 2);
        assert_eq!(heap.i32s(value).len(), 12);
        heap.release(value.rank1());
    }
}
