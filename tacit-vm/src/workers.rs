//! Fan-out of large kernels across worker threads.
//!
//! The contract is a start/join barrier per kernel call: the output range
//! is cut into at most `N` contiguous slices of whole units, each worker
//! writes its own slice and reads shared inputs, and the call does not
//! return until every slice is done. Refcounts and the pool are never
//! touched inside the barrier.

use crate::consts::WORKER_SPLIT_MIN;

/// Worker configuration, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Workers {
    count: usize,
}

impl Workers {
    pub(crate) fn new(count: usize) -> Workers {
        Workers {
            count: count.max(1),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Run `f` over `out`, split into per-worker slices when the output is
    /// large enough. `unit` is the indivisible element granule (1 for
    /// element-wise kernels, the row stride for row-parallel ones); slices
    /// always hold whole units. `f` receives the element offset of its
    /// slice within `out`.
    pub(crate) fn run<T, F>(&self, out: &mut [T], unit: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        debug_assert!(unit > 0 && out.len() % unit == 0);
        let units = out.len() / unit;
        let lanes = self.count.min(units);
        if lanes <= 1 || out.len() <= WORKER_SPLIT_MIN * self.count {
            f(0, out);
            return;
        }

        std::thread::scope(|scope| {
            let mut rest = out;
            let mut start = 0;
            for lane in 0..lanes {
                // Same partition as the serial split: [i*n/N, (i+1)*n/N).
                let end = (lane + 1) * units / lanes * unit;
                let (chunk, tail) = rest.split_at_mut(end - start);
                rest = tail;
                let offset = start;
                start = end;
                if lane + 1 == lanes {
                    // The calling thread takes the last slice itself.
                    f(offset, chunk);
                } else {
                    let f = &f;
                    scope.spawn(move || f(offset, chunk));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_inputs_run_inline() {
        let workers = Workers::new(4);
        let mut out = vec![0u32; 64];
        workers.run(&mut out, 1, |offset, chunk| {
            assert_eq!(offset, 0);
            assert_eq!(chunk.len(), 64);
            for (i, slot) in chunk.iter_mut().enumerate() {
                *slot = i as u32;
            }
        });
        assert_eq!(out[63], 63);
    }

    #[test]
    fn large_inputs_cover_every_element_once() {
        let workers = Workers::new(4);
        let n = WORKER_SPLIT_MIN * 4 + 129;
        let mut out = vec![0u64; n];
        workers.run(&mut out, 1, |offset, chunk| {
            for (i, slot) in chunk.iter_mut().enumerate() {
                *slot += (offset + i) as u64;
            }
        });
        for (i, &v) in out.iter().enumerate() {
            assert_eq!(v, i as u64);
        }
    }

    #[test]
    fn row_units_stay_whole() {
        let workers = Workers::new(3);
        let unit = 8;
        let rows = WORKER_SPLIT_MIN;
        let mut out = vec![0u8; unit * rows];
        workers.run(&mut out, unit, |offset, chunk| {
            assert_eq!(offset % unit, 0);
            assert_eq!(chunk.len() % unit, 0);
            chunk.fill(1);
        });
        assert!(out.iter().all(|&b| b == 1));
    }
}
