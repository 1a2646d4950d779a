//! Deterministic vectorised PRNG.
//!
//! An xorshift128+ generator refills a 16-float buffer at a time; each
//! float is spliced from 23 random mantissa bits under a fixed exponent,
//! giving a uniform sample of [0, 1). The seed is a fixed constant, so
//! every session draws the same stream.

const SEED: [u64; 2] = [0x9e37_79b9_7f4a_7c15, 0xbf58_476d_1ce4_e5b9];
const BUF: usize = 16;

pub(crate) struct XorShift {
    state: [u64; 2],
    buf: [f32; BUF],
    used: usize,
}

impl XorShift {
    pub(crate) fn new() -> XorShift {
        XorShift {
            state: SEED,
            buf: [0.0; BUF],
            used: BUF,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let [mut x, y] = self.state;
        x ^= x << 23;
        let next = x ^ y ^ (x >> 17) ^ (y >> 26);
        self.state = [y, next];
        next.wrapping_add(y)
    }

    fn refill(&mut self) {
        // Two floats per draw: splice 23 mantissa bits under exponent 0,
        // mapping [1, 2) down to [0, 1).
        for i in 0..BUF / 2 {
            let word = self.next_u64();
            for (j, part) in [word as u32, (word >> 32) as u32].into_iter().enumerate() {
                let bits = 0x3f80_0000 | (part & 0x007f_ffff);
                self.buf[i * 2 + j] = f32::from_bits(bits) - 1.0;
            }
        }
        self.used = 0;
    }

    pub(crate) fn next_f32(&mut self) -> f32 {
        if self.used == BUF {
            self.refill();
        }
        let value = self.buf[self.used];
        self.used += 1;
        value
    }

    /// Fill a slice with uniform samples.
    pub(crate) fn fill(&mut self, out: &mut [f32]) {
        for slot in out {
            *slot = self.next_f32();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_is_deterministic() {
        let mut a = XorShift::new();
        let mut b = XorShift::new();
        for _ in 0..100 {
            assert_eq!(a.next_f32(), b.next_f32());
        }
    }

    #[test]
    fn samples_stay_in_unit_interval() {
        let mut rng = XorShift::new();
        let mut out = [0.0f32; 1000];
        rng.fill(&mut out);
        assert!(out.iter().all(|&x| (0.0..1.0).contains(&x)));
        // Crude uniformity check: the mean of 1000 draws sits near 1/2.
        let mean: f32 = out.iter().sum::<f32>() / 1000.0;
        assert!((mean - 0.5).abs() < 0.05);
    }
}
