//! Rate 1/2, K = 7 convolutional code used on the LRPT downlink.
//!
//! The shift register takes new bits at the LSB. Each input bit produces two
//! coded bits, the parities of the register masked with [`POLY_A`] and
//! [`POLY_B`]. Soft symbols are signed bytes where a positive value means one.

const POLY_A: u8 = 0x4F;
const POLY_B: u8 = 0x6D;
const STATES: usize = 64;

fn parity(x: u8) -> u8 {
    (x.count_ones() & 1) as u8
}

/// Coded output for register value `reg` (7 bits).
fn branch(reg: u8) -> (u8, u8) {
    (parity(reg & POLY_A), parity(reg & POLY_B))
}

/// Convolutional encoder. Returns the coded bits (0/1) and the final state.
pub fn encode(bits: &[u8], mut state: u8) -> (Vec<u8>, u8) {
    let mut out = Vec::with_capacity(bits.len() * 2);
    for &bit in bits {
        let reg = ((state << 1) | (bit & 1)) & 0x7F;
        let (a, b) = branch(reg);
        out.push(a);
        out.push(b);
        state = reg & 0x3F;
    }
    (out, state)
}

/// Soft decision Viterbi decoder with full traceback.
pub struct Viterbi {
    /// Expected symbol pair for every 7-bit register value.
    outputs: [(u8, u8); 128],
    decisions: Vec<u64>,
}

impl Default for Viterbi {
    fn default() -> Self {
        Self::new()
    }
}

impl Viterbi {
    pub fn new() -> Self {
        let mut outputs = [(0, 0); 128];
        for (reg, out) in outputs.iter_mut().enumerate() {
            *out = branch(reg as u8);
        }
        Self {
            outputs,
            decisions: Vec::new(),
        }
    }

    /// Decode `soft.len() / 2` bits starting from an unknown encoder state.
    pub fn decode(&mut self, soft: &[i8]) -> Vec<u8> {
        let steps = soft.len() / 2;
        self.decisions.clear();
        self.decisions.reserve(steps);

        let mut metrics = [0i32; STATES];
        let mut next = [0i32; STATES];

        for pair in soft.chunks_exact(2) {
            let (a, b) = (pair[0] as i32, pair[1] as i32);
            let mut decision = 0u64;
            for (ns, metric) in next.iter_mut().enumerate() {
                let low = ns >> 1;
                let high = low | 0x20;
                let m0 = metrics[low] + self.branch_metric(ns, a, b);
                let m1 = metrics[high] + self.branch_metric(ns | 0x40, a, b);
                if m1 > m0 {
                    *metric = m1;
                    decision |= 1 << ns;
                } else {
                    *metric = m0;
                }
            }
            self.decisions.push(decision);
            std::mem::swap(&mut metrics, &mut next);
        }

        let mut state = metrics
            .iter()
            .enumerate()
            .max_by_key(|(_, m)| **m)
            .map(|(s, _)| s)
            .unwrap_or(0);

        let mut bits = vec![0u8; steps];
        for (t, decision) in self.decisions.iter().enumerate().rev() {
            bits[t] = (state & 1) as u8;
            let from_high = (decision >> state) & 1;
            state = (state >> 1) | ((from_high as usize) << 5);
        }
        bits
    }

    fn branch_metric(&self, reg: usize, a: i32, b: i32) -> i32 {
        let (ea, eb) = self.outputs[reg];
        let ma = if ea == 1 { a } else { -a };
        let mb = if eb == 1 { b } else { -b };
        ma + mb
    }
}

/// Pack bits MSB first.
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| acc | ((bit & 1) << (7 - i)))
        })
        .collect()
}

/// Unpack bytes into bits MSB first.
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|&byte| (0..8).rev().map(move |i| (byte >> i) & 1))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn to_soft(coded: &[u8]) -> Vec<i8> {
        coded.iter().map(|&c| if c == 1 { 100 } else { -100 }).collect()
    }

    fn pseudo_random_bits(n: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((x >> 16) & 1) as u8
            })
            .collect()
    }

    #[test]
    fn clean_stream_decodes() {
        let bits = pseudo_random_bits(400, 7);
        let (coded, _) = encode(&bits, 0);
        assert_eq!(Viterbi::new().decode(&to_soft(&coded)), bits);
    }

    #[test]
    fn corrects_scattered_symbol_errors_from_unknown_state() {
        let bits = pseudo_random_bits(600, 42);
        let (coded, _) = encode(&bits, 0x2A);
        let mut soft = to_soft(&coded);
        for i in (5..soft.len()).step_by(37) {
            soft[i] = -soft[i];
        }
        assert_eq!(Viterbi::new().decode(&soft), bits);
    }

    #[test]
    fn erasures_are_tolerated() {
        let bits = pseudo_random_bits(300, 9);
        let (coded, _) = encode(&bits, 0);
        let mut soft = to_soft(&coded);
        for i in (3..soft.len()).step_by(11) {
            soft[i] = 0;
        }
        assert_eq!(Viterbi::new().decode(&soft), bits);
    }

    #[test]
    fn bit_packing() {
        let bytes = [0x1A, 0xCF, 0xFC, 0x1D];
        let bits = unpack_bits(&bytes);
        assert_eq!(bits.len(), 32);
        assert_eq!(&bits[..8], &[0, 0, 0, 1, 1, 0, 1, 0]);
        assert_eq!(pack_bits(&bits), bytes);
    }
}
