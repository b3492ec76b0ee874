//! CCSDS Reed-Solomon (255,223) over GF(2^8) in dual basis representation.

const NN: usize = 255;
const NROOTS: usize = 32;
const GF_POLY: u16 = 0x187;
const FCR: usize = 112;
const PRIM: usize = 11;
/// Log of zero.
const A0: u8 = 255;

/// Dual basis conversion matrix rows.
const TAL: [u8; 8] = [0x8d, 0xef, 0xec, 0x86, 0xfa, 0x99, 0xaf, 0x7b];

pub const DATA_LEN: usize = NN - NROOTS;
pub const PARITY_LEN: usize = NROOTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uncorrectable;

pub struct ReedSolomon {
    alpha_to: [u8; 256],
    index_of: [u8; 256],
    /// Generator polynomial, log form.
    genpoly: [u8; NROOTS + 1],
    iprim: usize,
    /// Conventional to dual basis.
    to_dual: [u8; 256],
    /// Dual to conventional basis.
    from_dual: [u8; 256],
}

impl Default for ReedSolomon {
    fn default() -> Self {
        Self::new()
    }
}

fn modnn(mut x: usize) -> usize {
    while x >= NN {
        x -= NN;
        x = (x >> 8) + (x & NN);
    }
    x
}

impl ReedSolomon {
    pub fn new() -> Self {
        let mut alpha_to = [0u8; 256];
        let mut index_of = [0u8; 256];
        let mut sr: u16 = 1;
        for i in 0..NN {
            index_of[sr as usize] = i as u8;
            alpha_to[i] = sr as u8;
            sr <<= 1;
            if sr & 0x100 != 0 {
                sr ^= GF_POLY;
            }
            sr &= 0xFF;
        }
        index_of[0] = A0;
        alpha_to[NN] = 0;

        let mut iprim = 1;
        while iprim % PRIM != 0 {
            iprim += NN;
        }
        iprim /= PRIM;

        let mut genpoly = [0u8; NROOTS + 1];
        genpoly[0] = 1;
        let mut root = FCR * PRIM;
        for i in 0..NROOTS {
            genpoly[i + 1] = 1;
            for j in (1..=i).rev() {
                genpoly[j] = if genpoly[j] != 0 {
                    genpoly[j - 1]
                        ^ alpha_to[modnn(index_of[genpoly[j] as usize] as usize + root)]
                } else {
                    genpoly[j - 1]
                };
            }
            genpoly[0] = alpha_to[modnn(index_of[genpoly[0] as usize] as usize + root)];
            root += PRIM;
        }
        for g in genpoly.iter_mut() {
            *g = index_of[*g as usize];
        }

        let mut to_dual = [0u8; 256];
        let mut from_dual = [0u8; 256];
        for i in 0..256 {
            let mut value = 0u8;
            for j in 0..8 {
                for k in 0..8 {
                    if i & (1 << k) != 0 {
                        value ^= TAL[7 - k] & (1 << j);
                    }
                }
            }
            to_dual[i] = value;
            from_dual[value as usize] = i as u8;
        }

        Self {
            alpha_to,
            index_of,
            genpoly,
            iprim,
            to_dual,
            from_dual,
        }
    }

    fn alpha(&self, log: usize) -> u8 {
        self.alpha_to[modnn(log)]
    }

    fn log(&self, value: u8) -> usize {
        self.index_of[value as usize] as usize
    }

    /// Parity for 223 dual basis data bytes.
    pub fn encode(&self, data: &[u8; DATA_LEN]) -> [u8; PARITY_LEN] {
        let mut parity = [0u8; NROOTS];
        for &byte in data.iter() {
            let feedback = self.index_of[(self.from_dual[byte as usize] ^ parity[0]) as usize];
            if feedback != A0 {
                for j in 1..NROOTS {
                    parity[j] ^= self.alpha(feedback as usize + self.genpoly[NROOTS - j] as usize);
                }
            }
            parity.copy_within(1.., 0);
            parity[NROOTS - 1] = if feedback != A0 {
                self.alpha(feedback as usize + self.genpoly[0] as usize)
            } else {
                0
            };
        }
        parity.map(|p| self.to_dual[p as usize])
    }

    /// Correct a dual basis codeword in place. Returns the number of symbols
    /// corrected.
    pub fn decode(&self, codeword: &mut [u8; NN]) -> Result<usize, Uncorrectable> {
        let mut data = codeword.map(|b| self.from_dual[b as usize]);
        let corrected = self.decode_conventional(&mut data)?;
        *codeword = data.map(|b| self.to_dual[b as usize]);
        Ok(corrected)
    }

    fn decode_conventional(&self, data: &mut [u8; NN]) -> Result<usize, Uncorrectable> {
        // syndromes
        let mut s = [data[0]; NROOTS];
        for &byte in data.iter().skip(1) {
            for (i, si) in s.iter_mut().enumerate() {
                *si = if *si == 0 {
                    byte
                } else {
                    byte ^ self.alpha(self.log(*si) + (FCR + i) * PRIM)
                };
            }
        }
        if s.iter().all(|&v| v == 0) {
            return Ok(0);
        }
        let s = s.map(|v| self.index_of[v as usize]);

        // Berlekamp-Massey
        let mut lambda = [0u8; NROOTS + 1];
        lambda[0] = 1;
        let mut b = lambda.map(|v| self.index_of[v as usize]);
        let mut t = [0u8; NROOTS + 1];
        let mut el = 0;
        for r in 1..=NROOTS {
            let mut discr = 0u8;
            for i in 0..r {
                if lambda[i] != 0 && s[r - i - 1] != A0 {
                    discr ^= self.alpha(self.log(lambda[i]) + s[r - i - 1] as usize);
                }
            }
            let discr = self.index_of[discr as usize];
            if discr == A0 {
                b.copy_within(0..NROOTS, 1);
                b[0] = A0;
                continue;
            }
            t[0] = lambda[0];
            for i in 0..NROOTS {
                t[i + 1] = if b[i] != A0 {
                    lambda[i + 1] ^ self.alpha(discr as usize + b[i] as usize)
                } else {
                    lambda[i + 1]
                };
            }
            if 2 * el <= r - 1 {
                el = r - el;
                for i in 0..=NROOTS {
                    b[i] = if lambda[i] == 0 {
                        A0
                    } else {
                        modnn(self.log(lambda[i]) + NN - discr as usize) as u8
                    };
                }
            } else {
                b.copy_within(0..NROOTS, 1);
                b[0] = A0;
            }
            lambda = t;
        }

        let lambda = lambda.map(|v| self.index_of[v as usize]);
        let deg_lambda = lambda.iter().rposition(|&v| v != A0).unwrap_or(0);
        if deg_lambda == 0 {
            return Err(Uncorrectable);
        }

        // Chien search
        let mut reg = lambda;
        reg[0] = 0;
        let mut roots = Vec::with_capacity(deg_lambda);
        let mut locations = Vec::with_capacity(deg_lambda);
        let mut k = self.iprim - 1;
        for i in 1..=NN {
            let mut q = 1u8;
            for j in (1..=deg_lambda).rev() {
                if reg[j] != A0 {
                    reg[j] = modnn(reg[j] as usize + j) as u8;
                    q ^= self.alpha_to[reg[j] as usize];
                }
            }
            if q == 0 {
                roots.push(i);
                locations.push(k);
                if roots.len() == deg_lambda {
                    break;
                }
            }
            k = modnn(k + self.iprim);
        }
        if roots.len() != deg_lambda {
            return Err(Uncorrectable);
        }

        // Forney
        let deg_omega = deg_lambda - 1;
        let mut omega = [A0; NROOTS + 1];
        for i in 0..=deg_omega {
            let mut tmp = 0u8;
            for j in 0..=i {
                if s[i - j] != A0 && lambda[j] != A0 {
                    tmp ^= self.alpha(s[i - j] as usize + lambda[j] as usize);
                }
            }
            omega[i] = self.index_of[tmp as usize];
        }

        for (&root, &location) in roots.iter().zip(&locations).rev() {
            let mut num1 = 0u8;
            for i in (0..=deg_omega).rev() {
                if omega[i] != A0 {
                    num1 ^= self.alpha(omega[i] as usize + i * root);
                }
            }
            let num2 = self.alpha(root * (FCR - 1) + NN);
            let mut den = 0u8;
            let top = deg_lambda.min(NROOTS - 1) & !1;
            for i in (0..=top).rev().step_by(2) {
                if lambda[i + 1] != A0 {
                    den ^= self.alpha(lambda[i + 1] as usize + i * root);
                }
            }
            if num1 != 0 && den != 0 {
                data[location] ^= self.alpha(
                    self.log(num1) + self.log(num2) + NN - self.log(den),
                );
            }
        }
        Ok(roots.len())
    }
}
