use std::io::{self, Read};

use crate::decoder::lrpt::packets::{Vcdu, VCDU_LEN};
use crate::decoder::lrpt::reed_solomon::ReedSolomon;
use crate::decoder::lrpt::viterbi::{self, Viterbi};

pub const ASM: u32 = 0x1ACF_FC1D;
pub const CADU_LEN: usize = 1024;
const INTERLEAVE: usize = 4;
/// Soft symbols (coded bits) making up one CADU.
const CODED_CADU: usize = CADU_LEN * 8 * 2;
const LOOKAHEAD: usize = 32 * 2;
/// The first coded bits of the marker depend on the previous frame.
const SYNC_SKIP: usize = 12;
const SYNC_LEN: usize = 64;
const MAX_SYNC_ERRORS: u32 = 6;
/// Symbol slip tolerated when looking for the next marker.
const RESYNC_SLACK: usize = 8;
const READ_CHUNK: usize = 64 * 1024;

/// CCSDS pseudo-random sequence, x^8 + x^7 + x^5 + x^3 + 1 seeded with ones.
pub fn pn_sequence() -> [u8; 255] {
    let mut table = [0u8; 255];
    let mut reg: u8 = 0xFF;
    for byte in table.iter_mut() {
        for _ in 0..8 {
            let out = reg >> 7;
            *byte = (*byte << 1) | out;
            let feedback = out ^ (reg >> 4 & 1) ^ (reg >> 2 & 1) ^ (reg & 1);
            reg = (reg << 1) | feedback;
        }
    }
    table
}

pub fn derandomize(data: &mut [u8], pn: &[u8; 255]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= pn[i % pn.len()];
    }
}

/// Phase ambiguity of the QPSK constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

const ROTATIONS: [Rotation; 4] = [
    Rotation::Deg0,
    Rotation::Deg90,
    Rotation::Deg180,
    Rotation::Deg270,
];

impl Rotation {
    fn apply(self, i: i8, q: i8) -> (i8, i8) {
        match self {
            Rotation::Deg0 => (i, q),
            Rotation::Deg90 => (q, i.saturating_neg()),
            Rotation::Deg180 => (i.saturating_neg(), q.saturating_neg()),
            Rotation::Deg270 => (q.saturating_neg(), i),
        }
    }
}

/// Turns a stream of soft symbols into error corrected VCDUs.
pub struct FrameDecoder<R> {
    reader: R,
    buffer: Vec<i8>,
    pos: usize,
    eof: bool,
    sync: [u8; SYNC_LEN],
    viterbi: Viterbi,
    rs: ReedSolomon,
    pn: [u8; 255],
    rotation: Rotation,
    dropped: u64,
}

impl<R: Read> FrameDecoder<R> {
    pub fn new(reader: R) -> Self {
        let (coded, _) = viterbi::encode(&viterbi::unpack_bits(&ASM.to_be_bytes()), 0);
        let mut sync = [0u8; SYNC_LEN];
        sync.copy_from_slice(&coded);
        Self {
            reader,
            buffer: Vec::new(),
            pos: 0,
            eof: false,
            sync,
            viterbi: Viterbi::new(),
            rs: ReedSolomon::new(),
            pn: pn_sequence(),
            rotation: Rotation::Deg0,
            dropped: 0,
        }
    }

    /// Frames found but rejected by Reed-Solomon.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Make sure `need` symbols are buffered past `pos`. False at end of input.
    fn fill(&mut self, need: usize) -> io::Result<bool> {
        if self.pos > READ_CHUNK {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }
        if self.buffer.len() - self.pos < need && !self.eof {
            let mut chunk = vec![0u8; READ_CHUNK];
            while self.buffer.len() - self.pos < need && !self.eof {
                let n = self.reader.read(&mut chunk)?;
                if n == 0 {
                    self.eof = true;
                }
                self.buffer.extend(chunk[..n].iter().map(|&b| b as i8));
            }
        }
        Ok(self.buffer.len() - self.pos >= need)
    }

    fn sync_matches(&self, window: &[i8], rotation: Rotation) -> bool {
        let mut errors = 0;
        for k in (SYNC_SKIP..SYNC_LEN).step_by(2) {
            let (i, q) = rotation.apply(window[k], window[k + 1]);
            errors += u32::from((i > 0) as u8 != self.sync[k]);
            errors += u32::from((q > 0) as u8 != self.sync[k + 1]);
            if errors > MAX_SYNC_ERRORS {
                return false;
            }
        }
        true
    }

    /// Advance `pos` to the next marker. The previous rotation is tried first.
    fn find_sync(&mut self) -> io::Result<bool> {
        loop {
            if !self.fill(SYNC_LEN)? {
                return Ok(false);
            }
            let window = &self.buffer[self.pos..self.pos + SYNC_LEN];
            let preferred = self.rotation;
            let found = std::iter::once(preferred)
                .chain(ROTATIONS.into_iter().filter(|r| *r != preferred))
                .find(|r| self.sync_matches(window, *r));
            if let Some(rotation) = found {
                if rotation != self.rotation {
                    log::debug!("Sync at symbol {} with {:?}", self.pos, rotation);
                }
                self.rotation = rotation;
                return Ok(true);
            }
            self.pos += 1;
        }
    }

    /// Decode the CADU at `pos`. `None` when it fails error correction.
    fn decode_cadu(&mut self) -> io::Result<Option<Vcdu>> {
        let have_lookahead = self.fill(CODED_CADU + LOOKAHEAD)?;
        let available = self.buffer.len() - self.pos;
        let len = if have_lookahead {
            CODED_CADU + LOOKAHEAD
        } else {
            available - available % 2
        };

        let mut soft = Vec::with_capacity(len);
        for pair in self.buffer[self.pos..self.pos + len].chunks_exact(2) {
            let (i, q) = self.rotation.apply(pair[0], pair[1]);
            soft.push(i);
            soft.push(q);
        }
        let bits = self.viterbi.decode(&soft);
        let cadu = viterbi::pack_bits(&bits[..CADU_LEN * 8]);

        let mut block = cadu[4..].to_vec();
        derandomize(&mut block, &self.pn);
        if !self.correct(&mut block) {
            return Ok(None);
        }
        Ok(Vcdu::from_bytes(&block[..VCDU_LEN]))
    }

    /// Reed-Solomon over the interleaved codewords, in place.
    fn correct(&self, block: &mut [u8]) -> bool {
        let mut codeword = [0u8; 255];
        for lane in 0..INTERLEAVE {
            for (j, symbol) in codeword.iter_mut().enumerate() {
                *symbol = block[j * INTERLEAVE + lane];
            }
            match self.rs.decode(&mut codeword) {
                Ok(0) => {}
                Ok(n) => {
                    log::trace!("Corrected {} symbols in codeword {}", n, lane);
                    for (j, symbol) in codeword.iter().enumerate() {
                        block[j * INTERLEAVE + lane] = *symbol;
                    }
                }
                Err(_) => return false,
            }
        }
        true
    }
}

impl<R: Read> Iterator for FrameDecoder<R> {
    type Item = io::Result<Vcdu>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.find_sync() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
            match self.fill(CODED_CADU) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
            match self.decode_cadu() {
                Ok(Some(vcdu)) => {
                    self.pos += CODED_CADU - RESYNC_SLACK;
                    return Some(Ok(vcdu));
                }
                Ok(None) => {
                    self.dropped += 1;
                    self.pos += 1;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::lrpt::reed_solomon::{DATA_LEN, PARITY_LEN};
    use crate::decoder::lrpt::viterbi::tests::to_soft;

    /// Build the soft symbol stream of consecutive CADUs carrying `vcdus`.
    pub(crate) fn modulate(vcdus: &[Vec<u8>]) -> Vec<i8> {
        let rs = ReedSolomon::new();
        let pn = pn_sequence();
        let mut bits = Vec::new();
        for vcdu in vcdus {
            assert_eq!(vcdu.len(), VCDU_LEN);
            let mut block = vec![0u8; CADU_LEN - 4];
            block[..VCDU_LEN].copy_from_slice(vcdu);
            for lane in 0..INTERLEAVE {
                let mut data = [0u8; DATA_LEN];
                for (j, d) in data.iter_mut().enumerate() {
                    *d = vcdu[j * INTERLEAVE + lane];
                }
                let parity = rs.encode(&data);
                for (j, p) in parity.iter().enumerate().take(PARITY_LEN) {
                    block[(DATA_LEN + j) * INTERLEAVE + lane] = *p;
                }
            }
            derandomize(&mut block, &pn);
            bits.extend(viterbi::unpack_bits(&ASM.to_be_bytes()));
            bits.extend(viterbi::unpack_bits(&block));
        }
        let (coded, _) = viterbi::encode(&bits, 0);
        to_soft(&coded)
    }

    fn vcdu(counter: u32) -> Vec<u8> {
        let mut v: Vec<u8> = (0..VCDU_LEN).map(|i| (i * 31 + counter as usize) as u8).collect();
        v[0] = 0x40;
        v[1] = 5;
        v[2..5].copy_from_slice(&counter.to_be_bytes()[1..]);
        v
    }

    #[test]
    fn pn_sequence_start() {
        assert_eq!(&pn_sequence()[..4], &[0xFF, 0x48, 0x0E, 0xC0]);
    }

    #[test]
    fn decodes_frames_after_noise() {
        let frames: Vec<_> = (0..3).map(vcdu).collect();
        let mut soft: Vec<i8> = (0..1001).map(|i| if i % 3 == 0 { 40 } else { -40 }).collect();
        soft.extend(modulate(&frames));

        let mut decoder = FrameDecoder::new(io::Cursor::new(soft.iter().map(|&s| s as u8).collect::<Vec<_>>()));
        let decoded: Vec<_> = decoder.by_ref().map(|v| v.unwrap()).collect();

        assert_eq!(decoded.len(), 3);
        for (got, want) in decoded.iter().zip(&frames) {
            assert_eq!(got.as_bytes(), want.as_slice());
        }
        assert_eq!(decoded[2].counter(), 2);
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn every_rotation_is_recovered() {
        let frames: Vec<_> = (0..2).map(vcdu).collect();
        let soft = modulate(&frames);
        for rotation in ROTATIONS {
            // rotate forward; the decoder must find the inverse
            let rotated: Vec<u8> = soft
                .chunks_exact(2)
                .flat_map(|p| {
                    let (i, q) = match rotation {
                        Rotation::Deg0 => (p[0], p[1]),
                        Rotation::Deg90 => (p[1].saturating_neg(), p[0]),
                        Rotation::Deg180 => (p[0].saturating_neg(), p[1].saturating_neg()),
                        Rotation::Deg270 => (p[1], p[0].saturating_neg()),
                    };
                    [i as u8, q as u8]
                })
                .collect();
            let decoded: Vec<_> = FrameDecoder::new(io::Cursor::new(rotated))
                .map(|v| v.unwrap())
                .collect();
            assert_eq!(decoded.len(), 2, "{:?}", rotation);
            assert_eq!(decoded[1].as_bytes(), frames[1].as_slice());
        }
    }

    #[test]
    fn symbol_errors_are_corrected() {
        let frames = vec![vcdu(9)];
        let mut soft = modulate(&frames);
        for i in (100..soft.len()).step_by(97) {
            soft[i] = soft[i].saturating_neg();
        }
        let decoded: Vec<_> = FrameDecoder::new(io::Cursor::new(
            soft.iter().map(|&s| s as u8).collect::<Vec<_>>(),
        ))
        .map(|v| v.unwrap())
        .collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].as_bytes(), frames[0].as_slice());
    }

    #[test]
    fn noise_yields_nothing() {
        let noise: Vec<u8> = (0..40_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        assert_eq!(FrameDecoder::new(io::Cursor::new(noise)).count(), 0);
    }
}
