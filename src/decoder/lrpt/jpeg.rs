//! Baseline JPEG pieces used by the LRPT imager: standard luminance Huffman
//! tables, quality scaled quantisation and an 8x8 inverse DCT. There is no
//! byte stuffing in the compressed stream.

pub const BLOCK_PIXELS: usize = 64;

const DC_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const AC_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
#[rustfmt::skip]
const AC_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Natural (row major) index of each zigzag position.
#[rustfmt::skip]
const ZIGZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10, 17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34, 27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Standard luminance quantisation table, row major.
#[rustfmt::skip]
const STD_QUANT: [u8; 64] = [
    16, 11, 10, 16,  24,  40,  51,  61,
    12, 12, 14, 19,  26,  58,  60,  55,
    14, 13, 16, 24,  40,  57,  69,  56,
    14, 17, 22, 29,  51,  87,  80,  62,
    18, 22, 37, 56,  68, 109, 103,  77,
    24, 35, 55, 64,  81, 104, 113,  92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103,  99,
];

const EOB: u8 = 0x00;
const ZRL: u8 = 0xF0;

/// MSB first reader over a byte slice.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn bit(&mut self) -> Option<u16> {
        let byte = self.data.get(self.pos / 8)?;
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Some(bit as u16)
    }

    pub fn bits(&mut self, count: u8) -> Option<u16> {
        (0..count).try_fold(0u16, |acc, _| Some((acc << 1) | self.bit()?))
    }
}

struct HuffmanTable {
    mincode: [i32; 17],
    maxcode: [i32; 17],
    valptr: [usize; 17],
    values: &'static [u8],
}

impl HuffmanTable {
    fn new(bits: &[u8; 16], values: &'static [u8]) -> Self {
        let mut mincode = [0; 17];
        let mut maxcode = [-1; 17];
        let mut valptr = [0; 17];
        let mut code = 0i32;
        let mut k = 0usize;
        for len in 1..=16 {
            let count = bits[len - 1] as usize;
            if count > 0 {
                valptr[len] = k;
                mincode[len] = code;
                code += count as i32;
                k += count;
                maxcode[len] = code - 1;
            }
            code <<= 1;
        }
        Self {
            mincode,
            maxcode,
            valptr,
            values,
        }
    }

    fn decode(&self, reader: &mut BitReader) -> Option<u8> {
        let mut code = 0i32;
        for len in 1..=16 {
            code = (code << 1) | reader.bit()? as i32;
            if code <= self.maxcode[len] {
                let index = self.valptr[len] + (code - self.mincode[len]) as usize;
                return self.values.get(index).copied();
            }
        }
        None
    }
}

fn extend(value: u16, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    let value = value as i32;
    if value < 1 << (size - 1) {
        value - (1 << size) + 1
    } else {
        value
    }
}

/// Quantisation table for an LRPT quality factor, row major.
pub fn quant_table(quality: u8) -> [f32; 64] {
    let q = quality as f32;
    let factor = if quality > 20 && quality < 50 {
        5000.0 / q
    } else {
        200.0 - 2.0 * q
    };
    STD_QUANT.map(|v| (factor / 100.0 * v as f32).round().max(1.0))
}

pub struct BlockDecoder {
    dc: HuffmanTable,
    ac: HuffmanTable,
    /// cos((2x + 1) u pi / 16), scaled by 1/sqrt(2) for u = 0.
    cosines: [[f32; 8]; 8],
}

impl Default for BlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDecoder {
    pub fn new() -> Self {
        let mut cosines = [[0.0f32; 8]; 8];
        for (x, row) in cosines.iter_mut().enumerate() {
            for (u, c) in row.iter_mut().enumerate() {
                let scale = if u == 0 { std::f32::consts::FRAC_1_SQRT_2 } else { 1.0 };
                *c = scale
                    * ((2 * x + 1) as f32 * u as f32 * std::f32::consts::PI / 16.0).cos();
            }
        }
        Self {
            dc: HuffmanTable::new(&DC_BITS, &DC_VALUES),
            ac: HuffmanTable::new(&AC_BITS, &AC_VALUES),
            cosines,
        }
    }

    /// Decode up to `count` consecutive blocks sharing one DC predictor.
    /// Stops early at the first corrupt block.
    pub fn decode(&self, data: &[u8], quality: u8, count: usize) -> Vec<[u8; BLOCK_PIXELS]> {
        let quant = quant_table(quality);
        let mut reader = BitReader::new(data);
        let mut dc = 0i32;
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(coefficients) = self.coefficients(&mut reader, &mut dc) else {
                break;
            };
            let mut dequantized = [0.0f32; 64];
            for (zz, &c) in coefficients.iter().enumerate() {
                let natural = ZIGZAG[zz];
                dequantized[natural] = c as f32 * quant[natural];
            }
            blocks.push(self.idct(&dequantized));
        }
        blocks
    }

    fn coefficients(&self, reader: &mut BitReader, dc: &mut i32) -> Option<[i32; 64]> {
        let mut coefficients = [0i32; 64];

        let category = self.dc.decode(reader)?;
        *dc += extend(reader.bits(category)?, category);
        coefficients[0] = *dc;

        let mut k = 1;
        while k < 64 {
            let symbol = self.ac.decode(reader)?;
            match symbol {
                EOB => break,
                ZRL => k += 16,
                _ => {
                    k += (symbol >> 4) as usize;
                    if k >= 64 {
                        return None;
                    }
                    let size = symbol & 0x0F;
                    coefficients[k] = extend(reader.bits(size)?, size);
                    k += 1;
                }
            }
        }
        Some(coefficients)
    }

    fn idct(&self, coefficients: &[f32; 64]) -> [u8; BLOCK_PIXELS] {
        // rows: horizontal frequencies to x
        let mut rows = [0.0f32; 64];
        for v in 0..8 {
            for x in 0..8 {
                rows[v * 8 + x] = (0..8)
                    .map(|u| self.cosines[x][u] * coefficients[v * 8 + u])
                    .sum();
            }
        }
        let mut pixels = [0u8; BLOCK_PIXELS];
        for y in 0..8 {
            for x in 0..8 {
                let value: f32 = (0..8).map(|v| self.cosines[y][v] * rows[v * 8 + x]).sum();
                pixels[y * 8 + x] = (value / 4.0 + 128.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        pixels
    }
}
