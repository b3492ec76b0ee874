//! Filter design and the mixing/decimating filter used by Doppler correction.

use std::f64::consts::{PI, TAU};

use num_complex::Complex32;

/// Windowed-sinc low-pass taps with a Hamming window.
///
/// Tap count follows the usual Hamming estimate `53 fs / (22 tw)`, forced
/// odd. Taps are normalised so the DC gain equals `gain`.
pub fn low_pass(gain: f64, sample_rate: f64, cutoff: f64, transition_width: f64) -> Vec<f32> {
    let mut ntaps = (53.0 * sample_rate / (22.0 * transition_width)) as usize;
    if ntaps % 2 == 0 {
        ntaps += 1;
    }
    let ntaps = ntaps.max(3);
    let m = (ntaps - 1) as f64;
    let half = (ntaps / 2) as isize;
    let fw_t0 = TAU * cutoff / sample_rate;

    let mut taps: Vec<f64> = (0..ntaps)
        .map(|i| {
            let window = 0.54 - 0.46 * (TAU * i as f64 / m).cos();
            let n = i as isize - half;
            if n == 0 {
                fw_t0 / PI * window
            } else {
                let n = n as f64;
                (n * fw_t0).sin() / (n * PI) * window
            }
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    for tap in taps.iter_mut() {
        *tap *= gain / sum;
    }
    taps.into_iter().map(|t| t as f32).collect()
}

/// Numerically controlled oscillator. `mix` multiplies by
/// `exp(j 2 pi f n / fs)`; the phase carries over frequency changes.
#[derive(Debug, Clone)]
pub struct Nco {
    sample_rate: f64,
    phase: f64,
    step: f64,
}

impl Nco {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        Self {
            sample_rate,
            phase: 0.0,
            step: TAU * frequency / sample_rate,
        }
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.step = TAU * frequency / self.sample_rate;
    }

    pub fn mix(&mut self, sample: Complex32) -> Complex32 {
        let out = sample * Complex32::from_polar(1.0, self.phase as f32);
        self.phase += self.step;
        if self.phase > PI {
            self.phase -= TAU;
        } else if self.phase < -PI {
            self.phase += TAU;
        }
        out
    }
}

/// Shift by `-center` Hz, low-pass and decimate in one pass.
///
/// The dot product is only evaluated for samples that survive decimation.
pub struct FreqXlatingFir {
    /// Reversed so the dot product runs oldest to newest.
    taps: Vec<f32>,
    /// Delay line stored twice so the window is always contiguous.
    history: Vec<Complex32>,
    pos: usize,
    decimation: usize,
    phase: usize,
    nco: Nco,
}

impl FreqXlatingFir {
    pub fn new(taps: Vec<f32>, center: f64, sample_rate: f64, decimation: usize) -> Self {
        let n = taps.len();
        let taps = taps.into_iter().rev().collect();
        Self {
            taps,
            history: vec![Complex32::new(0.0, 0.0); 2 * n],
            pos: 0,
            decimation: decimation.max(1),
            phase: 0,
            nco: Nco::new(-center, sample_rate),
        }
    }

    /// Filters `input`, appending decimated samples to `out`.
    pub fn process(&mut self, input: &[Complex32], out: &mut Vec<Complex32>) {
        let n = self.taps.len();
        for &sample in input {
            let mixed = self.nco.mix(sample);
            self.history[self.pos] = mixed;
            self.history[self.pos + n] = mixed;
            self.pos = (self.pos + 1) % n;

            self.phase += 1;
            if self.phase == self.decimation {
                self.phase = 0;
                let window = &self.history[self.pos..self.pos + n];
                let acc = window
                    .iter()
                    .zip(&self.taps)
                    .fold(Complex32::new(0.0, 0.0), |acc, (x, h)| acc + *x * *h);
                out.push(acc);
            }
        }
    }
}
