use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use num_complex::Complex32;

use crate::decoder::dsp::{low_pass, FreqXlatingFir, Nco};
use crate::decoder::error::DecodeError;
use crate::decoder::raw::RawIq;
use crate::decoder::wav::WavWriter;
use crate::observation::ObservationRequest;
use crate::predict::Propagator;
use crate::shutdown::Shutdown;

const TRANSITION_WIDTH_HZ: f64 = 1_600.0;
const BLOCK_SAMPLES: usize = 64 * 1024;

/// Low-pass cutoff covering the signal over the whole Doppler sweep.
pub fn filter_bandwidth<P: Propagator + ?Sized>(
    request: &ObservationRequest,
    track: &P,
) -> Result<i64, DecodeError> {
    let station = &request.ground_station;
    let start = track.downlink_frequency(station, request.satellite_frequency, request.start)?;
    let end = track.downlink_frequency(station, request.satellite_frequency, request.end)?;
    let bandwidth = (start - end + request.bandwidth) / 2;
    if bandwidth <= 0 || bandwidth as f64 >= request.input_sample_rate as f64 / 2.0 {
        return Err(DecodeError::InvalidBandwidth(bandwidth));
    }
    Ok(bandwidth)
}

/// Tracks `satellite_frequency - downlink_frequency(t)` at the output rate,
/// recomputed once per second of capture time.
struct DopplerCorrection<'a, P: ?Sized> {
    track: &'a P,
    request: &'a ObservationRequest,
    nco: Nco,
    rate: u32,
    samples: u64,
    next_update: u64,
}

impl<'a, P: Propagator + ?Sized> DopplerCorrection<'a, P> {
    fn new(track: &'a P, request: &'a ObservationRequest) -> Self {
        let rate = request.output_sample_rate;
        Self {
            track,
            request,
            nco: Nco::new(0.0, rate as f64),
            rate,
            samples: 0,
            next_update: 0,
        }
    }

    fn capture_time(&self) -> DateTime<Utc> {
        let micros = self.samples as i64 * 1_000_000 / self.rate as i64;
        self.request.start + Duration::microseconds(micros)
    }

    fn apply(&mut self, block: &mut [Complex32]) -> Result<(), DecodeError> {
        for sample in block.iter_mut() {
            if self.samples == self.next_update {
                let downlink = self.track.downlink_frequency(
                    &self.request.ground_station,
                    self.request.satellite_frequency,
                    self.capture_time(),
                )?;
                self.nco
                    .set_frequency((self.request.satellite_frequency - downlink) as f64);
                self.next_update += self.rate as u64;
            }
            *sample = self.nco.mix(*sample);
            self.samples += 1;
        }
        Ok(())
    }
}

/// Stage 1: shift the capture to baseband, filter, decimate and remove the
/// Doppler drift. Writes the result as a WAV at the output rate and returns
/// the number of frames written. The partial WAV is removed on failure.
pub fn correct<P: Propagator + ?Sized>(
    raw: &mut RawIq,
    request: &ObservationRequest,
    track: &P,
    wav_path: &Path,
    shutdown: &Shutdown,
) -> Result<u64, DecodeError> {
    let result = write_corrected(raw, request, track, wav_path, shutdown);
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(wav_path) {
            log::debug!("Unable to remove {}: {}", wav_path.display(), e);
        }
    }
    result
}

fn write_corrected<P: Propagator + ?Sized>(
    raw: &mut RawIq,
    request: &ObservationRequest,
    track: &P,
    wav_path: &Path,
    shutdown: &Shutdown,
) -> Result<u64, DecodeError> {
    let (input, output) = (request.input_sample_rate, request.output_sample_rate);
    if output == 0 || input % output != 0 {
        return Err(DecodeError::Decimation { input, output });
    }
    let bandwidth = filter_bandwidth(request, track)?;
    let taps = low_pass(1.0, input as f64, bandwidth as f64, TRANSITION_WIDTH_HZ);
    log::debug!(
        "[{}] Filter: {} Hz cutoff, {} taps, decimation {}",
        request.id,
        bandwidth,
        taps.len(),
        input / output
    );

    let center = (request.satellite_frequency - request.actual_frequency) as f64;
    let mut xlating = FreqXlatingFir::new(taps, center, input as f64, (input / output) as usize);
    let mut doppler = DopplerCorrection::new(track, request);
    let mut wav = WavWriter::create(wav_path, output).map_err(DecodeError::io(wav_path))?;

    let mut block = Vec::with_capacity(BLOCK_SAMPLES);
    let mut decimated = Vec::new();
    loop {
        if shutdown.is_triggered() {
            return Err(DecodeError::Cancelled);
        }
        let read = raw
            .read(&mut block, BLOCK_SAMPLES)
            .map_err(DecodeError::io(raw.path()))?;
        if read == 0 {
            break;
        }
        decimated.clear();
        xlating.process(&block, &mut decimated);
        doppler.apply(&mut decimated)?;
        wav.write(&decimated).map_err(DecodeError::io(wav_path))?;
    }

    let frames = wav.frames();
    wav.finish().map_err(DecodeError::io(wav_path))?;
    Ok(frames)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::decoder::raw::tests::{write_capture, write_corrupt_capture};
    use crate::decoder::tests::{request, ConstantShift};

    #[test]
    fn bandwidth_covers_doppler_sweep() {
        let request = request();
        let track = ConstantShift(0);
        assert_eq!(filter_bandwidth(&request, &track).unwrap(), 300);

        let mut wide = request.clone();
        wide.bandwidth = -600;
        assert!(matches!(
            filter_bandwidth(&wide, &track),
            Err(DecodeError::InvalidBandwidth(-300))
        ));
    }

    #[test]
    fn writes_decimated_wav() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("iq.raw.gz");
        write_capture(&raw_path, &vec![200u8; 4_800]);
        let wav_path = dir.path().join("out.wav");

        let mut raw = RawIq::open(&raw_path).unwrap();
        let frames = correct(
            &mut raw,
            &request(),
            &ConstantShift(100),
            &wav_path,
            &Shutdown::new(),
        )
        .unwrap();

        // 2400 input samples decimated by two
        assert_eq!(frames, 1_200);
        let len = std::fs::metadata(&wav_path).unwrap().len();
        assert_eq!(len, 44 + 1_200 * 4);
    }

    #[test]
    fn uneven_decimation_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("iq.raw.gz");
        write_capture(&raw_path, &[128u8; 64]);
        let wav_path = dir.path().join("out.wav");
        std::fs::write(&wav_path, b"stale").unwrap();

        let mut request = request();
        request.output_sample_rate = 1_000;
        let mut raw = RawIq::open(&raw_path).unwrap();
        let result = correct(&mut raw, &request, &ConstantShift(0), &wav_path, &Shutdown::new());

        assert!(matches!(result, Err(DecodeError::Decimation { .. })));
        assert!(!wav_path.exists());
    }

    #[test]
    fn cancelled_before_first_block() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("iq.raw.gz");
        write_capture(&raw_path, &[128u8; 64]);
        let wav_path = dir.path().join("out.wav");

        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut raw = RawIq::open(&raw_path).unwrap();
        let result = correct(&mut raw, &request(), &ConstantShift(0), &wav_path, &shutdown);
        assert!(matches!(result, Err(DecodeError::Cancelled)));
        assert!(!wav_path.exists());
    }

    #[test]
    fn capture_read_error_names_the_capture() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("iq.raw.gz");
        write_corrupt_capture(&raw_path);
        let wav_path = dir.path().join("out.wav");

        let mut raw = RawIq::open(&raw_path).unwrap();
        let result = correct(&mut raw, &request(), &ConstantShift(0), &wav_path, &Shutdown::new());
        match result {
            Err(DecodeError::Io { path, .. }) => assert_eq!(path, raw_path),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!wav_path.exists());
    }
}
