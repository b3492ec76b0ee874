pub mod doppler;
pub mod dsp;
mod error;
pub mod lrpt;
pub mod raw;
pub mod wav;

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::ImageFormat;

pub use error::DecodeError;

use crate::executor::{ProcessOutcome, ProcessRunner};
use crate::observation::{ObservationRequest, ObservationResult, SourceKind};
use crate::predict::OrbitModel;
use crate::shutdown::Shutdown;
use lrpt::{FrameDecoder, ImageAssembler, PacketReassembler, Vcdu, VCDU_LEN};
use raw::RawIq;

const SYMBOL_RATE: &str = "72000";

#[derive(Debug, Clone)]
pub struct DecoderSettings {
    /// Parent of the per-request scratch directories.
    pub temp_dir: PathBuf,
    pub meteor_demod: PathBuf,
    /// Time the demodulator gets to exit after SIGTERM.
    pub shutdown_timeout: Duration,
}

/// Scratch files of one request, all under `<temp_dir>/<id>/`.
struct Scratch {
    dir: PathBuf,
    wav: PathBuf,
    soft: PathBuf,
    bin: PathBuf,
    image: PathBuf,
}

impl Scratch {
    fn new(temp_dir: &Path, id: &str) -> Self {
        let dir = temp_dir.join(id);
        Self {
            wav: dir.join(format!("{}-corrected.wav", id)),
            soft: dir.join(format!("{}.s", id)),
            bin: dir.join(format!("{}.bin", id)),
            image: dir.join(format!("lrpt-{}.jpg", id)),
            dir,
        }
    }
}

/// Best effort removal of a scratch file.
fn remove(path: &Path, id: &str) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("[{}] Unable to delete {}: {}", id, path.display(), e);
    }
}

/// Turns a raw LRPT capture into frames and an image.
pub struct Decoder<M> {
    settings: DecoderSettings,
    model: M,
    shutdown: Shutdown,
    runner: ProcessRunner,
}

impl<M: OrbitModel> Decoder<M> {
    pub fn new(settings: DecoderSettings, model: M, shutdown: Shutdown) -> Self {
        let runner = ProcessRunner::new(shutdown.clone(), settings.shutdown_timeout);
        Self {
            settings,
            model,
            shutdown,
            runner,
        }
    }

    /// Runs all stages. Failures end up in `ObservationResult::error`; a
    /// cancelled decode stops without one.
    pub fn decode(&self, raw_iq: &Path, request: &ObservationRequest) -> ObservationResult {
        let mut result = ObservationResult::new(raw_iq.to_path_buf());
        let scratch = Scratch::new(&self.settings.temp_dir, &request.id);

        match self.run(raw_iq, request, &scratch, &mut result) {
            Ok(()) => log::info!(
                "[{}] Decoded {} frames from {}",
                request.id,
                result.decoded_packets,
                raw_iq.display()
            ),
            Err(DecodeError::Cancelled) => log::info!("[{}] Decode cancelled", request.id),
            Err(e) => {
                log::error!("[{}] Decode failed: {}", request.id, e);
                result.error = Some(e.to_string());
            }
        }

        // only succeeds when nothing was retained
        let _ = std::fs::remove_dir(&scratch.dir);
        result
    }

    fn run(
        &self,
        raw_iq: &Path,
        request: &ObservationRequest,
        scratch: &Scratch,
        result: &mut ObservationResult,
    ) -> Result<(), DecodeError> {
        if request.source != SourceKind::Lrpt {
            return Err(DecodeError::UnsupportedSource(request.source));
        }
        let Some(mut raw) = RawIq::open(raw_iq) else {
            log::info!("[{}] No samples in {}", request.id, raw_iq.display());
            return Ok(());
        };
        std::fs::create_dir_all(&scratch.dir).map_err(DecodeError::io(&scratch.dir))?;

        log::info!(
            "[{}] Doppler correction of {} samples",
            request.id,
            raw.total_samples()
        );
        let track = self.model.track(&request.tle)?;
        doppler::correct(&mut raw, request, &track, &scratch.wav, &self.shutdown)?;

        let demodulated = self.demodulate(scratch);
        remove(&scratch.wav, &request.id);
        if let Err(e) = demodulated {
            remove(&scratch.soft, &request.id);
            return Err(e);
        }

        let frames = decode_frames(&scratch.soft, &scratch.bin, &request.id);
        remove(&scratch.soft, &request.id);
        let frames = match frames {
            Ok(frames) => frames,
            Err(e) => {
                remove(&scratch.bin, &request.id);
                return Err(e);
            }
        };
        if frames == 0 {
            log::info!("[{}] No frames decoded", request.id);
            remove(&scratch.bin, &request.id);
            return Ok(());
        }
        result.data_path = Some(scratch.bin.clone());
        result.decoded_packets = frames;

        match synthesize_image(&scratch.bin, request, &scratch.image) {
            Ok(true) => result.image_path = Some(scratch.image.clone()),
            Ok(false) => log::info!("[{}] Not enough data for an image", request.id),
            Err(e) => {
                remove(&scratch.image, &request.id);
                return Err(e);
            }
        }
        Ok(())
    }

    fn demodulate(&self, scratch: &Scratch) -> Result<(), DecodeError> {
        let args = [
            OsStr::new("--quiet"),
            OsStr::new("--output"),
            scratch.soft.as_os_str(),
            OsStr::new("--mode"),
            OsStr::new("oqpsk"),
            OsStr::new("--symrate"),
            OsStr::new(SYMBOL_RATE),
            scratch.wav.as_os_str(),
        ];
        match self.runner.run(&self.settings.meteor_demod, args)? {
            ProcessOutcome::Exited(0) => Ok(()),
            ProcessOutcome::Exited(code) => Err(DecodeError::DemodulatorFailed(code)),
            ProcessOutcome::Cancelled => Err(DecodeError::Cancelled),
        }
    }
}

/// Stage 3: writes every VCDU that passes error correction to `bin`.
fn decode_frames(soft: &Path, bin: &Path, id: &str) -> Result<u64, DecodeError> {
    let input = File::open(soft).map_err(DecodeError::io(soft))?;
    let output = File::create(bin).map_err(DecodeError::io(bin))?;
    let mut output = BufWriter::new(output);
    let mut frames = FrameDecoder::new(BufReader::new(input));

    let mut count = 0;
    for vcdu in frames.by_ref() {
        let vcdu = vcdu.map_err(|source| DecodeError::Io {
            path: soft.to_path_buf(),
            source,
        })?;
        output
            .write_all(vcdu.as_bytes())
            .map_err(|source| DecodeError::Io {
                path: bin.to_path_buf(),
                source,
            })?;
        count += 1;
    }
    output.flush().map_err(DecodeError::io(bin))?;
    log::debug!(
        "[{}] {} frames, {} failed error correction",
        id,
        count,
        frames.dropped()
    );
    Ok(count)
}

/// Stage 4: returns false when the frames hold no imagery.
fn synthesize_image(
    bin: &Path,
    request: &ObservationRequest,
    image_path: &Path,
) -> Result<bool, DecodeError> {
    let bytes = std::fs::read(bin).map_err(DecodeError::io(bin))?;
    let mut packets = PacketReassembler::new();
    let mut assembler = ImageAssembler::new();
    for vcdu in bytes.chunks_exact(VCDU_LEN).filter_map(Vcdu::from_bytes) {
        for packet in packets.push(&vcdu) {
            assembler.push(&packet);
        }
    }
    log::debug!("[{}] Image channels: {:?}", request.id, assembler.channels());

    let Some(mut image) = assembler.render() else {
        return Ok(false);
    };
    // south to north passes scan upside down
    if request.start_latitude < request.end_latitude {
        image = image.rotate180();
    }
    image.save_with_format(image_path, ImageFormat::Jpeg)?;
    Ok(true)
}
