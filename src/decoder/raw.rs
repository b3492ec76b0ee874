use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use num_complex::Complex32;

// header (10) + trailer (8)
const MIN_GZIP_LEN: u64 = 18;

/// Gzip-compressed unsigned 8-bit interleaved I/Q capture.
pub struct RawIq {
    path: PathBuf,
    reader: GzDecoder<BufReader<File>>,
    total_samples: u64,
    buf: Vec<u8>,
}

impl RawIq {
    /// Opens a capture. `None` when the sample count cannot be read or is
    /// zero; a missing file is expected, other failures are logged.
    pub fn open(path: &Path) -> Option<Self> {
        let (file, total_samples) = match sample_count(path) {
            Ok(Some(found)) => found,
            Ok(None) => return None,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Unable to read {}: {}", path.display(), e);
                return None;
            }
        };
        if total_samples == 0 {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            reader: GzDecoder::new(BufReader::new(file)),
            total_samples,
            buf: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Reads up to `max` samples into `out`, replacing its contents.
    /// Returns the number read; zero at end of stream.
    pub fn read(&mut self, out: &mut Vec<Complex32>, max: usize) -> io::Result<usize> {
        self.buf.resize(max * 2, 0);
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        out.clear();
        out.extend(
            self.buf[..filled]
                .chunks_exact(2)
                .map(|iq| Complex32::new(to_unit(iq[0]), to_unit(iq[1]))),
        );
        Ok(out.len())
    }
}

/// Sample count from the gzip ISIZE trailer, with the file rewound.
fn sample_count(path: &Path) -> io::Result<Option<(File, u64)>> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() < MIN_GZIP_LEN {
        return Ok(None);
    }
    // uncompressed length modulo 2^32
    file.seek(SeekFrom::End(-4))?;
    let mut isize = [0u8; 4];
    file.read_exact(&mut isize)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(Some((file, u32::from_le_bytes(isize) as u64 / 2)))
}

fn to_unit(b: u8) -> f32 {
    (b as f32 - 127.5) / 128.0
}
