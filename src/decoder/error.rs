use std::path::PathBuf;

use thiserror::Error;

use crate::executor::ProcessError;
use crate::observation::SourceKind;
use crate::predict::PredictError;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no decoder for source {0}")]
    UnsupportedSource(SourceKind),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid filter bandwidth {0} Hz")]
    InvalidBandwidth(i64),
    #[error("input rate {input} is not a multiple of output rate {output}")]
    Decimation { input: u32, output: u32 },
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("demodulator exited with code {0}")]
    DemodulatorFailed(i32),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("decode cancelled")]
    Cancelled,
}

impl DecodeError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| DecodeError::Io { path, source }
    }
}
