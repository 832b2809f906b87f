use crate::components::Encoding;

pub type Result<T> = std::result::Result<T, RusterioError>;

#[derive(thiserror::Error, Debug)]
pub enum RusterioError {
    #[error("at least one band index is required")]
    EmptyIndexes,
    #[error("band index {index} is not in 1..={count}")]
    BandIndexOutOfRange { index: usize, count: usize },
    #[error("selected bands have mixed encodings: {0:?}")]
    MixedEncodings(Vec<Encoding>),
    #[error("buffer encoding {found} does not match band encoding {expected}")]
    EncodingMismatch { expected: Encoding, found: Encoding },
    #[error("buffer shape {found:?} does not match expected shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("an output buffer and an output shape are mutually exclusive")]
    OutAndOutShape,
    #[error("unsupported pixel encoding {0}")]
    UnsupportedEncoding(String),
    #[error("invalid window: {0}")]
    InvalidWindow(String),
    #[error("buffer must be contiguous in band-major order")]
    NonContiguousBuffer,
    #[error("raster I/O failed with code {code}: {message}")]
    Io { code: i32, message: String },
    #[error("band {index} could not be resolved to a native band")]
    NullBand { index: usize },
    #[error("mask of band {index} could not be resolved to a native band")]
    NullMaskBand { index: usize },
    #[cfg(feature = "gdal")]
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
}

impl RusterioError {
    /// Whether the error was raised while validating a request, before any
    /// native call was made.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::EmptyIndexes
                | Self::BandIndexOutOfRange { .. }
                | Self::MixedEncodings(_)
                | Self::EncodingMismatch { .. }
                | Self::ShapeMismatch { .. }
                | Self::OutAndOutShape
                | Self::UnsupportedEncoding(_)
                | Self::InvalidWindow(_)
                | Self::NonContiguousBuffer
        )
    }
}
