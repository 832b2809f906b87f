//! Interface to the raster-access layer the engine moves pixels through.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    components::Encoding,
    errors::{Result, RusterioError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Read,
    Write,
}

bitflags! {
    /// Validity-mask flags of a band, as defined by GDAL RFC 15.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaskFlags: u32 {
        const ALL_VALID = 0x01;
        const PER_DATASET = 0x02;
        const ALPHA = 0x04;
        const NODATA = 0x08;
    }
}

/// Color interpretation of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorRole {
    #[default]
    Undefined,
    Gray,
    Palette,
    Red,
    Green,
    Blue,
    Alpha,
}

/// Pixel rectangle in dataset space, as handed to the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub xoff: usize,
    pub yoff: usize,
    pub xsize: usize,
    pub ysize: usize,
}

impl PixelRect {
    pub fn new(offset: (usize, usize), size: (usize, usize)) -> Self {
        Self {
            xoff: offset.0,
            yoff: offset.1,
            xsize: size.0,
            ysize: size.1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.xsize == 0 || self.ysize == 0
    }
}

/// Band-major native buffer with the pitches of its encoding.
///
/// `bytes` holds `bands` planes of `rows * cols` pixels, each pixel
/// `encoding.size()` bytes wide.
#[derive(Debug)]
pub struct RawBuffer<'a> {
    bytes: &'a mut [u8],
    encoding: Encoding,
    bands: usize,
    rows: usize,
    cols: usize,
}

impl<'a> RawBuffer<'a> {
    pub fn new(
        bytes: &'a mut [u8],
        encoding: Encoding,
        bands: usize,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let expected = bands * rows * cols * encoding.size();
        if bytes.len() != expected {
            return Err(RusterioError::ShapeMismatch {
                expected: vec![expected],
                found: vec![bytes.len()],
            });
        }
        Ok(Self {
            bytes,
            encoding,
            bands,
            rows,
            cols,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// (rows, cols) of one plane.
    pub fn size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel_space(&self) -> usize {
        self.encoding.size()
    }

    pub fn line_space(&self) -> usize {
        self.pixel_space() * self.cols
    }

    pub fn band_space(&self) -> usize {
        self.line_space() * self.rows
    }

    pub fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }
}

/// Native handle of a single band or mask band.
pub trait NativeBand {
    /// Move `rect` of the band to or from `buffer`. When the buffer size
    /// differs from the rectangle size the native layer decimates.
    fn raster_io(&self, direction: Direction, rect: PixelRect, buffer: RawBuffer<'_>) -> Result<()>;
}

/// Multi-band raster dataset as exposed by the raster-access layer.
///
/// Band indexes are 1-based. Handles are not required to be `Sync`:
/// callers serialize access to one dataset.
pub trait RasterDataset {
    type Band<'a>: NativeBand
    where
        Self: 'a;

    fn count(&self) -> usize;
    fn height(&self) -> usize;
    fn width(&self) -> usize;

    /// (height, width)
    fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    fn indexes(&self) -> Vec<usize> {
        (1..=self.count()).collect()
    }

    fn encoding(&self, index: usize) -> Result<Encoding>;
    fn nodata(&self, index: usize) -> Result<Option<f64>>;
    fn mask_flags(&self, index: usize) -> Result<MaskFlags>;
    fn color_role(&self, index: usize) -> Result<ColorRole>;

    /// Resolve a band handle, failing with [`RusterioError::NullBand`].
    fn band(&self, index: usize) -> Result<Self::Band<'_>>;

    /// Resolve the mask band of `index`, failing with
    /// [`RusterioError::NullMaskBand`].
    fn mask_band(&self, index: usize) -> Result<Self::Band<'_>>;

    /// One interleaved transfer over `band_map`; plane `i` of `buffer` maps
    /// to band `band_map[i]`.
    fn dataset_io(
        &self,
        direction: Direction,
        band_map: &[usize],
        rect: PixelRect,
        buffer: RawBuffer<'_>,
    ) -> Result<()>;
}
