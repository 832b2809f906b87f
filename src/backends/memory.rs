//! Raster dataset held in memory, emulating the native transfer layer.

use std::cell::{Cell, RefCell};

use log::trace;
use ndarray::{Array2, Array3};
use num_traits::Zero;

use crate::{
    components::{
        ColorRole, Direction, Element, Encoding, MaskFlags, NativeBand, PixelRect, RasterDataset,
        RawBuffer,
    },
    errors::{Result, RusterioError},
};

/// CPLE_IllegalArg
const ILLEGAL_ARG: i32 = 5;
/// CPLE_NotSupported
const NOT_SUPPORTED: i32 = 6;

#[derive(Debug, Clone)]
struct MemBand {
    encoding: Encoding,
    data: RefCell<Vec<u8>>,
    nodata: Option<f64>,
    flags: MaskFlags,
    color_role: ColorRole,
    mask: Option<Vec<u8>>,
    null: bool,
    null_mask: bool,
}

/// In-memory [`RasterDataset`].
///
/// Pixels are stored as native bytes per band. Transfers honor buffer
/// pitches, decimate with nearest neighbour when the buffer size differs from
/// the window, and are counted. Mask bands are derived the way GDAL derives
/// them: explicit masks first, then per-dataset or alpha masks, then nodata.
#[derive(Debug, Clone)]
pub struct MemDataset {
    height: usize,
    width: usize,
    bands: Vec<MemBand>,
    dataset_mask: Option<Vec<u8>>,
    failure: Option<i32>,
    transfers: Cell<usize>,
}

fn to_bytes<T: Element>(values: impl IntoIterator<Item = T>) -> Vec<u8> {
    let components: Vec<T::Component> = values
        .into_iter()
        .flat_map(|value| {
            let (re, im) = value.parts();
            std::iter::once(re).chain(T::ENCODING.is_complex().then_some(im))
        })
        .collect();
    bytemuck::cast_slice(components.as_slice()).to_vec()
}

fn elements<T: Element>(bytes: &[u8]) -> Vec<T> {
    let components: Vec<T::Component> = bytemuck::pod_collect_to_vec(bytes);
    if T::ENCODING.is_complex() {
        components
            .chunks_exact(2)
            .map(|pair| T::from_parts(pair[0], pair[1]))
            .collect()
    } else {
        components
            .into_iter()
            .map(|re| T::from_parts(re, T::Component::zero()))
            .collect()
    }
}

/// Source pixel of buffer pixel `index` when `window` pixels are squeezed or
/// stretched into `buffer` pixels.
fn nearest(index: usize, buffer: usize, window: usize) -> usize {
    ((2 * index + 1) * window) / (2 * buffer)
}

impl MemDataset {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            bands: Vec::new(),
            dataset_mask: None,
            failure: None,
            transfers: Cell::new(0),
        }
    }

    /// Dataset with one band per plane of `array` (bands, rows, cols).
    pub fn from_array<T: Element>(array: Array3<T>) -> Self {
        let (_, height, width) = array.dim();
        let mut dataset = Self::new(height, width);
        for plane in array.outer_iter() {
            dataset.push_band(T::ENCODING, to_bytes(plane.iter().copied()));
        }
        dataset
    }

    fn push_band(&mut self, encoding: Encoding, data: Vec<u8>) -> usize {
        self.bands.push(MemBand {
            encoding,
            data: RefCell::new(data),
            nodata: None,
            flags: MaskFlags::ALL_VALID,
            color_role: ColorRole::Undefined,
            mask: None,
            null: false,
            null_mask: false,
        });
        self.bands.len()
    }

    /// Append a band, returning its index.
    pub fn add_band<T: Element>(&mut self, data: Array2<T>) -> Result<usize> {
        self.check_plane(data.dim())?;
        Ok(self.push_band(T::ENCODING, to_bytes(data.iter().copied())))
    }

    fn check_plane(&self, dim: (usize, usize)) -> Result<()> {
        if dim != (self.height, self.width) {
            return Err(RusterioError::ShapeMismatch {
                expected: vec![self.height, self.width],
                found: vec![dim.0, dim.1],
            });
        }
        Ok(())
    }

    fn band_ref(&self, index: usize) -> Result<&MemBand> {
        index
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or(RusterioError::BandIndexOutOfRange {
                index,
                count: self.bands.len(),
            })
    }

    fn band_mut(&mut self, index: usize) -> Result<&mut MemBand> {
        let count = self.bands.len();
        index
            .checked_sub(1)
            .and_then(|i| self.bands.get_mut(i))
            .ok_or(RusterioError::BandIndexOutOfRange { index, count })
    }

    /// Set or unset nodata. Unless an explicit mask is set, nodata takes
    /// over the mask of the band, shadowing an alpha band.
    pub fn set_nodata(&mut self, index: usize, nodata: Option<f64>) -> Result<()> {
        let has_alpha = self
            .bands
            .iter()
            .enumerate()
            .any(|(i, band)| i + 1 != index && band.color_role == ColorRole::Alpha);
        let has_dataset_mask = self.dataset_mask.is_some();
        let band = self.band_mut(index)?;
        band.nodata = nodata;
        if band.mask.is_none() && !has_dataset_mask {
            band.flags = match (nodata, has_alpha) {
                (Some(_), _) => MaskFlags::NODATA,
                (None, true) => MaskFlags::PER_DATASET | MaskFlags::ALPHA,
                (None, false) => MaskFlags::ALL_VALID,
            };
        }
        Ok(())
    }

    pub fn set_color_role(&mut self, index: usize, role: ColorRole) -> Result<()> {
        self.band_mut(index)?.color_role = role;
        Ok(())
    }

    pub fn set_mask_flags(&mut self, index: usize, flags: MaskFlags) -> Result<()> {
        self.band_mut(index)?.flags = flags;
        Ok(())
    }

    /// Make `index` the alpha band. Bands without nodata use it as their
    /// per-dataset mask.
    pub fn set_alpha_band(&mut self, index: usize) -> Result<()> {
        self.set_color_role(index, ColorRole::Alpha)?;
        self.set_mask_flags(index, MaskFlags::ALL_VALID)?;
        for (i, band) in self.bands.iter_mut().enumerate() {
            if i + 1 != index && band.nodata.is_none() {
                band.flags = MaskFlags::PER_DATASET | MaskFlags::ALPHA;
            }
        }
        Ok(())
    }

    /// Mask shared by all bands.
    pub fn set_dataset_mask(&mut self, mask: Array2<u8>) -> Result<()> {
        self.check_plane(mask.dim())?;
        self.dataset_mask = Some(mask.iter().copied().collect());
        for band in self.bands.iter_mut() {
            band.flags = MaskFlags::PER_DATASET;
        }
        Ok(())
    }

    /// Mask of a single band.
    pub fn set_band_mask(&mut self, index: usize, mask: Array2<u8>) -> Result<()> {
        self.check_plane(mask.dim())?;
        let band = self.band_mut(index)?;
        band.mask = Some(mask.iter().copied().collect());
        band.flags = MaskFlags::empty();
        Ok(())
    }

    /// Make the band handle of `index` unresolvable.
    pub fn set_null_band(&mut self, index: usize, null: bool) -> Result<()> {
        self.band_mut(index)?.null = null;
        Ok(())
    }

    /// Make the mask band handle of `index` unresolvable.
    pub fn set_null_mask_band(&mut self, index: usize, null: bool) -> Result<()> {
        self.band_mut(index)?.null_mask = null;
        Ok(())
    }

    /// Fail every following transfer with `code`.
    pub fn set_failure(&mut self, code: Option<i32>) {
        self.failure = code;
    }

    /// Number of native transfers attempted so far.
    pub fn transfer_count(&self) -> usize {
        self.transfers.get()
    }

    pub fn reset_transfer_count(&self) {
        self.transfers.set(0);
    }

    /// Stored pixels of a band, bypassing the transfer layer.
    pub fn band_array<T: Element>(&self, index: usize) -> Result<Array2<T>> {
        let band = self.band_ref(index)?;
        if band.encoding != T::ENCODING {
            return Err(RusterioError::EncodingMismatch {
                expected: band.encoding,
                found: T::ENCODING,
            });
        }
        let values = elements::<T>(&band.data.borrow());
        Ok(Array2::from_shape_vec((self.height, self.width), values)?)
    }

    fn begin_transfer(&self) -> Result<()> {
        self.transfers.set(self.transfers.get() + 1);
        match self.failure {
            Some(code) => Err(RusterioError::Io {
                code,
                message: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn check_rect(&self, rect: PixelRect) -> Result<()> {
        if rect.xoff + rect.xsize > self.width || rect.yoff + rect.ysize > self.height {
            return Err(RusterioError::Io {
                code: ILLEGAL_ARG,
                message: format!("access window {rect:?} out of range"),
            });
        }
        Ok(())
    }

    fn check_transfer(&self, band: &MemBand, rect: PixelRect, buffer: &RawBuffer<'_>) -> Result<()> {
        self.check_rect(rect)?;
        if buffer.encoding() != band.encoding {
            return Err(RusterioError::Io {
                code: NOT_SUPPORTED,
                message: format!(
                    "buffer encoding {} differs from band encoding {}",
                    buffer.encoding(),
                    band.encoding
                ),
            });
        }
        Ok(())
    }

    /// Validity bytes of the mask band of `index`.
    fn mask_plane(&self, index: usize) -> Result<Vec<u8>> {
        let band = self.band_ref(index)?;
        let pixels = self.height * self.width;
        if let Some(mask) = &band.mask {
            return Ok(mask.clone());
        }
        if band.flags.contains(MaskFlags::PER_DATASET) {
            if band.flags.contains(MaskFlags::ALPHA) {
                if let Some(alpha) = self
                    .bands
                    .iter()
                    .find(|band| band.color_role == ColorRole::Alpha)
                {
                    let data = alpha.data.borrow();
                    return Ok(data
                        .chunks_exact(alpha.encoding.size())
                        .map(|pixel| alpha.encoding.decode_scalar(pixel).clamp(0., 255.) as u8)
                        .collect());
                }
            } else if let Some(mask) = &self.dataset_mask {
                return Ok(mask.clone());
            }
        }
        if let (true, Some(nodata)) = (band.flags.contains(MaskFlags::NODATA), band.nodata) {
            let data = band.data.borrow();
            let size = band.encoding.size();
            let nodata_bytes = band.encoding.encode_scalar(nodata);
            return Ok(data
                .chunks_exact(size)
                .map(|pixel| {
                    let invalid = if nodata.is_nan() {
                        band.encoding.decode_scalar(pixel).is_nan()
                    } else {
                        pixel == nodata_bytes.as_slice()
                    };
                    if invalid {
                        0
                    } else {
                        255
                    }
                })
                .collect());
        }
        Ok(vec![255; pixels])
    }

    /// Move `rect` of one stored plane to or from plane `plane` of `buffer`.
    fn plane_io(
        &self,
        stored: &mut [u8],
        size: usize,
        direction: Direction,
        rect: PixelRect,
        buffer: &mut RawBuffer<'_>,
        plane: usize,
    ) {
        let (rows, cols) = buffer.size();
        let (pixel_space, line_space) = (buffer.pixel_space(), buffer.line_space());
        let plane_offset = plane * buffer.band_space();
        trace!("plane {plane} of {rows}x{cols} <-> {rect:?}");
        for row in 0..rows {
            let src_row = rect.yoff + nearest(row, rows, rect.ysize);
            for col in 0..cols {
                let src_col = rect.xoff + nearest(col, cols, rect.xsize);
                let at = (src_row * self.width + src_col) * size;
                let to = plane_offset + row * line_space + col * pixel_space;
                match direction {
                    Direction::Read => {
                        buffer.bytes_mut()[to..to + size].copy_from_slice(&stored[at..at + size])
                    }
                    Direction::Write => {
                        stored[at..at + size].copy_from_slice(&buffer.bytes()[to..to + size])
                    }
                }
            }
        }
    }
}

/// Band or mask band handle of a [`MemDataset`].
#[derive(Debug, Clone, Copy)]
pub struct MemBandHandle<'a> {
    dataset: &'a MemDataset,
    index: usize,
    mask: bool,
}

impl NativeBand for MemBandHandle<'_> {
    fn raster_io(&self, direction: Direction, rect: PixelRect, mut buffer: RawBuffer<'_>) -> Result<()> {
        let dataset = self.dataset;
        dataset.begin_transfer()?;
        let band = dataset.band_ref(self.index)?;
        if self.mask {
            if direction == Direction::Write {
                return Err(RusterioError::Io {
                    code: NOT_SUPPORTED,
                    message: "mask bands are read only".to_string(),
                });
            }
            if buffer.encoding() != Encoding::UInt8 {
                return Err(RusterioError::Io {
                    code: NOT_SUPPORTED,
                    message: "mask bands are read as bytes".to_string(),
                });
            }
            dataset.check_rect(rect)?;
            let mut plane = dataset.mask_plane(self.index)?;
            dataset.plane_io(&mut plane, 1, direction, rect, &mut buffer, 0);
            return Ok(());
        }
        dataset.check_transfer(band, rect, &buffer)?;
        let mut stored = band.data.borrow_mut();
        dataset.plane_io(&mut stored, band.encoding.size(), direction, rect, &mut buffer, 0);
        Ok(())
    }
}

impl RasterDataset for MemDataset {
    type Band<'a> = MemBandHandle<'a>;

    fn count(&self) -> usize {
        self.bands.len()
    }

    fn height(&self) -> usize {
        self.height
    }

    fn width(&self) -> usize {
        self.width
    }

    fn encoding(&self, index: usize) -> Result<Encoding> {
        Ok(self.band_ref(index)?.encoding)
    }

    fn nodata(&self, index: usize) -> Result<Option<f64>> {
        Ok(self.band_ref(index)?.nodata)
    }

    fn mask_flags(&self, index: usize) -> Result<MaskFlags> {
        Ok(self.band_ref(index)?.flags)
    }

    fn color_role(&self, index: usize) -> Result<ColorRole> {
        Ok(self.band_ref(index)?.color_role)
    }

    fn band(&self, index: usize) -> Result<MemBandHandle<'_>> {
        if self.band_ref(index)?.null {
            return Err(RusterioError::NullBand { index });
        }
        Ok(MemBandHandle {
            dataset: self,
            index,
            mask: false,
        })
    }

    fn mask_band(&self, index: usize) -> Result<MemBandHandle<'_>> {
        if self.band_ref(index)?.null_mask {
            return Err(RusterioError::NullMaskBand { index });
        }
        Ok(MemBandHandle {
            dataset: self,
            index,
            mask: true,
        })
    }

    fn dataset_io(
        &self,
        direction: Direction,
        band_map: &[usize],
        rect: PixelRect,
        mut buffer: RawBuffer<'_>,
    ) -> Result<()> {
        self.begin_transfer()?;
        if band_map.len() != buffer.bands() {
            return Err(RusterioError::Io {
                code: ILLEGAL_ARG,
                message: format!("band map {band_map:?} does not match {} planes", buffer.bands()),
            });
        }
        for (plane, index) in band_map.iter().enumerate() {
            let band = self.band_ref(*index)?;
            if band.null {
                return Err(RusterioError::NullBand { index: *index });
            }
            self.check_transfer(band, rect, &buffer)?;
            let mut stored = band.data.borrow_mut();
            self.plane_io(&mut stored, band.encoding.size(), direction, rect, &mut buffer, plane);
        }
        Ok(())
    }
}
