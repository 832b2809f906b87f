use itertools::Itertools;
use log::{debug, trace};
use ndarray::{s, Array2, Array3, ArrayD};
use serde::{Deserialize, Serialize};

use crate::{
    buffer::{fill_bands, into_band_major, MaskedArray, RasterData},
    components::{
        dispatch, mask,
        window::{self, Placement, Resolution},
        AnyRaster, Direction, Element, MaskFlags, PixelRect, RasterDataset, Window,
    },
    errors::{Result, RusterioError},
    indexes::Indexes,
};

/// Options of a pixel read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Pixels to read, the whole dataset when absent.
    pub window: Option<Window>,
    /// Attach a validity mask to the result.
    pub masked: bool,
    /// (rows, cols) of the result, decimating or replicating pixels.
    pub out_shape: Option<(usize, usize)>,
    /// Keep the window as requested, filling what lies outside the dataset.
    pub boundless: bool,
}

impl ReadOptions {
    pub fn window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    pub fn out_shape(mut self, out_shape: (usize, usize)) -> Self {
        self.out_shape = Some(out_shape);
        self
    }

    pub fn boundless(mut self, boundless: bool) -> Self {
        self.boundless = boundless;
        self
    }
}

/// Options of a validity-mask read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskOptions {
    pub window: Option<Window>,
    pub out_shape: Option<(usize, usize)>,
    pub boundless: bool,
}

impl MaskOptions {
    pub fn window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn out_shape(mut self, out_shape: (usize, usize)) -> Self {
        self.out_shape = Some(out_shape);
        self
    }

    pub fn boundless(mut self, boundless: bool) -> Self {
        self.boundless = boundless;
        self
    }
}

/// Run `native` for `placement` into `buffer`: directly when the block fills
/// the buffer, otherwise through a block-shaped temporary copied in at the
/// placement offset.
pub(crate) fn transfer_placed<E: Element>(
    placement: Placement,
    buffer: &mut Array3<E>,
    native: impl FnOnce(PixelRect, &mut Array3<E>) -> Result<()>,
) -> Result<()> {
    let (bands, rows, cols) = buffer.dim();
    if placement.covers((rows, cols)) {
        return native(placement.rect, buffer);
    }
    let (block_rows, block_cols) = placement.shape;
    let mut block = Array3::from_elem((bands, block_rows, block_cols), E::zero());
    native(placement.rect, &mut block)?;
    let (row, col) = placement.offset;
    trace!("Placing {:?} block at {:?} of {:?}", placement.shape, placement.offset, (rows, cols));
    buffer
        .slice_mut(s![.., row..row + block_rows, col..col + block_cols])
        .assign(&block);
    Ok(())
}

/// Identical nodata of all bands, compared bitwise so NaN matches NaN.
fn shared_nodata(nodatas: &[Option<f64>]) -> Option<f64> {
    nodatas
        .iter()
        .map(|nodata| nodata.map(f64::to_bits))
        .all_equal_value()
        .ok()
        .flatten()
        .map(f64::from_bits)
}

/// Invalid-pixel mask of a read whose validity needs no native transfer:
/// only pixels outside the placement are invalid.
fn placement_mask(bands: usize, out_shape: (usize, usize), placement: Option<Placement>) -> Option<Array3<bool>> {
    match placement {
        Some(placement) if placement.covers(out_shape) => None,
        Some(placement) => {
            let mut mask = Array3::from_elem((bands, out_shape.0, out_shape.1), true);
            let (row, col) = placement.offset;
            mask.slice_mut(s![.., row..row + placement.shape.0, col..col + placement.shape.1])
                .fill(false);
            Some(mask)
        }
        None => Some(Array3::from_elem((bands, out_shape.0, out_shape.1), true)),
    }
}

pub(crate) fn read<D: RasterDataset, T: Element>(
    dataset: &D,
    indexes: &Indexes,
    out: Option<ArrayD<T>>,
    options: &ReadOptions,
) -> Result<RasterData<T>> {
    if out.is_some() && options.out_shape.is_some() {
        return Err(RusterioError::OutAndOutShape);
    }
    let selection = indexes.select_from(dataset)?;
    let encoding = selection.encoding(dataset)?;
    if encoding != T::ENCODING {
        return Err(RusterioError::EncodingMismatch {
            expected: encoding,
            found: T::ENCODING,
        });
    }
    let nodatas = selection.nodatas(dataset)?;
    let fills: Vec<T> = nodatas.iter().map(|nodata| T::fill_value(*nodata)).collect();
    let resolution = window::resolve(
        options.window.as_ref(),
        dataset.height(),
        dataset.width(),
        options.boundless,
    )?;

    let (mut buffer, fresh) = match out {
        Some(out) => (into_band_major(out, selection.len())?, false),
        None => {
            let (rows, cols) = output_shape(&resolution, options.out_shape);
            (Array3::from_elem((selection.len(), rows, cols), T::zero()), true)
        }
    };
    let (_, rows, cols) = buffer.dim();
    let placement = resolution.placement((rows, cols));
    debug!(
        "Reading bands {:?} of {:?} into {:?}, placed {placement:?}",
        selection.indexes,
        resolution.window,
        buffer.dim()
    );
    if fresh || !placement.is_some_and(|placement| placement.covers((rows, cols))) {
        fill_bands(&mut buffer, &fills)?;
    }
    if let Some(placement) = placement {
        transfer_placed(placement, &mut buffer, |rect, block| {
            dispatch::io(dataset, Direction::Read, &selection.indexes, rect, block)
        })?;
    }

    if !options.masked {
        return Ok(RasterData::Array(selection.shape_result(buffer)));
    }
    let all_valid = selection
        .mask_flags(dataset)?
        .iter()
        .all(|flags| flags.contains(MaskFlags::ALL_VALID));
    let mask = if all_valid {
        placement_mask(selection.len(), (rows, cols), placement)
    } else {
        let validity = mask::validity(dataset, &selection.indexes, &resolution, (rows, cols))?;
        Some(validity.mapv(|valid| valid == 0))
    };
    Ok(RasterData::Masked(MaskedArray {
        data: selection.shape_result(buffer),
        mask: mask.map(|mask| selection.shape_result(mask)),
        fill_value: shared_nodata(&nodatas).map(|nodata| T::fill_value(Some(nodata))),
    }))
}

/// Natural shape of a read, or `out_shape` when given.
pub(crate) fn output_shape(resolution: &Resolution, out_shape: Option<(usize, usize)>) -> (usize, usize) {
    out_shape.unwrap_or(resolution.shape)
}

/// Reads pixels and validity masks of a [`RasterDataset`].
///
/// Band indexes are 1-based. A single index yields 2D arrays `(rows, cols)`,
/// lists yield 3D arrays `(bands, rows, cols)` in the order given.
pub trait RasterReader: RasterDataset + Sized {
    /// Read pixels of element type `T`, which must match the encoding of
    /// every selected band.
    ///
    /// ```
    /// use ndarray::Array3;
    /// use rusterio::{backends::MemDataset, ReadOptions, RasterReader, Window};
    ///
    /// let dataset = MemDataset::from_array(Array3::<u8>::ones((2, 10, 10)));
    /// let options = ReadOptions::default()
    ///     .window(Window::new((-2, 4), (0, 5)))
    ///     .boundless(true);
    /// let data = dataset.read::<u8>(2usize, &options).unwrap().into_array();
    /// assert_eq!(data.shape(), &[6, 5]);
    /// assert_eq!(data[[0, 0]], 0);
    /// assert_eq!(data[[2, 0]], 1);
    /// ```
    fn read<T: Element>(&self, indexes: impl Into<Indexes>, options: &ReadOptions) -> Result<RasterData<T>> {
        read(self, &indexes.into(), None, options)
    }

    /// Read into `out`, handing it back inside the result. Its spatial shape
    /// is the output shape, so `options.out_shape` must be unset.
    fn read_into<T: Element>(
        &self,
        indexes: impl Into<Indexes>,
        out: ArrayD<T>,
        options: &ReadOptions,
    ) -> Result<RasterData<T>> {
        read(self, &indexes.into(), Some(out), options)
    }

    /// Read with the element type picked from the bands' shared encoding.
    fn read_any(&self, indexes: impl Into<Indexes>, options: &ReadOptions) -> Result<AnyRaster> {
        AnyRaster::read(self, &indexes.into(), options)
    }

    /// Validity bytes of each band, `0` invalid and `255` valid.
    fn read_masks(&self, indexes: impl Into<Indexes>, options: &MaskOptions) -> Result<ArrayD<u8>> {
        mask::read_masks(self, &indexes.into(), options)
    }

    /// Validity of the dataset as a whole.
    fn dataset_mask(&self, options: &MaskOptions) -> Result<Array2<u8>> {
        mask::dataset_mask(self, options)
    }

    /// Whether nodata shadows the alpha band of an RGBA-like dataset in
    /// [`read_masks`](RasterReader::read_masks).
    fn nodata_shadows_alpha(&self) -> Result<bool> {
        mask::nodata_shadows_alpha(self)
    }
}

impl<D: RasterDataset> RasterReader for D {}
