//! Validity masks of bands and of whole datasets.
//!
//! Masks hold one byte per pixel, `0` for invalid and `255` for valid.
//! Pixels of a boundless request lying outside the dataset are invalid.

use log::{debug, warn};
use ndarray::{Array2, Array3, ArrayD, Axis, Ix2};

use crate::{
    components::{
        dispatch,
        reader::{output_shape, transfer_placed, MaskOptions},
        window::{self, Resolution},
        ColorRole, MaskFlags, RasterDataset,
    },
    errors::Result,
    indexes::Indexes,
};

/// Validity bytes of `indexes` for a resolved request, shaped
/// `(indexes.len(), out_shape.0, out_shape.1)`.
pub(crate) fn validity<D: RasterDataset>(
    dataset: &D,
    indexes: &[usize],
    resolution: &Resolution,
    out_shape: (usize, usize),
) -> Result<Array3<u8>> {
    let mut buffer = Array3::<u8>::zeros((indexes.len(), out_shape.0, out_shape.1));
    if let Some(placement) = resolution.placement(out_shape) {
        transfer_placed(placement, &mut buffer, |rect, block| {
            dispatch::masks_read(dataset, indexes, rect, block)
        })?;
    }
    Ok(buffer)
}

/// Whether a nodata value hides the alpha band of a 4-band dataset from
/// per-band masks.
pub(crate) fn nodata_shadows_alpha<D: RasterDataset>(dataset: &D) -> Result<bool> {
    if dataset.count() != 4 || dataset.color_role(4)? != ColorRole::Alpha {
        return Ok(false);
    }
    for index in dataset.indexes() {
        if dataset.nodata(index)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn read_masks<D: RasterDataset>(
    dataset: &D,
    indexes: &Indexes,
    options: &MaskOptions,
) -> Result<ArrayD<u8>> {
    let selection = indexes.select_from(dataset)?;
    if nodata_shadows_alpha(dataset)? {
        warn!("Nodata is set on a dataset with an alpha band; band masks follow nodata, not alpha");
    }
    let resolution = window::resolve(
        options.window.as_ref(),
        dataset.height(),
        dataset.width(),
        options.boundless,
    )?;
    let out_shape = output_shape(&resolution, options.out_shape);
    let masks = validity(dataset, &selection.indexes, &resolution, out_shape)?;
    Ok(selection.shape_result(masks))
}

fn single_mask<D: RasterDataset>(dataset: &D, index: usize, options: &MaskOptions) -> Result<Array2<u8>> {
    Ok(read_masks(dataset, &Indexes::One(index), options)?.into_dimensionality::<Ix2>()?)
}

pub(crate) fn dataset_mask<D: RasterDataset>(dataset: &D, options: &MaskOptions) -> Result<Array2<u8>> {
    if dataset.mask_flags(1)?.contains(MaskFlags::PER_DATASET) {
        debug!("Dataset mask from the per-dataset mask of band 1");
        return single_mask(dataset, 1, options);
    }
    if dataset.count() == 4 && dataset.color_role(1)? == ColorRole::Red {
        debug!("Dataset mask from the alpha band");
        return single_mask(dataset, 4, options);
    }
    debug!("Dataset mask from the union of band masks");
    let masks = read_masks(dataset, &Indexes::All, options)?;
    let union = masks
        .fold_axis(Axis(0), 0u8, |valid, mask| valid | mask)
        .mapv(|valid| if valid > 0 { 255 } else { 0 });
    Ok(union.into_dimensionality::<Ix2>()?)
}
