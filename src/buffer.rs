use log::trace;
use ndarray::{Array3, ArrayD, Axis, Ix2, Ix3};
use rayon::prelude::*;

use crate::{
    components::Element,
    errors::{Result, RusterioError},
};

/// Pixels with an optional validity overlay.
///
/// `mask` is `true` where a pixel is invalid. `fill_value` is only set when
/// every band of the read shares one nodata value.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedArray<T> {
    pub data: ArrayD<T>,
    pub mask: Option<ArrayD<bool>>,
    pub fill_value: Option<T>,
}

impl<T: Element> MaskedArray<T> {
    /// Data with invalid pixels replaced by `fill_value`, or zero.
    pub fn filled(&self) -> ArrayD<T> {
        let fill = self.fill_value.unwrap_or_else(T::zero);
        match &self.mask {
            Some(mask) => {
                let mut data = self.data.clone();
                data.zip_mut_with(mask, |value, invalid| {
                    if *invalid {
                        *value = fill
                    }
                });
                data
            }
            None => self.data.clone(),
        }
    }
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData<T> {
    Array(ArrayD<T>),
    Masked(MaskedArray<T>),
}

impl<T: Element> RasterData<T> {
    pub fn data(&self) -> &ArrayD<T> {
        match self {
            RasterData::Array(data) => data,
            RasterData::Masked(masked) => &masked.data,
        }
    }

    /// Pixels, dropping any validity overlay.
    pub fn into_array(self) -> ArrayD<T> {
        match self {
            RasterData::Array(data) => data,
            RasterData::Masked(masked) => masked.data,
        }
    }

    pub fn mask(&self) -> Option<&ArrayD<bool>> {
        match self {
            RasterData::Array(_) => None,
            RasterData::Masked(masked) => masked.mask.as_ref(),
        }
    }

    pub fn fill_value(&self) -> Option<T> {
        match self {
            RasterData::Array(_) => None,
            RasterData::Masked(masked) => masked.fill_value,
        }
    }

    /// Whether a mask overlay is present.
    pub fn is_masked(&self) -> bool {
        self.mask().is_some()
    }

    pub fn filled(&self) -> ArrayD<T> {
        match self {
            RasterData::Array(data) => data.clone(),
            RasterData::Masked(masked) => masked.filled(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data().shape()
    }
}

impl<T> From<ArrayD<T>> for RasterData<T> {
    fn from(value: ArrayD<T>) -> Self {
        RasterData::Array(value)
    }
}

impl<T> From<MaskedArray<T>> for RasterData<T> {
    fn from(value: MaskedArray<T>) -> Self {
        RasterData::Masked(value)
    }
}

/// Set every plane of `buffer` to its fill value.
pub(crate) fn fill_bands<T: Element>(buffer: &mut Array3<T>, fills: &[T]) -> Result<()> {
    let (_, rows, cols) = buffer.dim();
    trace!("Filling {:?} with {fills:?}", buffer.dim());
    if rows * cols == 0 {
        return Ok(());
    }
    buffer
        .as_slice_mut()
        .ok_or(RusterioError::NonContiguousBuffer)?
        .par_chunks_mut(rows * cols)
        .zip(fills.par_iter())
        .for_each(|(plane, fill)| plane.fill(*fill));
    Ok(())
}

/// View a caller buffer of `bands` planes as band-major 3D: 2D buffers are
/// only accepted for a single band.
pub(crate) fn into_band_major<T>(buffer: ArrayD<T>, bands: usize) -> Result<Array3<T>> {
    let shape = buffer.shape().to_vec();
    let buffer = match buffer.ndim() {
        2 if bands == 1 => buffer
            .into_dimensionality::<Ix2>()?
            .insert_axis(Axis(0)),
        3 => buffer.into_dimensionality::<Ix3>()?,
        _ => {
            return Err(RusterioError::ShapeMismatch {
                expected: vec![bands],
                found: shape,
            })
        }
    };
    if buffer.dim().0 != bands {
        return Err(RusterioError::ShapeMismatch {
            expected: vec![bands],
            found: shape,
        });
    }
    if !buffer.is_standard_layout() {
        return Err(RusterioError::NonContiguousBuffer);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn filled_replaces_invalid_pixels() {
        let masked = MaskedArray {
            data: array![[1u16, 2], [3, 4]].into_dyn(),
            mask: Some(array![[false, true], [true, false]].into_dyn()),
            fill_value: Some(9),
        };
        assert_eq!(masked.filled(), array![[1u16, 9], [9, 4]].into_dyn());
        let data = RasterData::from(MaskedArray {
            fill_value: None,
            ..masked
        });
        assert!(data.is_masked());
        assert_eq!(data.filled(), array![[1u16, 0], [0, 4]].into_dyn());
        assert_eq!(data.into_array(), array![[1u16, 2], [3, 4]].into_dyn());
    }

    #[test]
    fn fill_per_band() {
        let mut buffer = Array3::<i32>::zeros((2, 3, 3));
        fill_bands(&mut buffer, &[-1, 7]).unwrap();
        assert!(buffer.index_axis(Axis(0), 0).iter().all(|v| *v == -1));
        assert!(buffer.index_axis(Axis(0), 1).iter().all(|v| *v == 7));
    }

    #[test]
    fn fill_rejects_non_contiguous() {
        let mut buffer = Array3::<i32>::zeros((2, 3, 2)).reversed_axes();
        assert!(matches!(
            fill_bands(&mut buffer, &[1, 2]),
            Err(RusterioError::NonContiguousBuffer)
        ));
        assert!(buffer.iter().all(|v| *v == 0));
    }

    #[test]
    fn band_major_accepts_2d_for_one_band() {
        let buffer = into_band_major(Array2::<u8>::zeros((3, 4)).into_dyn(), 1).unwrap();
        assert_eq!(buffer.dim(), (1, 3, 4));
        assert!(into_band_major(Array2::<u8>::zeros((3, 4)).into_dyn(), 2).is_err());
        assert!(matches!(
            into_band_major(Array3::<u8>::zeros((3, 4, 4)).into_dyn(), 2),
            Err(RusterioError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn band_major_rejects_transposed() {
        let buffer = Array3::<u8>::zeros((4, 3, 1)).reversed_axes().into_dyn();
        assert!(matches!(
            into_band_major(buffer, 1),
            Err(RusterioError::NonContiguousBuffer)
        ));
    }
}
