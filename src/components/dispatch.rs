//! Typed transfers between ndarray buffers and the native layer.
//!
//! Real encodings are handed to the native layer in place. Complex encodings
//! go through a component buffer twice as wide, holding interleaved
//! real/imaginary pairs, which is (de)interleaved on this side of the call.

use log::debug;
use ndarray::Array3;
use num_traits::Zero;
use rayon::prelude::*;
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::{Direction, Element, Encoding, NativeBand, PixelRect, RasterDataset, RawBuffer},
    errors::{Result, RusterioError},
};

/// Ordered band indexes of one interleaved transfer. Plane `i` of the
/// buffer maps to band `self[i]`.
#[derive(Shrinkwrap, Debug, Clone, PartialEq, Eq)]
pub struct BandMap(Vec<usize>);

impl From<&[usize]> for BandMap {
    fn from(value: &[usize]) -> Self {
        Self(value.to_vec())
    }
}

/// Run `native` over the native bytes of `buffer`, holding `bands` planes of
/// `rows * cols` elements.
fn transfer<T: Element>(
    direction: Direction,
    buffer: &mut [T],
    (bands, rows, cols): (usize, usize, usize),
    native: impl FnOnce(RawBuffer<'_>) -> Result<()>,
) -> Result<()> {
    match T::native_bytes(buffer) {
        Some(bytes) => native(RawBuffer::new(bytes, T::ENCODING, bands, rows, cols)?),
        None => {
            let mut parts = vec![T::Component::zero(); buffer.len() * 2];
            if direction == Direction::Write {
                interleave(buffer, &mut parts);
            }
            native(RawBuffer::new(
                bytemuck::cast_slice_mut(parts.as_mut_slice()),
                T::ENCODING,
                bands,
                rows,
                cols,
            )?)?;
            if direction == Direction::Read {
                deinterleave(&parts, buffer);
            }
            Ok(())
        }
    }
}

fn interleave<T: Element>(values: &[T], parts: &mut [T::Component]) {
    parts
        .par_chunks_exact_mut(2)
        .zip(values.par_iter())
        .for_each(|(pair, value)| {
            let (re, im) = value.parts();
            pair[0] = re;
            pair[1] = im;
        });
}

fn deinterleave<T: Element>(parts: &[T::Component], values: &mut [T]) {
    values
        .par_iter_mut()
        .zip(parts.par_chunks_exact(2))
        .for_each(|(value, pair)| *value = T::from_parts(pair[0], pair[1]));
}

fn contiguous<T>(buffer: &mut Array3<T>) -> Result<(&mut [T], (usize, usize, usize))> {
    let dim = buffer.dim();
    let slice = buffer
        .as_slice_mut()
        .ok_or(RusterioError::NonContiguousBuffer)?;
    Ok((slice, dim))
}

/// Transfer one band through its own native handle. `buffer` has a single
/// plane.
pub fn band_io<D: RasterDataset, T: Element>(
    dataset: &D,
    direction: Direction,
    index: usize,
    rect: PixelRect,
    buffer: &mut Array3<T>,
) -> Result<()> {
    let (slice, dim) = contiguous(buffer)?;
    debug!("{direction:?} band {index} {rect:?} as {} into {dim:?}", T::ENCODING);
    let band = dataset.band(index)?;
    transfer(direction, slice, dim, |raw| band.raster_io(direction, rect, raw))
}

/// Transfer all bands of `band_map` in one interleaved native call.
pub fn bands_io<D: RasterDataset, T: Element>(
    dataset: &D,
    direction: Direction,
    band_map: &BandMap,
    rect: PixelRect,
    buffer: &mut Array3<T>,
) -> Result<()> {
    let (slice, dim) = contiguous(buffer)?;
    debug!("{direction:?} bands {band_map:?} {rect:?} as {} into {dim:?}", T::ENCODING);
    if band_map.len() != dim.0 {
        return Err(RusterioError::ShapeMismatch {
            expected: vec![band_map.len()],
            found: vec![dim.0],
        });
    }
    transfer(direction, slice, dim, |raw| {
        dataset.dataset_io(direction, band_map, rect, raw)
    })
}

/// Single-band handle for one index, interleaved call for several.
pub fn io<D: RasterDataset, T: Element>(
    dataset: &D,
    direction: Direction,
    indexes: &[usize],
    rect: PixelRect,
    buffer: &mut Array3<T>,
) -> Result<()> {
    match indexes {
        [index] => band_io(dataset, direction, *index, rect, buffer),
        _ => bands_io(dataset, direction, &BandMap::from(indexes), rect, buffer),
    }
}

/// Read the validity bytes of each band's mask band into the matching plane
/// of `buffer`.
pub fn masks_read<D: RasterDataset>(
    dataset: &D,
    indexes: &[usize],
    rect: PixelRect,
    buffer: &mut Array3<u8>,
) -> Result<()> {
    let (slice, (bands, rows, cols)) = contiguous(buffer)?;
    debug!("Read masks {indexes:?} {rect:?} into {:?}", (bands, rows, cols));
    if indexes.len() != bands {
        return Err(RusterioError::ShapeMismatch {
            expected: vec![indexes.len()],
            found: vec![bands],
        });
    }
    if rows * cols == 0 {
        return Ok(());
    }
    for (index, plane) in indexes.iter().zip(slice.chunks_exact_mut(rows * cols)) {
        dataset.band(*index)?;
        let mask = dataset.mask_band(*index)?;
        mask.raster_io(
            Direction::Read,
            rect,
            RawBuffer::new(plane, Encoding::UInt8, 1, rows, cols)?,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemDataset;
    use ndarray::{s, Array2};
    use num::Complex;

    fn ramp<T: Element>(bands: usize, convert: impl Fn(usize) -> T) -> MemDataset {
        MemDataset::from_array(Array3::from_shape_fn((bands, 4, 5), |(b, r, c)| {
            convert(b * 100 + r * 10 + c)
        }))
    }

    #[test]
    fn single_band_read() {
        let dataset = ramp(2, |v| v as u16);
        let mut buffer = Array3::<u16>::zeros((1, 2, 3));
        band_io(
            &dataset,
            Direction::Read,
            2,
            PixelRect::new((1, 2), (3, 2)),
            &mut buffer,
        )
        .unwrap();
        assert_eq!(
            buffer.slice(s![0, .., ..]),
            Array2::from_shape_vec((2, 3), vec![121, 122, 123, 131, 132, 133]).unwrap()
        );
        assert_eq!(dataset.transfer_count(), 1);
    }

    #[test]
    fn band_map_keeps_order() {
        let dataset = ramp(3, |v| v as i32);
        let mut buffer = Array3::<i32>::zeros((2, 4, 5));
        bands_io(
            &dataset,
            Direction::Read,
            &BandMap::from(&[3, 1][..]),
            PixelRect::new((0, 0), (5, 4)),
            &mut buffer,
        )
        .unwrap();
        assert_eq!(buffer[[0, 1, 1]], 211);
        assert_eq!(buffer[[1, 1, 1]], 11);
        assert_eq!(dataset.transfer_count(), 1);
    }

    #[test]
    fn complex_read_deinterleaves() {
        let dataset = MemDataset::from_array(Array3::from_shape_fn((1, 2, 2), |(_, r, c)| {
            Complex::new((r * 2 + c) as i16, -((r * 2 + c) as i16))
        }));
        let mut buffer = Array3::<Complex<i16>>::zeros((1, 2, 2));
        band_io(
            &dataset,
            Direction::Read,
            1,
            PixelRect::new((0, 0), (2, 2)),
            &mut buffer,
        )
        .unwrap();
        assert_eq!(buffer[[0, 1, 1]], Complex::new(3, -3));
        assert_eq!(buffer[[0, 0, 1]], Complex::new(1, -1));
    }

    #[test]
    fn complex_write_interleaves() {
        let dataset = MemDataset::from_array(Array3::<Complex<f64>>::zeros((1, 2, 2)));
        let mut buffer = Array3::from_elem((1, 1, 2), Complex::new(1.5, 2.5));
        band_io(
            &dataset,
            Direction::Write,
            1,
            PixelRect::new((0, 1), (2, 1)),
            &mut buffer,
        )
        .unwrap();
        let band = dataset.band_array::<Complex<f64>>(1).unwrap();
        assert_eq!(band[[1, 0]], Complex::new(1.5, 2.5));
        assert_eq!(band[[0, 0]], Complex::new(0., 0.));
    }

    #[test]
    fn native_failure_is_reported_once() {
        let mut dataset = ramp(1, |v| v as f32);
        dataset.set_failure(Some(3));
        let mut buffer = Array3::<f32>::zeros((1, 4, 5));
        let err = band_io(
            &dataset,
            Direction::Read,
            1,
            PixelRect::new((0, 0), (5, 4)),
            &mut buffer,
        )
        .unwrap_err();
        assert!(matches!(err, RusterioError::Io { code: 3, .. }));
        assert_eq!(dataset.transfer_count(), 1);
    }

    #[test]
    fn null_band_is_fatal() {
        let mut dataset = ramp(2, |v| v as u8);
        dataset.set_null_band(2, true).unwrap();
        let mut buffer = Array3::<u8>::zeros((2, 4, 5));
        let err = io(
            &dataset,
            Direction::Read,
            &[1, 2],
            PixelRect::new((0, 0), (5, 4)),
            &mut buffer,
        )
        .unwrap_err();
        assert!(matches!(err, RusterioError::NullBand { index: 2 }));
    }

    #[test]
    fn null_mask_band_is_fatal() {
        let mut dataset = ramp(2, |v| v as u8);
        dataset.set_null_mask_band(1, true).unwrap();
        let mut buffer = Array3::<u8>::zeros((2, 4, 5));
        let err = masks_read(&dataset, &[2, 1], PixelRect::new((0, 0), (5, 4)), &mut buffer)
            .unwrap_err();
        assert!(matches!(err, RusterioError::NullMaskBand { index: 1 }));
    }

    #[test]
    fn non_contiguous_buffer_is_rejected() {
        let dataset = ramp(1, |v| v as u8);
        let mut buffer = Array3::<u8>::zeros((4, 5, 1));
        buffer.swap_axes(0, 2);
        let err = band_io(
            &dataset,
            Direction::Read,
            1,
            PixelRect::new((0, 0), (4, 5)),
            &mut buffer,
        )
        .unwrap_err();
        assert!(matches!(err, RusterioError::NonContiguousBuffer));
    }
}
