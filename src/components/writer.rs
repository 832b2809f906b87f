use log::debug;
use ndarray::{ArrayBase, Data, Dimension};

use crate::{
    components::{dispatch, window, AnyRaster, Direction, Element, RasterDataset, Window},
    errors::{Result, RusterioError},
    indexes::Indexes,
};

pub(crate) fn write<D, T, S, Dm>(
    dataset: &D,
    data: &ArrayBase<S, Dm>,
    indexes: &Indexes,
    window: Option<&Window>,
) -> Result<()>
where
    D: RasterDataset,
    T: Element,
    S: Data<Elem = T>,
    Dm: Dimension,
{
    let selection = indexes.select_from(dataset)?;
    let encoding = selection.encoding(dataset)?;
    if encoding != T::ENCODING {
        return Err(RusterioError::EncodingMismatch {
            expected: encoding,
            found: T::ENCODING,
        });
    }
    let resolution = window::resolve(window, dataset.height(), dataset.width(), false)?;
    let (rows, cols) = resolution.shape;
    let bands = selection.len();
    let accepted = match data.shape() {
        [r, c] => selection.squeeze && (*r, *c) == (rows, cols),
        [b, r, c] => (*b, *r, *c) == (bands, rows, cols),
        _ => false,
    };
    if !accepted {
        let expected = if selection.squeeze {
            vec![rows, cols]
        } else {
            vec![bands, rows, cols]
        };
        return Err(RusterioError::ShapeMismatch {
            expected,
            found: data.shape().to_vec(),
        });
    }
    if rows * cols == 0 {
        debug!("Nothing to write in {:?}", resolution.window);
        return Ok(());
    }
    let mut buffer = data
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((bands, rows, cols))?;
    let rect = resolution.window.to_rect()?;
    debug!("Writing bands {:?} to {rect:?}", selection.indexes);
    dispatch::io(dataset, Direction::Write, &selection.indexes, rect, &mut buffer)
}

/// Writes pixels into a [`RasterDataset`].
///
/// The array's element type must match the encoding of every target band and
/// its shape the clipped window: `(rows, cols)` for a single index,
/// `(bands, rows, cols)` otherwise. Plane `i` is written to `indexes[i]`.
pub trait RasterWriter: RasterDataset + Sized {
    fn write<T, S, Dm>(
        &self,
        data: &ArrayBase<S, Dm>,
        indexes: impl Into<Indexes>,
        window: Option<&Window>,
    ) -> Result<()>
    where
        T: Element,
        S: Data<Elem = T>,
        Dm: Dimension,
    {
        write(self, data, &indexes.into(), window)
    }

    /// Write a dynamically typed raster, with masked pixels filled.
    fn write_any(&self, data: &AnyRaster, indexes: impl Into<Indexes>, window: Option<&Window>) -> Result<()> {
        data.write(self, &indexes.into(), window)
    }
}

impl<D: RasterDataset> RasterWriter for D {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::MemDataset,
        components::{Encoding, RasterReader, ReadOptions},
    };
    use ndarray::{array, s, Array2, Array3, Axis};
    use num::Complex;
    use rstest::rstest;

    fn round_trip<T: Element>(values: Array3<T>) {
        let dataset = MemDataset::from_array(Array3::from_elem(values.dim(), T::zero()));
        let (bands, rows, cols) = values.dim();
        let window = Window::new((1, rows as isize - 1), (2, cols as isize));
        let block = values.slice(s![.., 1..rows - 1, 2..]).to_owned();
        let indexes: Vec<usize> = (1..=bands).collect();
        dataset.write(&block, indexes.clone(), Some(&window)).unwrap();
        let options = ReadOptions::default().window(window);
        let read = dataset.read::<T>(indexes.clone(), &options).unwrap().into_array();
        assert_eq!(read, block.clone().into_dyn());
        dataset.write(&read, indexes.clone(), Some(&window)).unwrap();
        let again = dataset.read::<T>(indexes, &options).unwrap().into_array();
        assert_eq!(again, block.into_dyn());
    }

    #[test_log::test]
    fn every_encoding_round_trips() {
        let shape = (2, 5, 6);
        let at = |(b, r, c): (usize, usize, usize)| (b * 30 + r * 6 + c) as i32;
        round_trip(Array3::from_shape_fn(shape, |i| at(i) as u8));
        round_trip(Array3::from_shape_fn(shape, |i| at(i) as u16 * 300));
        round_trip(Array3::from_shape_fn(shape, |i| -(at(i) as i16)));
        round_trip(Array3::from_shape_fn(shape, |i| at(i) as u32 * 70_000));
        round_trip(Array3::from_shape_fn(shape, |i| -at(i) * 70_000));
        round_trip(Array3::from_shape_fn(shape, |i| at(i) as f32 / 3.));
        round_trip(Array3::from_shape_fn(shape, |i| at(i) as f64 / 7.));
        round_trip(Array3::from_shape_fn(shape, |i| {
            Complex::new(at(i) as i16, -(at(i) as i16))
        }));
        round_trip(Array3::from_shape_fn(shape, |i| Complex::new(at(i), at(i) * 2)));
        round_trip(Array3::from_shape_fn(shape, |i| {
            Complex::new(at(i) as f32, 0.5)
        }));
        round_trip(Array3::from_shape_fn(shape, |i| {
            Complex::new(-1.25, at(i) as f64)
        }));
    }

    #[test_log::test]
    fn band_map_follows_index_order() {
        let dataset = MemDataset::from_array(Array3::<u16>::zeros((3, 2, 2)));
        let data = array![[[1u16, 1], [1, 1]], [[2, 2], [2, 2]]];
        dataset.write(&data, [3usize, 1], None).unwrap();
        assert_eq!(dataset.band_array::<u16>(3).unwrap(), data.index_axis(Axis(0), 0));
        assert_eq!(dataset.band_array::<u16>(1).unwrap(), data.index_axis(Axis(0), 1));
        assert_eq!(dataset.band_array::<u16>(2).unwrap(), Array2::<u16>::zeros((2, 2)));
        assert_eq!(dataset.transfer_count(), 1);

        dataset.reset_transfer_count();
        let read = dataset.read::<u16>([3usize, 1], &ReadOptions::default()).unwrap();
        assert_eq!(read.into_array(), data.into_dyn());
        assert_eq!(dataset.transfer_count(), 1);
    }

    #[test_log::test]
    fn single_index_takes_2d() {
        let dataset = MemDataset::from_array(Array3::<f32>::zeros((2, 3, 3)));
        let window = Window::new((1, 3), (0, 2));
        dataset
            .write(&array![[1f32, 2.], [3., 4.]], 2usize, Some(&window))
            .unwrap();
        assert_eq!(
            dataset.band_array::<f32>(2).unwrap(),
            array![[0f32, 0., 0.], [1., 2., 0.], [3., 4., 0.]]
        );
    }

    #[test_log::test]
    fn transposed_data_is_written_in_logical_order() {
        let dataset = MemDataset::from_array(Array3::<i32>::zeros((1, 2, 3)));
        let data = array![[1, 4], [2, 5], [3, 6]].reversed_axes();
        dataset.write(&data, 1usize, None).unwrap();
        assert_eq!(dataset.band_array::<i32>(1).unwrap(), array![[1, 2, 3], [4, 5, 6]]);
    }

    #[test_log::test]
    fn window_is_clipped_before_shape_check() {
        let dataset = MemDataset::from_array(Array3::<u8>::zeros((1, 3, 3)));
        let window = Window::new((2, 10), (-4, 1));
        dataset.write(&array![[9u8]], 1usize, Some(&window)).unwrap();
        assert_eq!(dataset.band_array::<u8>(1).unwrap()[[2, 0]], 9);
    }

    #[rstest]
    #[case(Array2::<u8>::zeros((3, 2)).into_dyn(), 1usize.into())]
    #[case(Array3::<u8>::zeros((2, 3, 2)).into_dyn(), [1usize, 2].into())]
    #[case(Array2::<u8>::zeros((3, 3)).into_dyn(), [1usize, 2].into())]
    fn shape_must_match(#[case] data: ndarray::ArrayD<u8>, #[case] indexes: Indexes) {
        let dataset = MemDataset::from_array(Array3::<u8>::zeros((2, 3, 3)));
        let err = dataset.write(&data, indexes, None).unwrap_err();
        assert!(matches!(err, RusterioError::ShapeMismatch { .. }));
        assert_eq!(dataset.transfer_count(), 0);
    }

    #[test_log::test]
    fn encoding_must_match() {
        let dataset = MemDataset::from_array(Array3::<i16>::zeros((1, 2, 2)));
        let err = dataset
            .write(&Array2::<u16>::zeros((2, 2)), 1usize, None)
            .unwrap_err();
        assert!(matches!(
            err,
            RusterioError::EncodingMismatch {
                expected: Encoding::Int16,
                found: Encoding::UInt16
            }
        ));
    }

    #[test_log::test]
    fn empty_indexes_are_rejected() {
        let dataset = MemDataset::from_array(Array3::<u8>::zeros((1, 2, 2)));
        let err = dataset
            .write(&Array3::<u8>::zeros((0, 2, 2)), Vec::<usize>::new(), None)
            .unwrap_err();
        assert!(matches!(err, RusterioError::EmptyIndexes));
    }

    #[test_log::test]
    fn clamped_nodata_is_written() {
        let mut dataset = MemDataset::from_array(Array3::<u8>::zeros((1, 2, 2)));
        dataset.set_nodata(1, Some(300.)).unwrap();
        let fill = u8::fill_value(dataset.nodata(1).unwrap());
        dataset
            .write(&Array2::from_elem((2, 2), fill), 1usize, None)
            .unwrap();
        let mask = dataset
            .read_masks(1usize, &crate::components::MaskOptions::default())
            .unwrap();
        assert!(mask.iter().all(|v| *v == 0));
    }
}
