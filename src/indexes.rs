use std::ops::{Range, RangeInclusive};

use itertools::Itertools;
use ndarray::{Array3, ArrayD, Axis};

use crate::{
    components::{Encoding, MaskFlags, RasterDataset},
    errors::{Result, RusterioError},
};

/// Selection of 1-based band indexes.
///
/// A single index yields 2D results, any list yields 3D results with bands
/// in the given order.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum Indexes {
    One(usize),
    Many(Vec<usize>),
    All,
}

impl From<usize> for Indexes {
    fn from(value: usize) -> Self {
        Indexes::One(value)
    }
}

impl<const N: usize> From<[usize; N]> for Indexes {
    fn from(value: [usize; N]) -> Self {
        Indexes::Many(value.to_vec())
    }
}

impl From<&[usize]> for Indexes {
    fn from(value: &[usize]) -> Self {
        Indexes::Many(value.to_vec())
    }
}

impl From<Vec<usize>> for Indexes {
    fn from(value: Vec<usize>) -> Self {
        Indexes::Many(value)
    }
}

impl From<Range<usize>> for Indexes {
    fn from(value: Range<usize>) -> Self {
        Indexes::Many(value.collect())
    }
}

impl From<RangeInclusive<usize>> for Indexes {
    fn from(value: RangeInclusive<usize>) -> Self {
        Indexes::Many(value.collect())
    }
}

impl Indexes {
    pub fn all() -> Self {
        Indexes::All
    }

    /// Index list for a dataset of `count` bands, and whether results are
    /// squeezed to 2D.
    pub fn indexes_from(&self, count: usize) -> (Vec<usize>, bool) {
        match self {
            Indexes::One(index) => (vec![*index], true),
            Indexes::Many(indexes) => (indexes.clone(), false),
            Indexes::All => ((1..=count).collect(), false),
        }
    }

    /// Validate against `dataset`: the list must be non-empty and every index
    /// a band of the dataset.
    pub(crate) fn select_from<D: RasterDataset>(&self, dataset: &D) -> Result<Selection> {
        let count = dataset.count();
        let (indexes, squeeze) = self.indexes_from(count);
        if indexes.is_empty() {
            return Err(RusterioError::EmptyIndexes);
        }
        if let Some(&index) = indexes.iter().find(|index| !(1..=count).contains(*index)) {
            return Err(RusterioError::BandIndexOutOfRange { index, count });
        }
        Ok(Selection { indexes, squeeze })
    }
}

/// Validated band selection of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selection {
    pub indexes: Vec<usize>,
    pub squeeze: bool,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// The one encoding shared by all selected bands.
    pub fn encoding<D: RasterDataset>(&self, dataset: &D) -> Result<Encoding> {
        let encodings: Vec<Encoding> = self
            .indexes
            .iter()
            .map(|index| dataset.encoding(*index))
            .process_results(|encodings| encodings.unique().collect())?;
        match encodings.as_slice() {
            [encoding] => Ok(*encoding),
            _ => Err(RusterioError::MixedEncodings(encodings)),
        }
    }

    pub fn nodatas<D: RasterDataset>(&self, dataset: &D) -> Result<Vec<Option<f64>>> {
        self.indexes
            .iter()
            .map(|index| dataset.nodata(*index))
            .collect()
    }

    pub fn mask_flags<D: RasterDataset>(&self, dataset: &D) -> Result<Vec<MaskFlags>> {
        self.indexes
            .iter()
            .map(|index| dataset.mask_flags(*index))
            .collect()
    }

    /// Drop the band axis when a single index was requested.
    pub fn shape_result<A>(&self, array: Array3<A>) -> ArrayD<A> {
        let array = array.into_dyn();
        if self.squeeze {
            array.index_axis_move(Axis(0), 0)
        } else {
            array
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemDataset;
    use ndarray::Array3;
    use rstest::rstest;

    fn dataset() -> MemDataset {
        MemDataset::from_array(Array3::<u8>::zeros((3, 2, 2)))
    }

    #[rstest]
    #[case(Indexes::from(2usize), vec![2], true)]
    #[case(Indexes::from([3usize, 1]), vec![3, 1], false)]
    #[case(Indexes::from(1usize..3), vec![1, 2], false)]
    #[case(Indexes::all(), vec![1, 2, 3], false)]
    fn resolves_indexes(#[case] indexes: Indexes, #[case] expected: Vec<usize>, #[case] squeeze: bool) {
        let selection = indexes.select_from(&dataset()).unwrap();
        assert_eq!(selection.indexes, expected);
        assert_eq!(selection.squeeze, squeeze);
    }

    #[test]
    fn empty_indexes_are_rejected() {
        let err = Indexes::from(Vec::<usize>::new()).select_from(&dataset()).unwrap_err();
        assert!(matches!(err, RusterioError::EmptyIndexes));
        assert!(err.is_invalid_request());
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    fn out_of_range_indexes_are_rejected(#[case] index: usize) {
        let err = Indexes::from([1usize, index]).select_from(&dataset()).unwrap_err();
        assert!(matches!(
            err,
            RusterioError::BandIndexOutOfRange { index: i, count: 3 } if i == index
        ));
    }

    #[test]
    fn mixed_encodings_are_rejected() {
        let mut dataset = dataset();
        dataset.add_band(ndarray::Array2::<f32>::zeros((2, 2))).unwrap();
        let selection = Indexes::from([1usize, 4]).select_from(&dataset).unwrap();
        assert!(matches!(
            selection.encoding(&dataset),
            Err(RusterioError::MixedEncodings(encodings))
                if encodings == vec![Encoding::UInt8, Encoding::Float32]
        ));
        let selection = Indexes::from([1usize, 2]).select_from(&dataset).unwrap();
        assert_eq!(selection.encoding(&dataset).unwrap(), Encoding::UInt8);
    }
}
