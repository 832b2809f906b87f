use num::Complex;

use crate::{
    buffer::RasterData,
    components::{reader, writer, Encoding, RasterDataset, ReadOptions, Window},
    errors::{Result, RusterioError},
    indexes::Indexes,
};

macro_rules! any_raster {
    ($($encoding:ident => $t:ty),* $(,)?) => {
        /// Read result of any encoding, tagged with its element type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum AnyRaster {
            $($encoding(RasterData<$t>),)*
        }

        impl AnyRaster {
            pub fn encoding(&self) -> Encoding {
                match self {
                    $(AnyRaster::$encoding(_) => Encoding::$encoding,)*
                }
            }

            pub fn shape(&self) -> &[usize] {
                match self {
                    $(AnyRaster::$encoding(data) => data.shape(),)*
                }
            }

            pub fn is_masked(&self) -> bool {
                match self {
                    $(AnyRaster::$encoding(data) => data.is_masked(),)*
                }
            }

            pub(crate) fn read<D: RasterDataset>(
                dataset: &D,
                indexes: &Indexes,
                options: &ReadOptions,
            ) -> Result<Self> {
                let encoding = indexes.select_from(dataset)?.encoding(dataset)?;
                Ok(match encoding {
                    $(Encoding::$encoding => {
                        AnyRaster::$encoding(reader::read::<D, $t>(dataset, indexes, None, options)?)
                    })*
                })
            }

            pub(crate) fn write<D: RasterDataset>(
                &self,
                dataset: &D,
                indexes: &Indexes,
                window: Option<&Window>,
            ) -> Result<()> {
                match self {
                    $(AnyRaster::$encoding(data) => {
                        writer::write(dataset, &data.filled(), indexes, window)
                    })*
                }
            }
        }

        $(
            impl From<RasterData<$t>> for AnyRaster {
                fn from(value: RasterData<$t>) -> Self {
                    AnyRaster::$encoding(value)
                }
            }

            impl TryFrom<AnyRaster> for RasterData<$t> {
                type Error = RusterioError;

                fn try_from(value: AnyRaster) -> Result<Self> {
                    match value {
                        AnyRaster::$encoding(data) => Ok(data),
                        other => Err(RusterioError::EncodingMismatch {
                            expected: other.encoding(),
                            found: Encoding::$encoding,
                        }),
                    }
                }
            }
        )*
    };
}

any_raster!(
    UInt8 => u8,
    UInt16 => u16,
    Int16 => i16,
    UInt32 => u32,
    Int32 => i32,
    Float32 => f32,
    Float64 => f64,
    CInt16 => Complex<i16>,
    CInt32 => Complex<i32>,
    CFloat32 => Complex<f32>,
    CFloat64 => Complex<f64>,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::MemDataset,
        components::{RasterReader, RasterWriter},
    };
    use ndarray::{array, Array2, Array3};

    #[test]
    fn read_any_picks_band_encoding() {
        let mut dataset = MemDataset::from_array(Array3::<u16>::from_elem((1, 2, 2), 3));
        dataset.add_band(Array2::from_elem((2, 2), Complex::new(1f64, 2.))).unwrap();
        let first = dataset.read_any(1usize, &ReadOptions::default()).unwrap();
        assert_eq!(first.encoding(), Encoding::UInt16);
        assert_eq!(first.shape(), &[2, 2]);
        let second = dataset.read_any(2usize, &ReadOptions::default()).unwrap();
        let data = RasterData::<Complex<f64>>::try_from(second).unwrap();
        assert_eq!(data.into_array()[[1, 1]], Complex::new(1., 2.));
        assert!(dataset.read_any([1usize, 2], &ReadOptions::default()).is_err());
    }

    #[test]
    fn wrong_variant_is_rejected() {
        let raster = AnyRaster::from(RasterData::Array(array![1u8].into_dyn()));
        assert!(matches!(
            RasterData::<i16>::try_from(raster),
            Err(RusterioError::EncodingMismatch {
                expected: Encoding::UInt8,
                found: Encoding::Int16
            })
        ));
    }

    #[test]
    fn write_any_writes_filled_data() {
        let mut source = MemDataset::from_array(array![[[1i16, -5], [3, 4]]]);
        source.set_nodata(1, Some(-5.)).unwrap();
        let raster = source
            .read_any(1usize, &ReadOptions::default().masked(true))
            .unwrap();
        assert!(raster.is_masked());
        let target = MemDataset::from_array(Array3::<i16>::from_elem((1, 2, 2), 9));
        target.write_any(&raster, 1usize, None).unwrap();
        assert_eq!(target.band_array::<i16>(1).unwrap(), array![[1i16, -5], [3, 4]]);
    }
}
