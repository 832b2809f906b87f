use std::{ffi::CStr, marker::PhantomData, os::raw::c_int, path::Path, ptr};

use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use gdal_sys::{
    CPLErr, GDALColorInterp, GDALDataType, GDALRWFlag, GDALRasterBandH, GSpacing,
};
use log::debug;

use crate::{
    components::{
        ColorRole, Direction, Encoding, MaskFlags, NativeBand, PixelRect, RasterDataset, RawBuffer,
    },
    errors::{Result, RusterioError},
};

/// Take the last CPL error, clearing it.
fn last_cpl_err() -> RusterioError {
    let code = unsafe { gdal_sys::CPLGetLastErrorNo() };
    let message = unsafe {
        let message = gdal_sys::CPLGetLastErrorMsg();
        if message.is_null() {
            String::new()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    };
    unsafe { gdal_sys::CPLErrorReset() };
    RusterioError::Io { code, message }
}

fn rw_flag(direction: Direction) -> GDALRWFlag::Type {
    match direction {
        Direction::Read => GDALRWFlag::GF_Read,
        Direction::Write => GDALRWFlag::GF_Write,
    }
}

fn gdal_type(encoding: Encoding) -> GDALDataType::Type {
    match encoding {
        Encoding::UInt8 => GDALDataType::GDT_Byte,
        Encoding::UInt16 => GDALDataType::GDT_UInt16,
        Encoding::Int16 => GDALDataType::GDT_Int16,
        Encoding::UInt32 => GDALDataType::GDT_UInt32,
        Encoding::Int32 => GDALDataType::GDT_Int32,
        Encoding::Float32 => GDALDataType::GDT_Float32,
        Encoding::Float64 => GDALDataType::GDT_Float64,
        Encoding::CInt16 => GDALDataType::GDT_CInt16,
        Encoding::CInt32 => GDALDataType::GDT_CInt32,
        Encoding::CFloat32 => GDALDataType::GDT_CFloat32,
        Encoding::CFloat64 => GDALDataType::GDT_CFloat64,
    }
}

fn encoding_from(data_type: GDALDataType::Type) -> Result<Encoding> {
    Encoding::ALL
        .iter()
        .copied()
        .find(|encoding| gdal_type(*encoding) == data_type)
        .ok_or_else(|| {
            let name = unsafe { gdal_sys::GDALGetDataTypeName(data_type) };
            let name = if name.is_null() {
                format!("GDAL data type {data_type}")
            } else {
                unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
            };
            RusterioError::UnsupportedEncoding(name)
        })
}

/// Raster dataset opened through GDAL.
#[derive(Debug)]
pub struct GdalRaster {
    dataset: Dataset,
}

impl From<Dataset> for GdalRaster {
    fn from(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

impl GdalRaster {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    /// Open read only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Dataset::open(path)?))
    }

    /// Open for reading and writing.
    pub fn open_update<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };
        Ok(Self::new(Dataset::open_ex(path, options)?))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn into_inner(self) -> Dataset {
        self.dataset
    }

    fn raster_band(&self, index: usize) -> Result<GdalBand<'_>> {
        let count = self.count();
        if !(1..=count).contains(&index) {
            return Err(RusterioError::BandIndexOutOfRange { index, count });
        }
        let handle = unsafe { gdal_sys::GDALGetRasterBand(self.dataset.c_dataset(), index as c_int) };
        if handle.is_null() {
            return Err(RusterioError::NullBand { index });
        }
        Ok(GdalBand {
            handle,
            _dataset: PhantomData,
        })
    }
}

/// Band or mask band handle, valid while its dataset is borrowed.
#[derive(Debug, Clone, Copy)]
pub struct GdalBand<'a> {
    handle: GDALRasterBandH,
    _dataset: PhantomData<&'a Dataset>,
}

impl NativeBand for GdalBand<'_> {
    fn raster_io(&self, direction: Direction, rect: PixelRect, mut buffer: RawBuffer<'_>) -> Result<()> {
        let (rows, cols) = buffer.size();
        let rv = unsafe {
            gdal_sys::GDALRasterIOEx(
                self.handle,
                rw_flag(direction),
                rect.xoff as c_int,
                rect.yoff as c_int,
                rect.xsize as c_int,
                rect.ysize as c_int,
                buffer.bytes_mut().as_mut_ptr().cast(),
                cols as c_int,
                rows as c_int,
                gdal_type(buffer.encoding()),
                buffer.pixel_space() as GSpacing,
                buffer.line_space() as GSpacing,
                ptr::null_mut(),
            )
        };
        if rv != CPLErr::CE_None {
            return Err(last_cpl_err());
        }
        Ok(())
    }
}

impl RasterDataset for GdalRaster {
    type Band<'a> = GdalBand<'a>;

    fn count(&self) -> usize {
        self.dataset.raster_count() as usize
    }

    fn height(&self) -> usize {
        self.dataset.raster_size().1
    }

    fn width(&self) -> usize {
        self.dataset.raster_size().0
    }

    fn encoding(&self, index: usize) -> Result<Encoding> {
        let band = self.raster_band(index)?;
        encoding_from(unsafe { gdal_sys::GDALGetRasterDataType(band.handle) })
    }

    fn nodata(&self, index: usize) -> Result<Option<f64>> {
        let band = self.raster_band(index)?;
        let mut success: c_int = 0;
        let nodata = unsafe { gdal_sys::GDALGetRasterNoDataValue(band.handle, &mut success) };
        Ok((success != 0).then_some(nodata))
    }

    fn mask_flags(&self, index: usize) -> Result<MaskFlags> {
        let band = self.raster_band(index)?;
        let flags = unsafe { gdal_sys::GDALGetMaskFlags(band.handle) };
        Ok(MaskFlags::from_bits_truncate(flags as u32))
    }

    fn color_role(&self, index: usize) -> Result<ColorRole> {
        let band = self.raster_band(index)?;
        let interp = unsafe { gdal_sys::GDALGetRasterColorInterpretation(band.handle) };
        Ok(match interp {
            GDALColorInterp::GCI_GrayIndex => ColorRole::Gray,
            GDALColorInterp::GCI_PaletteIndex => ColorRole::Palette,
            GDALColorInterp::GCI_RedBand => ColorRole::Red,
            GDALColorInterp::GCI_GreenBand => ColorRole::Green,
            GDALColorInterp::GCI_BlueBand => ColorRole::Blue,
            GDALColorInterp::GCI_AlphaBand => ColorRole::Alpha,
            _ => ColorRole::Undefined,
        })
    }

    fn band(&self, index: usize) -> Result<GdalBand<'_>> {
        self.raster_band(index)
    }

    fn mask_band(&self, index: usize) -> Result<GdalBand<'_>> {
        let band = self.raster_band(index)?;
        let handle = unsafe { gdal_sys::GDALGetMaskBand(band.handle) };
        if handle.is_null() {
            return Err(RusterioError::NullMaskBand { index });
        }
        Ok(GdalBand {
            handle,
            _dataset: PhantomData,
        })
    }

    fn dataset_io(
        &self,
        direction: Direction,
        band_map: &[usize],
        rect: PixelRect,
        mut buffer: RawBuffer<'_>,
    ) -> Result<()> {
        let (rows, cols) = buffer.size();
        let mut band_map: Vec<c_int> = band_map.iter().map(|index| *index as c_int).collect();
        debug!("GDALDatasetRasterIOEx over bands {band_map:?}");
        let rv = unsafe {
            gdal_sys::GDALDatasetRasterIOEx(
                self.dataset.c_dataset(),
                rw_flag(direction),
                rect.xoff as c_int,
                rect.yoff as c_int,
                rect.xsize as c_int,
                rect.ysize as c_int,
                buffer.bytes_mut().as_mut_ptr().cast(),
                cols as c_int,
                rows as c_int,
                gdal_type(buffer.encoding()),
                band_map.len() as c_int,
                band_map.as_mut_ptr(),
                buffer.pixel_space() as GSpacing,
                buffer.line_space() as GSpacing,
                buffer.band_space() as GSpacing,
                ptr::null_mut(),
            )
        };
        if rv != CPLErr::CE_None {
            return Err(last_cpl_err());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(GDALDataType::GDT_Byte, Encoding::UInt8)]
    #[case(GDALDataType::GDT_Int16, Encoding::Int16)]
    #[case(GDALDataType::GDT_CFloat64, Encoding::CFloat64)]
    fn maps_gdal_types(#[case] data_type: GDALDataType::Type, #[case] encoding: Encoding) {
        assert_eq!(encoding_from(data_type).unwrap(), encoding);
        assert_eq!(gdal_type(encoding), data_type);
    }

    #[test]
    fn unknown_gdal_type_is_unsupported() {
        assert!(matches!(
            encoding_from(GDALDataType::GDT_Unknown),
            Err(RusterioError::UnsupportedEncoding(_))
        ));
    }
}
