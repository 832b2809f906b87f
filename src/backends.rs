//! Raster-access layers the engine can move pixels through.

#[cfg(feature = "gdal")]
mod gdal_backend;
mod memory;

#[cfg(feature = "gdal")]
pub use gdal_backend::{GdalBand, GdalRaster};
pub use memory::{MemBandHandle, MemDataset};
