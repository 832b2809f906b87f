//! Windowed, masked and boundless raster I/O into [`ndarray`].
//!
//! Pixels move between ndarray buffers and the bands of a [`RasterDataset`]
//! through [`RasterReader`] and [`RasterWriter`], which every dataset
//! implements. Element types are checked against band encodings, never cast.
//!
//! ```
//! use ndarray::Array3;
//! use rusterio::{backends::MemDataset, RasterReader, RasterWriter, ReadOptions, Window};
//!
//! let dataset = MemDataset::from_array(Array3::<i16>::zeros((3, 64, 64)));
//! let block = Array3::<i16>::ones((2, 8, 8));
//! let window = Window::from_offset_shape((4, 4), (8, 8));
//! dataset.write(&block, [3usize, 1], Some(&window)).unwrap();
//!
//! let options = ReadOptions::default().window(window);
//! let read = dataset.read::<i16>([3usize, 1], &options).unwrap();
//! assert_eq!(read.into_array(), block.into_dyn());
//! ```

pub mod backends;
mod buffer;
mod components;
mod errors;
mod indexes;

pub use buffer::{MaskedArray, RasterData};
pub use components::{
    window, AnyRaster, BandMap, ColorRole, Direction, Element, Encoding, MaskFlags, MaskOptions,
    NativeBand, PixelRect, RasterDataset, RasterReader, RasterWriter, RawBuffer, ReadOptions,
    Window,
};
pub use errors::{Result, RusterioError};
pub use indexes::Indexes;
