mod dataset;
pub(crate) mod dispatch;
mod dynamic;
mod encoding;
pub(crate) mod mask;
pub(crate) mod reader;
pub mod window;
pub(crate) mod writer;

pub use dataset::{ColorRole, Direction, MaskFlags, NativeBand, PixelRect, RasterDataset, RawBuffer};
pub use dispatch::BandMap;
pub use dynamic::AnyRaster;
pub use encoding::{Element, Encoding};
pub use reader::{MaskOptions, RasterReader, ReadOptions};
pub use window::Window;
pub use writer::RasterWriter;
