//! Pixel encodings and the Rust element types that carry them.

use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use bytemuck::{bytes_of, pod_read_unaligned};
use num::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, RusterioError};

/// Closed set of pixel encodings a band may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
    CInt16,
    CInt32,
    CFloat32,
    CFloat64,
}

impl Encoding {
    pub const ALL: [Encoding; 11] = [
        Encoding::UInt8,
        Encoding::UInt16,
        Encoding::Int16,
        Encoding::UInt32,
        Encoding::Int32,
        Encoding::Float32,
        Encoding::Float64,
        Encoding::CInt16,
        Encoding::CInt32,
        Encoding::CFloat32,
        Encoding::CFloat64,
    ];

    /// GDAL name of the encoding.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::UInt8 => "Byte",
            Encoding::UInt16 => "UInt16",
            Encoding::Int16 => "Int16",
            Encoding::UInt32 => "UInt32",
            Encoding::Int32 => "Int32",
            Encoding::Float32 => "Float32",
            Encoding::Float64 => "Float64",
            Encoding::CInt16 => "CInt16",
            Encoding::CInt32 => "CInt32",
            Encoding::CFloat32 => "CFloat32",
            Encoding::CFloat64 => "CFloat64",
        }
    }

    /// Encoding of a single real or imaginary part.
    pub fn component(self) -> Encoding {
        match self {
            Encoding::CInt16 => Encoding::Int16,
            Encoding::CInt32 => Encoding::Int32,
            Encoding::CFloat32 => Encoding::Float32,
            Encoding::CFloat64 => Encoding::Float64,
            real => real,
        }
    }

    pub fn is_complex(self) -> bool {
        self.component() != self
    }

    pub fn is_floating(self) -> bool {
        matches!(self.component(), Encoding::Float32 | Encoding::Float64)
    }

    /// Number of scalar parts per pixel.
    pub fn components(self) -> usize {
        if self.is_complex() {
            2
        } else {
            1
        }
    }

    /// Bytes per pixel.
    pub fn size(self) -> usize {
        let component = match self.component() {
            Encoding::UInt8 => 1,
            Encoding::UInt16 | Encoding::Int16 => 2,
            Encoding::UInt32 | Encoding::Int32 | Encoding::Float32 => 4,
            _ => 8,
        };
        component * self.components()
    }

    /// Smallest and largest representable value of a component.
    pub fn range(self) -> (f64, f64) {
        match self.component() {
            Encoding::UInt8 => (u8::MIN as f64, u8::MAX as f64),
            Encoding::UInt16 => (u16::MIN as f64, u16::MAX as f64),
            Encoding::Int16 => (i16::MIN as f64, i16::MAX as f64),
            Encoding::UInt32 => (u32::MIN as f64, u32::MAX as f64),
            Encoding::Int32 => (i32::MIN as f64, i32::MAX as f64),
            Encoding::Float32 => (f32::MIN as f64, f32::MAX as f64),
            _ => (f64::MIN, f64::MAX),
        }
    }

    /// Clamp a nodata value into the representable range.
    ///
    /// Out of range values are moved to the nearest bound instead of being
    /// rejected. `NaN`, and infinities on floating encodings, pass through.
    pub fn clamp_nodata(self, value: f64) -> f64 {
        if value.is_nan() || (self.is_floating() && value.is_infinite()) {
            return value;
        }
        let (min, max) = self.range();
        value.clamp(min, max)
    }

    /// Native bytes of a pixel holding `value` after clamping. Complex
    /// encodings get a zero imaginary part.
    pub fn encode_scalar(self, value: f64) -> Vec<u8> {
        let value = self.clamp_nodata(value);
        let mut bytes = match self.component() {
            Encoding::UInt8 => vec![value as u8],
            Encoding::UInt16 => bytes_of(&(value as u16)).to_vec(),
            Encoding::Int16 => bytes_of(&(value as i16)).to_vec(),
            Encoding::UInt32 => bytes_of(&(value as u32)).to_vec(),
            Encoding::Int32 => bytes_of(&(value as i32)).to_vec(),
            Encoding::Float32 => bytes_of(&(value as f32)).to_vec(),
            _ => bytes_of(&value).to_vec(),
        };
        if self.is_complex() {
            bytes.resize(self.size(), 0);
        }
        bytes
    }

    /// Real part of the pixel stored in `bytes`, widened to `f64`.
    pub fn decode_scalar(self, bytes: &[u8]) -> f64 {
        let component = self.component();
        let real = &bytes[..component.size()];
        match component {
            Encoding::UInt8 => real[0] as f64,
            Encoding::UInt16 => pod_read_unaligned::<u16>(real) as f64,
            Encoding::Int16 => pod_read_unaligned::<i16>(real) as f64,
            Encoding::UInt32 => pod_read_unaligned::<u32>(real) as f64,
            Encoding::Int32 => pod_read_unaligned::<i32>(real) as f64,
            Encoding::Float32 => pod_read_unaligned::<f32>(real) as f64,
            _ => pod_read_unaligned::<f64>(real),
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = RusterioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uint8" => return Ok(Encoding::UInt8),
            "complex64" => return Ok(Encoding::CFloat32),
            "complex128" => return Ok(Encoding::CFloat64),
            _ => (),
        }
        Encoding::ALL
            .into_iter()
            .find(|encoding| encoding.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RusterioError::UnsupportedEncoding(s.to_string()))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust type holding one pixel of a given [`Encoding`].
///
/// Implemented for `u8`, `u16`, `i16`, `u32`, `i32`, `f32`, `f64` and
/// [`Complex`] of `i16`, `i32`, `f32` and `f64`.
pub trait Element: sealed::Sealed + Copy + Zero + PartialEq + Debug + Send + Sync + 'static {
    const ENCODING: Encoding;

    /// Scalar type of a real or imaginary part.
    type Component: bytemuck::Pod + Zero + Send + Sync;

    /// Element for an already clamped value.
    fn from_clamped(value: f64) -> Self;

    /// Native bytes of a real element slice. `None` for complex elements,
    /// which are moved through an interleaved component buffer instead.
    fn native_bytes(slice: &mut [Self]) -> Option<&mut [u8]>;

    fn from_parts(re: Self::Component, im: Self::Component) -> Self;

    fn parts(self) -> (Self::Component, Self::Component);

    /// Pixel value used to pre-fill buffers of a band with `nodata`.
    fn fill_value(nodata: Option<f64>) -> Self {
        nodata
            .map(|value| Self::from_clamped(Self::ENCODING.clamp_nodata(value)))
            .unwrap_or_else(Self::zero)
    }
}

macro_rules! real_element {
    ($t:ty, $encoding:ident) => {
        impl sealed::Sealed for $t {}

        impl Element for $t {
            const ENCODING: Encoding = Encoding::$encoding;
            type Component = $t;

            fn from_clamped(value: f64) -> Self {
                value as $t
            }

            fn native_bytes(slice: &mut [Self]) -> Option<&mut [u8]> {
                Some(bytemuck::cast_slice_mut(slice))
            }

            fn from_parts(re: $t, _im: $t) -> Self {
                re
            }

            fn parts(self) -> ($t, $t) {
                (self, <$t>::zero())
            }
        }
    };
}

macro_rules! complex_element {
    ($t:ty, $encoding:ident) => {
        impl sealed::Sealed for Complex<$t> {}

        impl Element for Complex<$t> {
            const ENCODING: Encoding = Encoding::$encoding;
            type Component = $t;

            fn from_clamped(value: f64) -> Self {
                Complex::new(value as $t, <$t>::zero())
            }

            fn native_bytes(_slice: &mut [Self]) -> Option<&mut [u8]> {
                None
            }

            fn from_parts(re: $t, im: $t) -> Self {
                Complex::new(re, im)
            }

            fn parts(self) -> ($t, $t) {
                (self.re, self.im)
            }
        }
    };
}

real_element!(u8, UInt8);
real_element!(u16, UInt16);
real_element!(i16, Int16);
real_element!(u32, UInt32);
real_element!(i32, Int32);
real_element!(f32, Float32);
real_element!(f64, Float64);
complex_element!(i16, CInt16);
complex_element!(i32, CInt32);
complex_element!(f32, CFloat32);
complex_element!(f64, CFloat64);
