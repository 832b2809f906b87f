//! Windows in dataset pixel space and their resolution against a dataset
//! extent.
//!
//! Everything here is integer arithmetic; no I/O happens in this module.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{
    components::PixelRect,
    errors::{Result, RusterioError},
};

/// Half-open `(start, stop)` row and column ranges in dataset pixel space.
///
/// Bounds may be negative or beyond the dataset extent; only boundless
/// reads keep them as requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub rows: (isize, isize),
    pub cols: (isize, isize),
}

impl Window {
    pub fn new(rows: (isize, isize), cols: (isize, isize)) -> Self {
        Self { rows, cols }
    }

    pub fn from_slices(rows: Range<isize>, cols: Range<isize>) -> Self {
        Self::new((rows.start, rows.end), (cols.start, cols.end))
    }

    /// Window starting at `(row, col)` spanning `(height, width)`.
    pub fn from_offset_shape(offset: (isize, isize), shape: (usize, usize)) -> Self {
        Self::new(
            (offset.0, offset.0.saturating_add_unsigned(shape.0)),
            (offset.1, offset.1.saturating_add_unsigned(shape.1)),
        )
    }

    pub fn height(&self) -> usize {
        span(self.rows)
    }

    pub fn width(&self) -> usize {
        span(self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    fn validate(&self) -> Result<()> {
        if self.rows.1 < self.rows.0 || self.cols.1 < self.cols.0 {
            return Err(RusterioError::InvalidWindow(format!(
                "{self:?} has a stop before its start"
            )));
        }
        if self.rows.1.checked_sub(self.rows.0).is_none()
            || self.cols.1.checked_sub(self.cols.0).is_none()
        {
            return Err(RusterioError::InvalidWindow(format!(
                "{self:?} spans more than isize::MAX pixels"
            )));
        }
        Ok(())
    }

    /// Overlapping part of both windows, `None` when they do not overlap.
    pub fn intersection(&self, other: &Window) -> Option<Window> {
        let rows = (self.rows.0.max(other.rows.0), self.rows.1.min(other.rows.1));
        let cols = (self.cols.0.max(other.cols.0), self.cols.1.min(other.cols.1));
        let window = Window::new(rows, cols);
        (!window.is_empty()).then_some(window)
    }

    /// Clip to `[0, height] x [0, width]`. A window entirely outside
    /// collapses to zero height or width.
    pub fn clip(&self, height: usize, width: usize) -> Window {
        let clip_range = |(start, stop): (isize, isize), len: usize| {
            let len = len as isize;
            let start = start.clamp(0, len);
            (start, stop.clamp(start, len))
        };
        Window::new(clip_range(self.rows, height), clip_range(self.cols, width))
    }

    /// Native rectangle of a window lying inside the dataset.
    pub fn to_rect(&self) -> Result<PixelRect> {
        if self.rows.0 < 0 || self.cols.0 < 0 {
            return Err(RusterioError::InvalidWindow(format!(
                "{self:?} starts outside the dataset"
            )));
        }
        Ok(PixelRect::new(
            (self.cols.0 as usize, self.rows.0 as usize),
            (self.width(), self.height()),
        ))
    }
}

fn span((start, stop): (isize, isize)) -> usize {
    if stop > start {
        stop.abs_diff(start)
    } else {
        0
    }
}

/// Part of a request that overlaps the dataset, and where it lands in the
/// request's natural-shaped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub rect: PixelRect,
    /// (row, col) in the natural-shaped buffer.
    pub offset: (usize, usize),
}

/// Where one transfer lands in an output buffer of a given shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub rect: PixelRect,
    /// (rows, cols) of the transferred block.
    pub shape: (usize, usize),
    /// (row, col) of the block in the output buffer.
    pub offset: (usize, usize),
}

impl Placement {
    /// Whether this block alone fills an output of `shape`.
    pub fn covers(&self, shape: (usize, usize)) -> bool {
        self.offset == (0, 0) && self.shape == shape
    }
}

/// A request window resolved against a dataset extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Clipped window, or the requested one when boundless.
    pub window: Window,
    /// (rows, cols) of a read at native resolution.
    pub shape: (usize, usize),
    pub overlap: Option<Overlap>,
    pub boundless: bool,
}

/// Resolve `window` against a `height` x `width` dataset.
///
/// Without a window the full extent is used. Otherwise the window is
/// clipped, unless `boundless`, in which case its unclipped span gives the
/// natural shape and only the overlap with the dataset is transferred.
pub fn resolve(window: Option<&Window>, height: usize, width: usize, boundless: bool) -> Result<Resolution> {
    let full = Window::new((0, height as isize), (0, width as isize));
    let requested = match window {
        Some(window) => {
            window.validate()?;
            *window
        }
        None => full,
    };
    let window = if boundless {
        requested
    } else {
        requested.clip(height, width)
    };
    let overlap = window.intersection(&full).map(|overlap| Overlap {
        rect: PixelRect::new(
            (overlap.cols.0 as usize, overlap.rows.0 as usize),
            (overlap.width(), overlap.height()),
        ),
        offset: (
            (overlap.rows.0 - window.rows.0) as usize,
            (overlap.cols.0 - window.cols.0) as usize,
        ),
    });
    Ok(Resolution {
        window,
        shape: (window.height(), window.width()),
        overlap,
        boundless,
    })
}

impl Resolution {
    /// Destination pixels per dataset pixel, (rows, cols), for an output of
    /// `out_shape`.
    pub fn scale(&self, out_shape: (usize, usize)) -> (f64, f64) {
        let ratio = |out: usize, natural: usize| {
            if natural == 0 {
                1.
            } else {
                out as f64 / natural as f64
            }
        };
        (ratio(out_shape.0, self.shape.0), ratio(out_shape.1, self.shape.1))
    }

    /// Placement of the overlap in an output of `out_shape`, `None` when
    /// nothing is to be transferred.
    pub fn placement(&self, out_shape: (usize, usize)) -> Option<Placement> {
        let overlap = self.overlap?;
        let (row_scale, col_scale) = self.scale(out_shape);
        let place = |offset: usize, len: usize, scale: f64, out: usize| {
            let start = ((offset as f64 * scale).round() as usize).min(out);
            let stop = (((offset + len) as f64 * scale).round() as usize).min(out);
            (start, stop - start)
        };
        let (row, rows) = place(overlap.offset.0, overlap.rect.ysize, row_scale, out_shape.0);
        let (col, cols) = place(overlap.offset.1, overlap.rect.xsize, col_scale, out_shape.1);
        (rows > 0 && cols > 0).then_some(Placement {
            rect: overlap.rect,
            shape: (rows, cols),
            offset: (row, col),
        })
    }
}
