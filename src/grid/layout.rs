use crate::foundation::math::round_div_u64;

/// Default lower bound on grid columns.
pub const DEFAULT_MIN_COLS: u32 = 2;
/// Default upper bound on grid columns.
pub const DEFAULT_MAX_COLS: u32 = 4;

/// Row/column tiling for a cell count. Always `cols * rows >= count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GridLayout {
    /// Column count, at least 1.
    pub cols: u32,
    /// Row count, at least 1.
    pub rows: u32,
}

impl GridLayout {
    /// Number of grid positions.
    pub fn capacity(self) -> u64 {
        u64::from(self.cols) * u64::from(self.rows)
    }
}

/// Cell region in source pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CellRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width, at least 1.
    pub width: u32,
    /// Height, at least 1.
    pub height: u32,
}

/// Near-square tiling for `count` cells, biased toward wider-than-tall grids.
///
/// `count` is floored to an integer; non-finite or non-positive counts become 1.
pub fn compute_layout(count: f64, min_cols: u32, max_cols: u32) -> GridLayout {
    let n = if count.is_finite() {
        count.floor().clamp(1.0, f64::from(u32::MAX)) as u64
    } else {
        1
    };
    let min_cols = min_cols.max(1);
    let max_cols = max_cols.max(min_cols);

    let sqrt_cols = (n as f64).sqrt().ceil() as u64;
    let cols = sqrt_cols.clamp(u64::from(min_cols), u64::from(max_cols));
    let rows = n.div_ceil(cols);

    GridLayout {
        cols: cols as u32,
        rows: rows.min(u64::from(u32::MAX)) as u32,
    }
}

/// Rect of cell `index` in a `cols x rows` grid over a `width x height` source.
///
/// Returns `None` for a zero-sized grid or source and for indices past `cols * rows`.
/// Shared edges between neighbours are pixel-identical; the last row/column absorbs rounding.
pub fn cell_bounds(index: u32, cols: u32, rows: u32, width: u32, height: u32) -> Option<CellRect> {
    if cols == 0 || rows == 0 || width == 0 || height == 0 {
        return None;
    }
    let col = index % cols;
    let row = index / cols;
    if row >= rows {
        return None;
    }

    let (x, w) = span(col, cols, width);
    let (y, h) = span(row, rows, height);
    Some(CellRect {
        x,
        y,
        width: w,
        height: h,
    })
}

/// Start and length of division `i` of `dim` split `divisions` ways.
fn span(i: u32, divisions: u32, dim: u32) -> (u32, u32) {
    let edge = |k: u32| -> u32 {
        round_div_u64(u64::from(k) * u64::from(dim), u64::from(divisions)).min(u64::from(dim))
            as u32
    };
    // A 1px cell starting on the far edge would leave the source.
    let start = edge(i).min(dim - 1);
    let end = edge(i + 1);
    (start, end.saturating_sub(start).max(1))
}

#[cfg(test)]
#[path = "../../tests/unit/grid/layout.rs"]
mod tests;
