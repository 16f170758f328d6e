use crate::axis::SegmentAxis;
use crate::bitmap::Bitmap;
use ahash::AHashMap;
use mdx_model::CellValue;
use smallvec::SmallVec;

/// Axis positions addressing one cell.
type Coord = SmallVec<[u32; 4]>;

/// Fill ratio at or above which the builder materializes a dense array instead
/// of a sparse coordinate map.
const DENSE_FILL_THRESHOLD: f64 = 0.25;

/// Accumulates fetched cells, then picks the physical representation by fill
/// density at [`build`](SegmentBodyBuilder::build) time.
pub struct SegmentBodyBuilder {
    axes: Vec<SegmentAxis>,
    cells: AHashMap<Coord, f64>,
}

impl SegmentBodyBuilder {
    pub fn new(axes: Vec<SegmentAxis>) -> Self {
        Self {
            axes,
            cells: AHashMap::new(),
        }
    }

    /// Record a cell value at the given axis coordinates.
    ///
    /// Returns `false` (and stores nothing) if any coordinate is not on its
    /// axis; backends can use that to drop rows outside the requested slice.
    pub fn set(&mut self, coords: &[CellValue], value: f64) -> bool {
        debug_assert_eq!(coords.len(), self.axes.len(), "coordinate arity mismatch");
        let mut positions = Coord::new();
        for (axis, coord) in self.axes.iter().zip(coords) {
            match axis.position(coord) {
                Some(pos) => positions.push(pos as u32),
                None => return false,
            }
        }
        self.cells.insert(positions, value);
        true
    }

    pub fn build(self) -> SegmentBody {
        let cell_count: usize = self.axes.iter().map(SegmentAxis::len).product();
        let fill = if cell_count == 0 {
            0.0
        } else {
            self.cells.len() as f64 / cell_count as f64
        };

        let store = if cell_count > 0 && fill >= DENSE_FILL_THRESHOLD {
            let mut values = vec![0.0; cell_count];
            // All cells start null; storing a value clears its null bit.
            let mut nulls = Bitmap::new_filled(cell_count, true);
            for (coord, value) in &self.cells {
                let offset = offset_of(&self.axes, coord);
                values[offset] = *value;
                nulls.set(offset, false);
            }
            Store::Dense { values, nulls }
        } else {
            Store::Sparse { cells: self.cells }
        };

        SegmentBody {
            axes: self.axes,
            store,
        }
    }
}

/// Physical storage of one segment's cell values.
///
/// Immutable once built; the cache shares bodies across readers via `Arc`.
/// A null indicator is kept separately from raw values, so a stored zero is
/// distinguishable from "no value".
#[derive(Clone, Debug)]
pub struct SegmentBody {
    axes: Vec<SegmentAxis>,
    store: Store,
}

#[derive(Clone, Debug)]
enum Store {
    Dense { values: Vec<f64>, nulls: Bitmap },
    Sparse { cells: AHashMap<Coord, f64> },
}

impl SegmentBody {
    pub fn axes(&self) -> &[SegmentAxis] {
        &self.axes
    }

    pub fn is_dense(&self) -> bool {
        matches!(self.store, Store::Dense { .. })
    }

    /// Total addressable cells (product of axis lengths).
    pub fn cell_count(&self) -> usize {
        self.axes.iter().map(SegmentAxis::len).product()
    }

    pub fn null_count(&self) -> usize {
        match &self.store {
            Store::Dense { nulls, .. } => nulls.count_ones(),
            Store::Sparse { cells } => self.cell_count() - cells.len(),
        }
    }

    /// Cells that actually hold a value: `cell_count - null_count`.
    pub fn effective_len(&self) -> usize {
        self.cell_count() - self.null_count()
    }

    /// Value at the given axis positions; `None` for a null cell.
    pub fn value(&self, positions: &[usize]) -> Option<f64> {
        debug_assert_eq!(positions.len(), self.axes.len(), "coordinate arity mismatch");
        match &self.store {
            Store::Dense { values, nulls } => {
                let mut offset = 0usize;
                for (axis, pos) in self.axes.iter().zip(positions) {
                    debug_assert!(*pos < axis.len(), "axis position out of range");
                    offset = offset * axis.len() + pos;
                }
                if nulls.get(offset) {
                    None
                } else {
                    Some(values[offset])
                }
            }
            Store::Sparse { cells } => {
                let coord: Coord = positions.iter().map(|p| *p as u32).collect();
                cells.get(&coord).copied()
            }
        }
    }

    /// Value at the given column coordinates; `None` if any coordinate is off
    /// its axis or the cell is null.
    pub fn value_at(&self, coords: &[CellValue]) -> Option<f64> {
        let mut positions = SmallVec::<[usize; 4]>::new();
        for (axis, coord) in self.axes.iter().zip(coords) {
            positions.push(axis.position(coord)?);
        }
        self.value(&positions)
    }
}

fn offset_of(axes: &[SegmentAxis], coord: &Coord) -> usize {
    let mut offset = 0usize;
    for (axis, pos) in axes.iter().zip(coord) {
        offset = offset * axis.len() + *pos as usize;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn axes_2x2() -> Vec<SegmentAxis> {
        vec![
            SegmentAxis::new([1997.into(), 1998.into()]),
            SegmentAxis::new(["Q1".into(), "Q2".into()]),
        ]
    }

    #[test]
    fn dense_null_flag_wins_over_raw_zero() {
        let mut builder = SegmentBodyBuilder::new(axes_2x2());
        assert!(builder.set(&[1997.into(), "Q1".into()], 0.0));
        assert!(builder.set(&[1997.into(), "Q2".into()], 5.0));
        assert!(builder.set(&[1998.into(), "Q1".into()], 7.0));
        let body = builder.build();

        assert!(body.is_dense());
        // Stored zero reads back as a value; the never-stored cell is absent
        // even though its raw dense slot also holds 0.0.
        assert_eq!(body.value_at(&[1997.into(), "Q1".into()]), Some(0.0));
        assert_eq!(body.value_at(&[1998.into(), "Q2".into()]), None);
        assert_eq!(body.effective_len(), 3);
        assert_eq!(body.null_count(), 1);
    }

    #[test]
    fn sparse_below_density_threshold() {
        let axis = SegmentAxis::new((0..100).map(CellValue::from));
        let mut builder = SegmentBodyBuilder::new(vec![axis]);
        assert!(builder.set(&[42.into()], 3.5));
        let body = builder.build();

        assert!(!body.is_dense());
        assert_eq!(body.value_at(&[42.into()]), Some(3.5));
        assert_eq!(body.value_at(&[41.into()]), None);
        assert_eq!(body.cell_count(), 100);
        assert_eq!(body.effective_len(), 1);
    }

    #[test]
    fn off_axis_coordinates_are_absent() {
        let mut builder = SegmentBodyBuilder::new(axes_2x2());
        assert!(!builder.set(&[1999.into(), "Q1".into()], 1.0));
        let body = builder.build();
        assert_eq!(body.value_at(&[1999.into(), "Q1".into()]), None);
    }
}
