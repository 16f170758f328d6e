//! Cell access seam between the evaluator and aggregate storage.

use crate::error::EngineResult;
use mdx_cache::{AggregateLoader, ColumnConstraint, SegmentCacheIndex, SegmentHeader};
use mdx_model::{CellValue, Measure};

/// Resolves one cell coordinate to its aggregated value. `Ok(None)` is an
/// empty cell, distinct from an aggregated zero.
pub trait CellReader {
    fn read(
        &self,
        measure: &Measure,
        constraints: &[(String, CellValue)],
    ) -> EngineResult<Option<f64>>;
}

/// Cell reader backed by the segment cache: each read maps its coordinate to
/// a canonical segment header, lets the index answer from a resident or
/// covering segment, and falls back to a single-flight load.
pub struct SegmentCellReader<'a> {
    index: &'a SegmentCacheIndex,
    loader: &'a dyn AggregateLoader,
}

impl<'a> SegmentCellReader<'a> {
    pub fn new(index: &'a SegmentCacheIndex, loader: &'a dyn AggregateLoader) -> Self {
        Self { index, loader }
    }
}

impl CellReader for SegmentCellReader<'_> {
    fn read(
        &self,
        measure: &Measure,
        constraints: &[(String, CellValue)],
    ) -> EngineResult<Option<f64>> {
        // Canonical column order: headers sort constraints by column name,
        // and segment axes follow the header, so the lookup coordinate must
        // use the same order.
        let mut pairs: Vec<(String, CellValue)> = constraints.to_vec();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.dedup_by(|a, b| a.0 == b.0);

        let header = SegmentHeader::new(
            &measure.name,
            pairs
                .iter()
                .map(|(column, value)| {
                    ColumnConstraint::values(column.clone(), [value.clone()])
                })
                .collect(),
        );
        let body = self.index.get_or_load(&header, self.loader)?;
        let coordinate: Vec<CellValue> = pairs.into_iter().map(|(_, value)| value).collect();
        Ok(body.value_at(&coordinate))
    }
}
