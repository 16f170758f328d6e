use ahash::AHashSet;
use mdx_model::CellValue;

/// One dimension of a segment body: an ordered, duplicate-free sequence of
/// column values, with a flag recording whether the sequence is ascending so
/// position lookups can binary-search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentAxis {
    values: Vec<CellValue>,
    sorted: bool,
}

impl SegmentAxis {
    pub fn new(values: impl IntoIterator<Item = CellValue>) -> Self {
        let mut seen = AHashSet::new();
        let mut kept = Vec::new();
        for value in values {
            if seen.insert(value.clone()) {
                kept.push(value);
            }
        }
        let sorted = kept.windows(2).all(|w| w[0] <= w[1]);
        Self {
            values: kept,
            sorted,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    /// Axis position of `value`, if present.
    pub fn position(&self, value: &CellValue) -> Option<usize> {
        if self.sorted {
            self.values.binary_search(value).ok()
        } else {
            self.values.iter().position(|v| v == value)
        }
    }
}
