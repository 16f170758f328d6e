use mdx_model::CellValue;
use std::collections::BTreeSet;
use std::fmt;

/// Constraint on one backing column of an aggregate request.
///
/// `values: None` means the column is unconstrained (the segment carries every
/// value the backend produced for it).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnConstraint {
    pub column: String,
    pub values: Option<BTreeSet<CellValue>>,
}

impl ColumnConstraint {
    pub fn unconstrained(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            values: None,
        }
    }

    pub fn values(
        column: impl Into<String>,
        values: impl IntoIterator<Item = CellValue>,
    ) -> Self {
        Self {
            column: column.into(),
            values: Some(values.into_iter().collect()),
        }
    }
}

/// Logical identity of a cached aggregate: one measure plus a constraint per
/// participating column.
///
/// Constraints are kept sorted by column name, so equal headers are structurally
/// equal and the header itself can key the cache index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SegmentHeader {
    measure: String,
    constraints: Vec<ColumnConstraint>,
}

impl SegmentHeader {
    pub fn new(measure: impl Into<String>, mut constraints: Vec<ColumnConstraint>) -> Self {
        constraints.sort_by(|a, b| a.column.cmp(&b.column));
        constraints.dedup_by(|a, b| a.column == b.column);
        Self {
            measure: measure.into(),
            constraints,
        }
    }

    pub fn measure(&self) -> &str {
        &self.measure
    }

    /// Constraints in canonical (column-name) order; one per axis of the body.
    pub fn constraints(&self) -> &[ColumnConstraint] {
        &self.constraints
    }

    /// Containment: can a segment with this header answer a request for `other`?
    ///
    /// Requires the same measure and the same constrained-column universe;
    /// per column, an unconstrained side covers anything and a value set covers
    /// its subsets. Headers listing different column sets never cover each
    /// other, so partial multi-column coverage always misses.
    pub fn covers(&self, other: &SegmentHeader) -> bool {
        if self.measure != other.measure || self.constraints.len() != other.constraints.len() {
            return false;
        }

        self.constraints
            .iter()
            .zip(other.constraints.iter())
            .all(|(mine, theirs)| {
                if mine.column != theirs.column {
                    return false;
                }
                match (&mine.values, &theirs.values) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(a), Some(b)) => b.is_subset(a),
                }
            })
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.measure)?;
        for (i, c) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &c.values {
                None => write!(f, "{}=*", c.column)?,
                Some(values) => write!(f, "{}={} value(s)", c.column, values.len())?,
            }
        }
        write!(f, "}}")
    }
}
