use ordered_float::OrderedFloat;
use std::fmt;

/// A scalar cell or coordinate value.
///
/// `CellValue` doubles as the value type for evaluated cells and for segment axis
/// coordinates, so it needs `Eq`/`Hash`; floats go through [`OrderedFloat`] for
/// that reason. `Blank` is the absent cell: distinct from `Number(0.0)` and from
/// the empty string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellValue {
    Blank,
    Number(OrderedFloat<f64>),
    Integer(i64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// Numeric view of the value, if it has one.
    ///
    /// `Blank` has no numeric view; arithmetic nodes decide empty-propagation
    /// themselves rather than silently reading blank as zero.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(n.into_inner()),
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Blank | CellValue::Text(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Blank => write!(f, "(blank)"),
            CellValue::Number(n) => write!(f, "{}", n.into_inner()),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(OrderedFloat(value))
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value as i64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}
