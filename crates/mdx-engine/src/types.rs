use std::fmt;

/// Semantic category of an expression or function parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Any scalar (numeric, string, logical, date-time).
    Value,
    Numeric,
    String,
    Logical,
    DateTime,
    Symbol,
    Member,
    Tuple,
    Set,
    Level,
    Hierarchy,
    Dimension,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Value => "value",
            DataType::Numeric => "numeric",
            DataType::String => "string",
            DataType::Logical => "logical",
            DataType::DateTime => "date-time",
            DataType::Symbol => "symbol",
            DataType::Member => "member",
            DataType::Tuple => "tuple",
            DataType::Set => "set",
            DataType::Level => "level",
            DataType::Hierarchy => "hierarchy",
            DataType::Dimension => "dimension",
        };
        f.write_str(name)
    }
}

/// Cost of implicitly converting `from` into `to`; `None` means no implicit
/// conversion exists. Zero is an exact match.
///
/// The ladder is ordered so that cheap reinterpretations (scalar widening to
/// `Value`) are preferred over conversions that change evaluation shape
/// (member/tuple to scalar reads a cell; hierarchy to member reads the current
/// member).
pub fn conversion_cost(from: DataType, to: DataType) -> Option<u32> {
    use DataType::*;

    if from == to {
        return Some(0);
    }

    match (from, to) {
        // Scalar widening and narrowing.
        (Numeric | String | Logical | DateTime, Value) => Some(1),
        (Value, Numeric | String | Logical) => Some(2),
        (Numeric, Logical) => Some(2),

        // A member used where a tuple is expected is a one-member tuple.
        (Member, Tuple) => Some(1),

        // Member/tuple in scalar position evaluates the cell at that
        // coordinate in the current context.
        (Member | Tuple, Value) => Some(3),
        (Member | Tuple, Numeric) => Some(3),

        // Dimensional narrowing: a dimension stands for its hierarchy, a
        // hierarchy in member position reads its current member.
        (Dimension, Hierarchy) => Some(1),
        (Hierarchy, Member) => Some(4),
        (Dimension, Member) => Some(5),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_free() {
        assert_eq!(conversion_cost(DataType::Set, DataType::Set), Some(0));
    }

    #[test]
    fn member_to_numeric_costs_more_than_scalar_widening() {
        let widen = conversion_cost(DataType::Numeric, DataType::Value).unwrap();
        let cell = conversion_cost(DataType::Member, DataType::Numeric).unwrap();
        assert!(cell > widen);
    }

    #[test]
    fn set_never_converts_to_scalar() {
        assert_eq!(conversion_cost(DataType::Set, DataType::Numeric), None);
    }
}
