//! The compiled calculation tree and its evaluation semantics.
//!
//! Nodes form a closed tagged enum rather than an open class hierarchy: each
//! variant carries its typed children, and evaluation, result-style and
//! hierarchy-dependency analysis dispatch exhaustively over the tag. Trees are
//! immutable after compilation; all mutable state lives in the [`Evaluator`].
//!
//! Set-producing nodes use internal iteration ([`Calc::for_each_tuple`]): the
//! producer drives a visitor callback while holding the evaluator mutably,
//! which is what lets lazy producers re-pin the dimensional context per tuple
//! without materializing anything. A consumer that needs a materialized list
//! goes through the explicit [`Calc::IterToList`] adapter.

use crate::error::{EngineError, EngineResult};
use crate::eval::Evaluator;
use crate::types::DataType;
use ahash::AHashSet;
use mdx_model::{CellValue, MemberId};
use smallvec::{smallvec, SmallVec};
use std::ops::ControlFlow;

/// One member per participating hierarchy; a coordinate into the space.
pub type Tuple = SmallVec<[MemberId; 4]>;

/// Hierarchy ordinals a sub-expression's value depends on.
pub type DependencyList = SmallVec<[u16; 8]>;

/// How a node delivers its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultStyle {
    /// A single scalar/member/tuple value.
    Value,
    /// An eagerly materialized ordered tuple list.
    List,
    /// A lazily produced tuple stream (internal iteration).
    Iterable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Evaluation result, one variant per semantic category the tree can produce.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalResult {
    Value(CellValue),
    Member(MemberId),
    Tuple(Tuple),
    Set(Vec<Tuple>),
    Level { hierarchy: usize, depth: usize },
    Hierarchy(usize),
}

impl EvalResult {
    fn category(&self) -> &'static str {
        match self {
            EvalResult::Value(_) => "value",
            EvalResult::Member(_) => "member",
            EvalResult::Tuple(_) => "tuple",
            EvalResult::Set(_) => "set",
            EvalResult::Level { .. } => "level",
            EvalResult::Hierarchy(_) => "hierarchy",
        }
    }
}

/// A compiled calculation-tree node. Created once per compiled query,
/// immutable and reusable across evaluations.
#[derive(Clone, Debug)]
pub enum Calc {
    Literal(CellValue),
    Symbol(String),
    MemberRef {
        member: MemberId,
        hierarchy: usize,
    },
    LevelRef {
        hierarchy: usize,
        depth: usize,
    },
    HierarchyRef {
        hierarchy: usize,
    },
    /// Reads the evaluator's current member for a hierarchy, consulting the
    /// compound-slicer alert policy when the context is ambiguous.
    CurrentMember {
        hierarchy: usize,
    },
    /// A member or tuple used in scalar position: pins the coordinate onto the
    /// context and reads the cell there.
    CellRead {
        coordinate: Box<Calc>,
    },
    TupleCtor {
        members: Vec<Calc>,
    },
    /// Braces constructor: members, tuples and sets spliced in order.
    SetUnion {
        items: Vec<Calc>,
    },
    Children {
        member: Box<Calc>,
        hierarchy: usize,
    },
    LevelMembers {
        hierarchy: usize,
        depth: usize,
    },
    HierarchyMembers {
        hierarchy: usize,
    },
    CrossJoin {
        left: Box<Calc>,
        right: Box<Calc>,
    },
    Except {
        set: Box<Calc>,
        exclusions: Box<Calc>,
    },
    Filter {
        set: Box<Calc>,
        predicate: Box<Calc>,
    },
    /// Drains a lazily iterable child into a materialized list, at most once
    /// per evaluation.
    IterToList {
        set: Box<Calc>,
    },
    /// Memoizes its child in the evaluator's per-execution cache, keyed on the
    /// snapshot of the dependent hierarchies' current members.
    MemoCache {
        id: usize,
        depends: DependencyList,
        node: Box<Calc>,
    },
    Arith {
        op: ArithOp,
        left: Box<Calc>,
        right: Box<Calc>,
    },
    Neg {
        value: Box<Calc>,
    },
    Compare {
        op: CompareOp,
        left: Box<Calc>,
        right: Box<Calc>,
    },
    /// Null-handling override: yields `fallback` when `value` is empty.
    CoalesceEmpty {
        value: Box<Calc>,
        fallback: Box<Calc>,
    },
    /// `Sum(set)` / `Sum(set, numeric)`: iterates the set, pinning each tuple
    /// onto the context, and totals the non-empty values.
    SumSet {
        set: Box<Calc>,
        value: Option<Box<Calc>>,
    },
    CountSet {
        set: Box<Calc>,
    },
}

impl Calc {
    /// Declared semantic category; fixed at compile time.
    pub fn data_type(&self) -> DataType {
        match self {
            Calc::Literal(CellValue::Number(_) | CellValue::Integer(_)) => DataType::Numeric,
            Calc::Literal(CellValue::Text(_)) => DataType::String,
            Calc::Literal(CellValue::Bool(_)) => DataType::Logical,
            Calc::Literal(CellValue::Blank) => DataType::Value,
            Calc::Symbol(_) => DataType::Symbol,
            Calc::MemberRef { .. } | Calc::CurrentMember { .. } => DataType::Member,
            Calc::LevelRef { .. } => DataType::Level,
            Calc::HierarchyRef { .. } => DataType::Hierarchy,
            Calc::CellRead { .. } => DataType::Value,
            Calc::TupleCtor { .. } => DataType::Tuple,
            Calc::SetUnion { .. }
            | Calc::Children { .. }
            | Calc::LevelMembers { .. }
            | Calc::HierarchyMembers { .. }
            | Calc::CrossJoin { .. }
            | Calc::Except { .. }
            | Calc::Filter { .. }
            | Calc::IterToList { .. } => DataType::Set,
            Calc::MemoCache { node, .. } => node.data_type(),
            Calc::Arith { .. } | Calc::Neg { .. } | Calc::SumSet { .. } | Calc::CountSet { .. } => {
                DataType::Numeric
            }
            Calc::Compare { .. } => DataType::Logical,
            Calc::CoalesceEmpty { value, .. } => value.data_type(),
        }
    }

    /// Declared result representation, used for list/iterable negotiation.
    pub fn result_style(&self) -> ResultStyle {
        match self {
            Calc::CrossJoin { .. } | Calc::Filter { .. } => ResultStyle::Iterable,
            Calc::SetUnion { .. }
            | Calc::Children { .. }
            | Calc::LevelMembers { .. }
            | Calc::HierarchyMembers { .. }
            | Calc::Except { .. }
            | Calc::IterToList { .. } => ResultStyle::List,
            Calc::MemoCache { node, .. } => match node.result_style() {
                // Memoized sets are handed back as materialized lists.
                ResultStyle::Iterable | ResultStyle::List => ResultStyle::List,
                ResultStyle::Value => ResultStyle::Value,
            },
            _ => ResultStyle::Value,
        }
    }

    /// Does this node's value change when `ordinal`'s current member changes?
    ///
    /// Propagation is monotonic from children, except where a node pins the
    /// hierarchy itself: a cell read decouples the hierarchies its coordinate
    /// pins, and set aggregation/filtering decouples the hierarchies the
    /// iterated set spans.
    pub fn depends_on(&self, ordinal: usize) -> bool {
        match self {
            Calc::Literal(_)
            | Calc::Symbol(_)
            | Calc::MemberRef { .. }
            | Calc::LevelRef { .. }
            | Calc::HierarchyRef { .. }
            | Calc::LevelMembers { .. }
            | Calc::HierarchyMembers { .. } => false,
            Calc::CurrentMember { hierarchy } => *hierarchy == ordinal,
            Calc::CellRead { coordinate } => {
                if coordinate.depends_on(ordinal) {
                    return true;
                }
                // The coordinate pins its own hierarchies; the cell still
                // depends on every other hierarchy in the context.
                !coordinate.pinned_hierarchies().contains(&ordinal)
            }
            Calc::TupleCtor { members } => members.iter().any(|m| m.depends_on(ordinal)),
            Calc::SetUnion { items } => items.iter().any(|i| i.depends_on(ordinal)),
            Calc::Children { member, .. } => member.depends_on(ordinal),
            Calc::CrossJoin { left, right } => {
                left.depends_on(ordinal) || right.depends_on(ordinal)
            }
            Calc::Except { set, exclusions } => {
                set.depends_on(ordinal) || exclusions.depends_on(ordinal)
            }
            Calc::Filter { set, predicate } => {
                set.depends_on(ordinal)
                    || (predicate.depends_on(ordinal)
                        && !set.set_hierarchies().contains(&ordinal))
            }
            Calc::IterToList { set } => set.depends_on(ordinal),
            Calc::MemoCache { depends, .. } => depends.contains(&(ordinal as u16)),
            Calc::Arith { left, right, .. } | Calc::Compare { left, right, .. } => {
                left.depends_on(ordinal) || right.depends_on(ordinal)
            }
            Calc::Neg { value } => value.depends_on(ordinal),
            Calc::CoalesceEmpty { value, fallback } => {
                value.depends_on(ordinal) || fallback.depends_on(ordinal)
            }
            Calc::SumSet { set, value } => {
                if set.depends_on(ordinal) {
                    return true;
                }
                let pinned = set.set_hierarchies();
                match value {
                    Some(value) => value.depends_on(ordinal) && !pinned.contains(&ordinal),
                    // Sum over the raw cells reads every context hierarchy the
                    // iteration does not pin.
                    None => !pinned.contains(&ordinal),
                }
            }
            Calc::CountSet { set } => set.depends_on(ordinal),
        }
    }

    /// Hierarchies pinned when this member/tuple node is applied as a
    /// coordinate.
    fn pinned_hierarchies(&self) -> SmallVec<[usize; 4]> {
        match self {
            Calc::MemberRef { hierarchy, .. } | Calc::CurrentMember { hierarchy } => {
                smallvec![*hierarchy]
            }
            Calc::TupleCtor { members } => {
                let mut out = SmallVec::new();
                for member in members {
                    for h in member.pinned_hierarchies() {
                        if !out.contains(&h) {
                            out.push(h);
                        }
                    }
                }
                out
            }
            Calc::MemoCache { node, .. } => node.pinned_hierarchies(),
            _ => SmallVec::new(),
        }
    }

    /// Hierarchies spanned by the tuples of this set node.
    pub(crate) fn set_hierarchies(&self) -> SmallVec<[usize; 4]> {
        match self {
            Calc::Children { hierarchy, .. }
            | Calc::LevelMembers { hierarchy, .. }
            | Calc::HierarchyMembers { hierarchy } => smallvec![*hierarchy],
            Calc::CrossJoin { left, right } => {
                let mut out = left.set_hierarchies();
                for h in right.set_hierarchies() {
                    if !out.contains(&h) {
                        out.push(h);
                    }
                }
                out
            }
            Calc::Except { set, .. }
            | Calc::Filter { set, .. }
            | Calc::IterToList { set } => set.set_hierarchies(),
            Calc::SetUnion { items } => {
                let mut out = SmallVec::new();
                for item in items {
                    let spanned = match item.data_type() {
                        DataType::Set => item.set_hierarchies(),
                        _ => item.pinned_hierarchies(),
                    };
                    for h in spanned {
                        if !out.contains(&h) {
                            out.push(h);
                        }
                    }
                }
                out
            }
            Calc::MemoCache { node, .. } => node.set_hierarchies(),
            _ => SmallVec::new(),
        }
    }

    /// Evaluate against the current context. Pure with respect to tree
    /// structure: two calls under the same context yield the same result.
    pub fn evaluate(&self, ev: &mut Evaluator<'_>) -> EngineResult<EvalResult> {
        match self {
            Calc::Literal(value) => Ok(EvalResult::Value(value.clone())),
            Calc::Symbol(name) => Ok(EvalResult::Value(CellValue::Text(name.clone()))),
            Calc::MemberRef { member, .. } => Ok(EvalResult::Member(*member)),
            Calc::LevelRef { hierarchy, depth } => Ok(EvalResult::Level {
                hierarchy: *hierarchy,
                depth: *depth,
            }),
            Calc::HierarchyRef { hierarchy } => Ok(EvalResult::Hierarchy(*hierarchy)),
            Calc::CurrentMember { hierarchy } => {
                Ok(EvalResult::Member(ev.current_member_checked(*hierarchy)?))
            }
            Calc::CellRead { coordinate } => {
                let coordinate = match coordinate.evaluate(ev)? {
                    EvalResult::Member(m) => smallvec![m],
                    EvalResult::Tuple(t) => t,
                    // Already scalar; nothing to pin.
                    EvalResult::Value(v) => return Ok(EvalResult::Value(v)),
                    other => {
                        return Err(EngineError::Type(format!(
                            "cannot read a cell at a {} coordinate",
                            other.category()
                        )))
                    }
                };
                let value = ev.with_tuple(&coordinate, |ev| ev.read_current_cell())?;
                Ok(EvalResult::Value(value))
            }
            Calc::TupleCtor { members } => {
                let mut tuple = Tuple::new();
                for member in members {
                    tuple.push(member.evaluate_member(ev)?);
                }
                Ok(EvalResult::Tuple(tuple))
            }
            Calc::MemoCache { id, depends, node } => {
                let snapshot = ev.snapshot(depends);
                if let Some(hit) = ev.memo_get(*id, &snapshot) {
                    return Ok(hit);
                }
                let value = node.evaluate(ev)?;
                ev.memo_put(*id, snapshot, value.clone());
                Ok(value)
            }
            Calc::Arith { op, left, right } => {
                let lhs = left.evaluate_scalar(ev)?;
                if lhs.is_blank() {
                    return Ok(EvalResult::Value(CellValue::Blank));
                }
                let rhs = right.evaluate_scalar(ev)?;
                if rhs.is_blank() {
                    return Ok(EvalResult::Value(CellValue::Blank));
                }
                let l = numeric_operand(op.symbol(), 1, &lhs)?;
                let r = numeric_operand(op.symbol(), 2, &rhs)?;
                let out = match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                };
                Ok(EvalResult::Value(out.into()))
            }
            Calc::Neg { value } => {
                let v = value.evaluate_scalar(ev)?;
                if v.is_blank() {
                    return Ok(EvalResult::Value(CellValue::Blank));
                }
                let n = numeric_operand("-", 1, &v)?;
                Ok(EvalResult::Value((-n).into()))
            }
            Calc::Compare { op, left, right } => {
                let lhs = left.evaluate_scalar(ev)?;
                let rhs = right.evaluate_scalar(ev)?;
                Ok(EvalResult::Value(CellValue::Bool(compare_values(
                    *op, &lhs, &rhs,
                )?)))
            }
            Calc::CoalesceEmpty { value, fallback } => {
                let v = value.evaluate_scalar(ev)?;
                if v.is_blank() {
                    Ok(EvalResult::Value(fallback.evaluate_scalar(ev)?))
                } else {
                    Ok(EvalResult::Value(v))
                }
            }
            Calc::SumSet { set, value } => {
                let mut total = 0.0;
                let mut contributing = 0usize;
                set.for_each_tuple(ev, &mut |ev, tuple| {
                    let cell = ev.with_tuple(tuple, |ev| match value {
                        Some(value) => value.evaluate_scalar(ev),
                        None => ev.read_current_cell(),
                    })?;
                    // Empty cells are absent from aggregation.
                    if let Some(n) = cell.as_number() {
                        total += n;
                        contributing += 1;
                    }
                    Ok(ControlFlow::Continue(()))
                })?;
                if contributing == 0 {
                    Ok(EvalResult::Value(CellValue::Blank))
                } else {
                    Ok(EvalResult::Value(total.into()))
                }
            }
            Calc::CountSet { set } => {
                let mut count = 0i64;
                set.for_each_tuple(ev, &mut |_, _| {
                    count += 1;
                    Ok(ControlFlow::Continue(()))
                })?;
                Ok(EvalResult::Value(count.into()))
            }
            // Set producers materialize when asked for a generic result.
            Calc::SetUnion { .. }
            | Calc::Children { .. }
            | Calc::LevelMembers { .. }
            | Calc::HierarchyMembers { .. }
            | Calc::CrossJoin { .. }
            | Calc::Except { .. }
            | Calc::Filter { .. }
            | Calc::IterToList { .. } => Ok(EvalResult::Set(self.evaluate_list(ev)?)),
        }
    }

    /// Evaluate expecting a scalar.
    pub fn evaluate_scalar(&self, ev: &mut Evaluator<'_>) -> EngineResult<CellValue> {
        match self.evaluate(ev)? {
            EvalResult::Value(v) => Ok(v),
            other => Err(EngineError::Type(format!(
                "expected a scalar, got a {}",
                other.category()
            ))),
        }
    }

    /// Evaluate expecting a member.
    pub fn evaluate_member(&self, ev: &mut Evaluator<'_>) -> EngineResult<MemberId> {
        match self.evaluate(ev)? {
            EvalResult::Member(m) => Ok(m),
            other => Err(EngineError::Type(format!(
                "expected a member, got a {}",
                other.category()
            ))),
        }
    }

    /// Materialize a set node into an ordered tuple list, honoring the
    /// configured result limit.
    pub fn evaluate_list(&self, ev: &mut Evaluator<'_>) -> EngineResult<Vec<Tuple>> {
        if let Calc::MemoCache { .. } = self {
            return match self.evaluate(ev)? {
                EvalResult::Set(tuples) => Ok(tuples),
                other => Err(EngineError::Type(format!(
                    "expected a set, got a {}",
                    other.category()
                ))),
            };
        }

        let mut buffer = TupleBuffer::new(ev.config().result_limit);
        self.for_each_tuple(ev, &mut |_, tuple| {
            buffer.push(tuple.clone())?;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(buffer.into_vec())
    }

    /// Drive `visit` over every tuple this set node produces, in order.
    ///
    /// The visitor may mutate the evaluator (push/pop context frames) and may
    /// stop early with [`ControlFlow::Break`]; producers are restartable, so a
    /// later call re-iterates from the start.
    pub fn for_each_tuple(
        &self,
        ev: &mut Evaluator<'_>,
        visit: &mut dyn FnMut(&mut Evaluator<'_>, &Tuple) -> EngineResult<ControlFlow<()>>,
    ) -> EngineResult<ControlFlow<()>> {
        match self {
            Calc::Children { member, .. } => {
                let parent = member.evaluate_member(ev)?;
                let children: Vec<MemberId> = ev
                    .member(parent)?
                    .children()
                    .to_vec();
                for child in children {
                    let tuple: Tuple = smallvec![child];
                    if visit(ev, &tuple)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            Calc::LevelMembers { hierarchy, depth } => {
                for id in ev.catalog().members_at_depth(*hierarchy, *depth) {
                    let tuple: Tuple = smallvec![id];
                    if visit(ev, &tuple)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            Calc::HierarchyMembers { hierarchy } => {
                let depths = ev
                    .catalog()
                    .hierarchy(*hierarchy)
                    .map_or(0, |h| h.levels.len());
                for depth in 0..depths {
                    for id in ev.catalog().members_at_depth(*hierarchy, depth) {
                        let tuple: Tuple = smallvec![id];
                        if visit(ev, &tuple)?.is_break() {
                            return Ok(ControlFlow::Break(()));
                        }
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            Calc::SetUnion { items } => {
                for item in items {
                    match item.data_type() {
                        DataType::Set => {
                            if item.for_each_tuple(ev, visit)?.is_break() {
                                return Ok(ControlFlow::Break(()));
                            }
                        }
                        DataType::Tuple => {
                            let tuple = match item.evaluate(ev)? {
                                EvalResult::Tuple(t) => t,
                                other => {
                                    return Err(EngineError::Type(format!(
                                        "set constructor expected a tuple, got a {}",
                                        other.category()
                                    )))
                                }
                            };
                            if visit(ev, &tuple)?.is_break() {
                                return Ok(ControlFlow::Break(()));
                            }
                        }
                        _ => {
                            let tuple: Tuple = smallvec![item.evaluate_member(ev)?];
                            if visit(ev, &tuple)?.is_break() {
                                return Ok(ControlFlow::Break(()));
                            }
                        }
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            Calc::CrossJoin { left, right } => {
                // The right side is materialized once; the left streams.
                let right_list = right.evaluate_list(ev)?;
                left.for_each_tuple(ev, &mut |ev, left_tuple| {
                    for right_tuple in &right_list {
                        let mut combined = left_tuple.clone();
                        combined.extend(right_tuple.iter().copied());
                        if visit(ev, &combined)?.is_break() {
                            return Ok(ControlFlow::Break(()));
                        }
                    }
                    Ok(ControlFlow::Continue(()))
                })
            }
            Calc::Except { set, exclusions } => {
                let excluded: AHashSet<Tuple> =
                    exclusions.evaluate_list(ev)?.into_iter().collect();
                set.for_each_tuple(ev, &mut |ev, tuple| {
                    if excluded.contains(tuple) {
                        return Ok(ControlFlow::Continue(()));
                    }
                    visit(ev, tuple)
                })
            }
            Calc::Filter { set, predicate } => {
                let predicate = &**predicate;
                set.for_each_tuple(ev, &mut |ev, tuple| {
                    let keep = ev.with_tuple(tuple, |ev| predicate.evaluate_scalar(ev))?;
                    match keep {
                        CellValue::Bool(true) => visit(ev, tuple),
                        CellValue::Bool(false) | CellValue::Blank => {
                            Ok(ControlFlow::Continue(()))
                        }
                        other => Err(EngineError::Type(format!(
                            "filter predicate must be logical, got {other}"
                        ))),
                    }
                })
            }
            Calc::IterToList { set } => {
                // Drain exactly once, then replay the materialized list.
                let tuples = set.evaluate_list(ev)?;
                for tuple in &tuples {
                    if visit(ev, tuple)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            Calc::MemoCache { .. } => {
                let tuples = self.evaluate_list(ev)?;
                for tuple in &tuples {
                    if visit(ev, tuple)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                Ok(ControlFlow::Continue(()))
            }
            _ => Err(EngineError::Type(format!(
                "cannot iterate a {} expression as a set",
                self.data_type()
            ))),
        }
    }
}

fn numeric_operand(op: &str, position: usize, value: &CellValue) -> EngineResult<f64> {
    value.as_number().ok_or_else(|| EngineError::Type(format!(
        "argument {position} of {op} must be numeric, got {value}"
    )))
}

fn compare_values(op: CompareOp, lhs: &CellValue, rhs: &CellValue) -> EngineResult<bool> {
    use std::cmp::Ordering;

    let ord = match (lhs.as_number(), rhs.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => match (lhs, rhs) {
            (CellValue::Text(l), CellValue::Text(r)) => {
                l.to_ascii_uppercase().cmp(&r.to_ascii_uppercase())
            }
            (CellValue::Blank, CellValue::Blank) => Ordering::Equal,
            // Blank compares unequal (and unordered) against anything else.
            (CellValue::Blank, _) | (_, CellValue::Blank) => {
                return Ok(matches!(op, CompareOp::Ne));
            }
            _ => {
                return Err(EngineError::Type(format!(
                    "cannot compare {lhs} with {rhs}"
                )))
            }
        },
    };

    Ok(match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    })
}

/// Ordered tuple accumulator enforcing the configured result limit
/// (0 = unlimited).
pub(crate) struct TupleBuffer {
    tuples: Vec<Tuple>,
    limit: usize,
}

impl TupleBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            tuples: Vec::new(),
            limit,
        }
    }

    pub(crate) fn push(&mut self, tuple: Tuple) -> EngineResult<()> {
        if self.limit > 0 && self.tuples.len() >= self.limit {
            return Err(EngineError::ResultLimitExceeded {
                attempted: self.tuples.len() + 1,
                limit: self.limit,
            });
        }
        self.tuples.push(tuple);
        Ok(())
    }

    pub(crate) fn into_vec(self) -> Vec<Tuple> {
        self.tuples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_tuple() -> Tuple {
        let mut catalog = mdx_model::Catalog::new();
        let member = catalog.add_measure("m", "m").unwrap();
        smallvec![member]
    }

    #[test]
    fn limit_message_reports_attempt_and_limit() {
        let mut buffer = TupleBuffer::new(30);
        for _ in 0..30 {
            buffer.push(one_tuple()).unwrap();
        }
        let err = buffer.push(one_tuple()).unwrap_err();
        assert_eq!(err.to_string(), "result (31) exceeded limit (30)");
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let mut buffer = TupleBuffer::new(0);
        for _ in 0..50 {
            buffer.push(one_tuple()).unwrap();
        }
        assert_eq!(buffer.into_vec().len(), 50);
    }

    #[test]
    fn current_member_depends_on_its_hierarchy_only() {
        let node = Calc::CurrentMember { hierarchy: 2 };
        assert!(node.depends_on(2));
        assert!(!node.depends_on(1));
    }

    #[test]
    fn cell_read_decouples_pinned_hierarchies() {
        let mut catalog = mdx_model::Catalog::new();
        let member = catalog.add_measure("m", "m").unwrap();
        let node = Calc::CellRead {
            coordinate: Box::new(Calc::MemberRef {
                member,
                hierarchy: 0,
            }),
        };
        // The coordinate pins hierarchy 0, so the read does not depend on it,
        // but it does depend on every other context hierarchy.
        assert!(!node.depends_on(0));
        assert!(node.depends_on(1));
        assert!(node.depends_on(7));
    }
}
