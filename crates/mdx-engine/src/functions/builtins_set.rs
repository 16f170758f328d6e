//! Set functions and the brace/paren constructors: `CrossJoin`, `Except`,
//! `Filter`, `Sum`, `Count`, `{...}` and `(...)`.

use super::{
    BuiltinDef, FunctionDefinition, FunctionMetaData, FunctionTable, OperationAtom, Resolver,
    SimpleResolver, Syntax, Validator,
};
use crate::calc::Calc;
use crate::compiler::Compiler;
use crate::error::{EngineError, EngineResult};
use crate::types::DataType;

pub(super) fn register(table: &mut FunctionTable) {
    let crossjoin = OperationAtom::function("CrossJoin");
    table.register(Box::new(SimpleResolver::new(
        crossjoin.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: crossjoin,
                description: "Cross product of two sets, in left-major order.",
                returns: DataType::Set,
                parameters: vec![DataType::Set, DataType::Set],
            },
            compile_crossjoin,
        )],
    )));

    let except = OperationAtom::function("Except");
    table.register(Box::new(SimpleResolver::new(
        except.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: except,
                description: "Tuples of the first set absent from the second, order preserved.",
                returns: DataType::Set,
                parameters: vec![DataType::Set, DataType::Set],
            },
            compile_except,
        )],
    )));

    let filter = OperationAtom::function("Filter");
    table.register(Box::new(SimpleResolver::new(
        filter.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: filter,
                description: "Tuples of a set for which the predicate holds.",
                returns: DataType::Set,
                parameters: vec![DataType::Set, DataType::Logical],
            },
            compile_filter,
        )],
    )));

    let sum = OperationAtom::function("Sum");
    table.register(Box::new(SimpleResolver::new(
        sum.clone(),
        vec![
            BuiltinDef::new(
                FunctionMetaData {
                    atom: sum.clone(),
                    description: "Sums the cells of a set under the current context.",
                    returns: DataType::Numeric,
                    parameters: vec![DataType::Set],
                },
                compile_sum,
            ),
            BuiltinDef::new(
                FunctionMetaData {
                    atom: sum,
                    description: "Sums an expression evaluated over a set.",
                    returns: DataType::Numeric,
                    parameters: vec![DataType::Set, DataType::Numeric],
                },
                compile_sum,
            ),
        ],
    )));

    let count = OperationAtom::function("Count");
    table.register(Box::new(SimpleResolver::new(
        count.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: count,
                description: "Number of tuples in a set.",
                returns: DataType::Numeric,
                parameters: vec![DataType::Set],
            },
            compile_count,
        )],
    )));

    table.register(Box::new(BracesResolver::new()));
    table.register(Box::new(ParenthesesResolver::new()));
}

fn two(mut args: Vec<Calc>, function: &str) -> EngineResult<(Calc, Calc)> {
    if args.len() != 2 {
        return Err(EngineError::Type(format!(
            "{function} expects 2 arguments, got {}",
            args.len()
        )));
    }
    let pair = args.pop().and_then(|r| args.pop().map(|l| (l, r)));
    pair.ok_or_else(|| EngineError::Type(format!("{function} expects 2 arguments")))
}

fn compile_crossjoin(args: Vec<Calc>, compiler: &mut Compiler<'_>) -> EngineResult<Calc> {
    let (left, right) = two(args, "CrossJoin")?;
    // The left side streams; the right is replayed per left tuple and must be
    // materializable.
    Ok(Calc::CrossJoin {
        left: Box::new(left),
        right: Box::new(compiler.ensure_list(right)),
    })
}

fn compile_except(args: Vec<Calc>, compiler: &mut Compiler<'_>) -> EngineResult<Calc> {
    let (set, exclusions) = two(args, "Except")?;
    Ok(Calc::Except {
        set: Box::new(set),
        exclusions: Box::new(compiler.ensure_list(exclusions)),
    })
}

fn compile_filter(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    let (set, predicate) = two(args, "Filter")?;
    Ok(Calc::Filter {
        set: Box::new(set),
        predicate: Box::new(predicate),
    })
}

fn compile_sum(mut args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    match args.len() {
        1 => Ok(Calc::SumSet {
            set: Box::new(args.remove(0)),
            value: None,
        }),
        2 => {
            let value = args.pop();
            let set = args.pop();
            match (set, value) {
                (Some(set), Some(value)) => Ok(Calc::SumSet {
                    set: Box::new(set),
                    value: Some(Box::new(value)),
                }),
                _ => Err(EngineError::Type("Sum expects 1 or 2 arguments".to_string())),
            }
        }
        n => Err(EngineError::Type(format!(
            "Sum expects 1 or 2 arguments, got {n}"
        ))),
    }
}

fn compile_count(mut args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    let set = args
        .pop()
        .ok_or_else(|| EngineError::Type("Count expects 1 argument".to_string()))?;
    Ok(Calc::CountSet { set: Box::new(set) })
}

/// Variadic `{...}` constructor: members, tuples and sets, spliced in order.
/// Arity and element kinds are checked in `resolve`; the definition carries no
/// parameter list, so arguments reach the compile step unconverted.
struct BracesResolver {
    atom: OperationAtom,
    def: BuiltinDef,
}

impl BracesResolver {
    fn new() -> Self {
        let atom = OperationAtom::new("{}", Syntax::Braces);
        Self {
            atom: atom.clone(),
            def: BuiltinDef::new(
                FunctionMetaData {
                    atom,
                    description: "Constructs a set from members, tuples and sets.",
                    returns: DataType::Set,
                    parameters: Vec::new(),
                },
                compile_braces,
            ),
        }
    }
}

impl Resolver for BracesResolver {
    fn atom(&self) -> &OperationAtom {
        &self.atom
    }

    fn resolve(&self, args: &[DataType], _: &Validator) -> Option<&dyn FunctionDefinition> {
        let all_elements = args
            .iter()
            .all(|t| matches!(t, DataType::Member | DataType::Tuple | DataType::Set));
        all_elements.then_some(&self.def as &dyn FunctionDefinition)
    }
}

fn compile_braces(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    Ok(Calc::SetUnion { items: args })
}

/// `(...)` constructor: a tuple when every argument is a member, transparent
/// grouping when it wraps a single non-member expression.
struct ParenthesesResolver {
    atom: OperationAtom,
    tuple_def: BuiltinDef,
    grouping_def: BuiltinDef,
}

impl ParenthesesResolver {
    fn new() -> Self {
        let atom = OperationAtom::new("()", Syntax::Parentheses);
        Self {
            atom: atom.clone(),
            tuple_def: BuiltinDef::new(
                FunctionMetaData {
                    atom: atom.clone(),
                    description: "Constructs a tuple from members.",
                    returns: DataType::Tuple,
                    parameters: Vec::new(),
                },
                compile_tuple,
            ),
            grouping_def: BuiltinDef::new(
                FunctionMetaData {
                    atom,
                    description: "Transparent grouping of a single expression.",
                    returns: DataType::Value,
                    parameters: Vec::new(),
                },
                compile_grouping,
            ),
        }
    }
}

impl Resolver for ParenthesesResolver {
    fn atom(&self) -> &OperationAtom {
        &self.atom
    }

    fn resolve(&self, args: &[DataType], _: &Validator) -> Option<&dyn FunctionDefinition> {
        if !args.is_empty() && args.iter().all(|t| *t == DataType::Member) {
            return Some(&self.tuple_def);
        }
        if args.len() == 1 {
            return Some(&self.grouping_def);
        }
        None
    }
}

fn compile_tuple(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    Ok(Calc::TupleCtor { members: args })
}

fn compile_grouping(mut args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    args.pop()
        .ok_or_else(|| EngineError::Type("() expects 1 expression".to_string()))
}
