//! Scalar operators: infix arithmetic, prefix negation, comparisons and
//! `CoalesceEmpty`.

use super::{BuiltinDef, FunctionMetaData, FunctionTable, OperationAtom, SimpleResolver, Syntax};
use crate::calc::{ArithOp, Calc, CompareOp};
use crate::compiler::Compiler;
use crate::error::{EngineError, EngineResult};
use crate::types::DataType;

pub(super) fn register(table: &mut FunctionTable) {
    register_arith(table, "+", "Adds two numbers.", compile_add);
    register_arith(table, "-", "Subtracts two numbers.", compile_sub);
    register_arith(table, "*", "Multiplies two numbers.", compile_mul);
    register_arith(table, "/", "Divides two numbers.", compile_div);

    table.register(Box::new(SimpleResolver::new(
        OperationAtom::new("-", Syntax::Prefix),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: OperationAtom::new("-", Syntax::Prefix),
                description: "Negates a number.",
                returns: DataType::Numeric,
                parameters: vec![DataType::Numeric],
            },
            compile_neg,
        )],
    )));

    register_compare(table, "=", "Equal to.", compile_eq);
    register_compare(table, "<>", "Not equal to.", compile_ne);
    register_compare(table, "<", "Less than.", compile_lt);
    register_compare(table, "<=", "Less than or equal to.", compile_le);
    register_compare(table, ">", "Greater than.", compile_gt);
    register_compare(table, ">=", "Greater than or equal to.", compile_ge);

    let coalesce = OperationAtom::function("CoalesceEmpty");
    table.register(Box::new(SimpleResolver::new(
        coalesce.clone(),
        vec![
            BuiltinDef::new(
                FunctionMetaData {
                    atom: coalesce.clone(),
                    description: "Coalesces an empty numeric value to a fallback.",
                    returns: DataType::Numeric,
                    parameters: vec![DataType::Numeric, DataType::Numeric],
                },
                compile_coalesce,
            ),
            BuiltinDef::new(
                FunctionMetaData {
                    atom: coalesce,
                    description: "Coalesces an empty string value to a fallback.",
                    returns: DataType::String,
                    parameters: vec![DataType::String, DataType::String],
                },
                compile_coalesce,
            ),
        ],
    )));
}

fn register_arith(
    table: &mut FunctionTable,
    name: &'static str,
    description: &'static str,
    compile: super::CompileFn,
) {
    let atom = OperationAtom::infix(name);
    table.register(Box::new(SimpleResolver::new(
        atom.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom,
                description,
                returns: DataType::Numeric,
                parameters: vec![DataType::Numeric, DataType::Numeric],
            },
            compile,
        )],
    )));
}

fn register_compare(
    table: &mut FunctionTable,
    name: &'static str,
    description: &'static str,
    compile: super::CompileFn,
) {
    let atom = OperationAtom::infix(name);
    table.register(Box::new(SimpleResolver::new(
        atom.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom,
                description,
                returns: DataType::Logical,
                parameters: vec![DataType::Value, DataType::Value],
            },
            compile,
        )],
    )));
}

fn two(mut args: Vec<Calc>, function: &str) -> EngineResult<(Calc, Calc)> {
    if args.len() != 2 {
        return Err(EngineError::Type(format!(
            "{function} expects 2 arguments, got {}",
            args.len()
        )));
    }
    let right = args.pop().and_then(|r| args.pop().map(|l| (l, r)));
    right.ok_or_else(|| EngineError::Type(format!("{function} expects 2 arguments")))
}

fn arith(op: ArithOp, args: Vec<Calc>) -> EngineResult<Calc> {
    let (left, right) = two(args, op.symbol())?;
    Ok(Calc::Arith {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn compare(op: CompareOp, args: Vec<Calc>) -> EngineResult<Calc> {
    let (left, right) = two(args, op.symbol())?;
    Ok(Calc::Compare {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn compile_add(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    arith(ArithOp::Add, args)
}

fn compile_sub(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    arith(ArithOp::Sub, args)
}

fn compile_mul(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    arith(ArithOp::Mul, args)
}

fn compile_div(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    arith(ArithOp::Div, args)
}

fn compile_neg(mut args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    let value = args
        .pop()
        .ok_or_else(|| EngineError::Type("unary - expects 1 argument".to_string()))?;
    Ok(Calc::Neg {
        value: Box::new(value),
    })
}

fn compile_eq(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    compare(CompareOp::Eq, args)
}

fn compile_ne(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    compare(CompareOp::Ne, args)
}

fn compile_lt(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    compare(CompareOp::Lt, args)
}

fn compile_le(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    compare(CompareOp::Le, args)
}

fn compile_gt(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    compare(CompareOp::Gt, args)
}

fn compile_ge(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    compare(CompareOp::Ge, args)
}

fn compile_coalesce(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    let (value, fallback) = two(args, "CoalesceEmpty")?;
    Ok(Calc::CoalesceEmpty {
        value: Box::new(value),
        fallback: Box::new(fallback),
    })
}
