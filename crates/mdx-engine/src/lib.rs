//! Analytical expression engine: compiles parsed multidimensional queries
//! into reusable calculation trees and evaluates them against a catalog and a
//! cell store.
//!
//! The pipeline is compile-then-evaluate. [`Compiler`] resolves identifiers
//! against a [`mdx_model::CatalogView`], selects function overloads from a
//! [`FunctionTable`] by implicit-conversion cost, and produces an immutable
//! [`Calc`] tree. [`Evaluator`] owns all mutable state for one execution: the
//! current-member context with its frame stack, slicer pins, a memo cache and
//! diagnostics counters. Cell reads go through the [`CellReader`] seam;
//! [`SegmentCellReader`] bridges it to the segment cache.

#![forbid(unsafe_code)]

mod ast;
mod calc;
mod cell;
mod compiler;
mod config;
mod error;
mod eval;
pub mod functions;
mod types;

pub use ast::Ast;
pub use calc::{ArithOp, Calc, CompareOp, DependencyList, EvalResult, ResultStyle, Tuple};
pub use cell::{CellReader, SegmentCellReader};
pub use compiler::Compiler;
pub use config::{AlertPolicy, EvalConfig};
pub use error::{EngineError, EngineResult};
pub use eval::{evaluate, EvalStats, Evaluator};
pub use functions::{
    FunctionDefinition, FunctionMetaData, FunctionTable, OperationAtom, Resolver, Syntax,
};
pub use types::{conversion_cost, DataType};
