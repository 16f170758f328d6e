//! Dimensional catalog metadata for the mdx engine.
//!
//! This crate holds the read-only model a query executes against: dimensions,
//! hierarchies, levels, members and measures, plus the [`CellValue`] scalar type
//! used both for cell results and for segment axis coordinates. The engine and
//! cache crates consume it through the [`CatalogView`] trait and never mutate it
//! after construction.

#![forbid(unsafe_code)]

mod catalog;
mod value;

pub use crate::catalog::{
    Catalog, CatalogView, Dimension, Hierarchy, Level, Measure, Member, MemberId, ModelError,
    ModelResult, MEASURES_HIERARCHY,
};
pub use crate::value::CellValue;
