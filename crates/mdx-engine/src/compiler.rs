//! Expression compiler: identifier resolution, overload selection and implicit
//! conversions, turning an [`Ast`] into a reusable [`Calc`] tree.

use crate::ast::Ast;
use crate::calc::{Calc, DependencyList};
use crate::error::{EngineError, EngineResult};
use crate::functions::{FunctionTable, Syntax, Validator};
use crate::types::DataType;
use mdx_model::{CatalogView, CellValue};

pub struct Compiler<'a> {
    catalog: &'a dyn CatalogView,
    table: &'a FunctionTable,
    validator: Validator,
    next_cache_id: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(catalog: &'a dyn CatalogView, table: &'a FunctionTable) -> Self {
        Self {
            catalog,
            table,
            validator: Validator,
            next_cache_id: 0,
        }
    }

    /// Compile an expression to a calc tree.
    pub fn compile(&mut self, ast: &Ast) -> EngineResult<Calc> {
        match ast {
            Ast::Number(n) => Ok(Calc::Literal((*n).into())),
            Ast::Str(s) => Ok(Calc::Literal(CellValue::Text(s.clone()))),
            Ast::Symbol(s) => Ok(Calc::Symbol(s.clone())),
            Ast::Id(segments) => self.compile_id(segments),
            Ast::Call { name, syntax, args } => self.compile_call(name, *syntax, args),
        }
    }

    /// Compile and wrap the root in a memo node so repeated evaluations under
    /// an unchanged context are answered from the evaluator's cache.
    pub fn compile_cached(&mut self, ast: &Ast) -> EngineResult<Calc> {
        let node = self.compile(ast)?;
        Ok(self.cached(node))
    }

    /// Wrap a node in a memo cache keyed on the hierarchies it depends on.
    pub fn cached(&mut self, node: Calc) -> Calc {
        let depends: DependencyList = (0..self.catalog.hierarchy_count())
            .filter(|ordinal| node.depends_on(*ordinal))
            .map(|ordinal| ordinal as u16)
            .collect();
        let id = self.next_cache_id;
        self.next_cache_id += 1;
        Calc::MemoCache {
            id,
            depends,
            node: Box::new(node),
        }
    }

    /// Materialization adapter: lazily iterable sets become explicit
    /// iterate-then-list nodes where a consumer needs random access.
    pub fn ensure_list(&mut self, node: Calc) -> Calc {
        match node.result_style() {
            crate::calc::ResultStyle::Iterable => Calc::IterToList {
                set: Box::new(node),
            },
            _ => node,
        }
    }

    /// Hierarchy ordinal a member-typed node is statically bound to.
    pub fn member_hierarchy(&self, node: &Calc) -> Option<usize> {
        match node {
            Calc::MemberRef { hierarchy, .. } | Calc::CurrentMember { hierarchy } => {
                Some(*hierarchy)
            }
            Calc::MemoCache { node, .. } => self.member_hierarchy(node),
            _ => None,
        }
    }

    fn compile_call(&mut self, name: &str, syntax: Syntax, args: &[Ast]) -> EngineResult<Calc> {
        let mut compiled = Vec::with_capacity(args.len());
        for arg in args {
            compiled.push(self.compile(arg)?);
        }
        let arg_types: Vec<DataType> = compiled.iter().map(Calc::data_type).collect();

        let table = self.table;
        for resolver in table.resolvers_for(name, syntax) {
            if let Some(def) = resolver.resolve(&arg_types, &self.validator) {
                let meta = def.meta().clone();
                let mut converted = Vec::with_capacity(compiled.len());
                for (position, arg) in compiled.into_iter().enumerate() {
                    // Variadic definitions carry no parameter list and take
                    // their arguments unconverted.
                    match meta.parameters.get(position) {
                        Some(param) => {
                            converted.push(self.convert(arg, *param, &meta.atom.name, position)?)
                        }
                        None => converted.push(arg),
                    }
                }
                return def.compile_call(converted, self);
            }
        }

        Err(EngineError::NoApplicableFunction {
            name: name.to_string(),
            syntax,
        })
    }

    /// Insert the implicit conversion from the node's type to `target`.
    /// Scalar widenings are representation no-ops; the structural conversions
    /// wrap the node in a reader.
    fn convert(
        &mut self,
        node: Calc,
        target: DataType,
        function: &str,
        position: usize,
    ) -> EngineResult<Calc> {
        let actual = node.data_type();
        if actual == target {
            return Ok(node);
        }
        if self.validator.conversion_cost(actual, target).is_none() {
            return Err(EngineError::InvalidArgument {
                function: function.to_string(),
                position: position + 1,
                expected: target,
                actual,
            });
        }
        match (actual, target) {
            // Member/tuple in scalar position reads the cell at that
            // coordinate.
            (DataType::Member | DataType::Tuple, DataType::Numeric | DataType::Value) => {
                Ok(Calc::CellRead {
                    coordinate: Box::new(node),
                })
            }
            (DataType::Member, DataType::Tuple) => Ok(Calc::TupleCtor {
                members: vec![node],
            }),
            (DataType::Hierarchy, DataType::Member) => match node {
                Calc::HierarchyRef { hierarchy } => Ok(Calc::CurrentMember { hierarchy }),
                other => Err(EngineError::Type(format!(
                    "cannot take the current member of a computed {} expression",
                    other.data_type()
                ))),
            },
            // Remaining convertible pairs (scalar widenings, logical
            // coercion) keep their representation and coerce at evaluation.
            _ => Ok(node),
        }
    }

    /// Resolve a dotted identifier path against the catalog.
    ///
    /// The head names a hierarchy, dimension (standing for its first
    /// hierarchy) or measure; the tail walks member names, and the final
    /// segment may instead name a level.
    fn compile_id(&mut self, segments: &[String]) -> EngineResult<Calc> {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return Err(EngineError::UnknownIdentifier(String::new())),
        };

        let ordinal = if let Some(hierarchy) = self.catalog.hierarchy_by_name(head) {
            hierarchy.ordinal
        } else if let Some(dimension) = self.catalog.dimension_by_name(head) {
            match dimension.hierarchies.first() {
                Some(ordinal) => *ordinal,
                None => return Err(EngineError::UnknownIdentifier(segments.join("."))),
            }
        } else if let Some(measure) = self.catalog.measure_by_name(head) {
            if !rest.is_empty() {
                return Err(EngineError::UnknownIdentifier(segments.join(".")));
            }
            return Ok(Calc::MemberRef {
                member: measure.member,
                hierarchy: 0,
            });
        } else {
            return Err(EngineError::UnknownIdentifier(segments.join(".")));
        };

        if rest.is_empty() {
            return Ok(Calc::HierarchyRef { hierarchy: ordinal });
        }

        let mut member = None;
        for (index, segment) in rest.iter().enumerate() {
            if let Some(found) = self.catalog.member_by_name(ordinal, segment) {
                member = Some(found.id);
                continue;
            }
            // The final segment may name a level instead of a member.
            let is_last = index + 1 == rest.len();
            let level = self
                .catalog
                .hierarchy(ordinal)
                .and_then(|h| h.level_by_name(segment));
            if let (true, Some(level)) = (is_last, level) {
                return Ok(Calc::LevelRef {
                    hierarchy: ordinal,
                    depth: level.depth,
                });
            }
            return Err(EngineError::UnknownIdentifier(segments.join(".")));
        }

        match member {
            Some(member) => Ok(Calc::MemberRef {
                member,
                hierarchy: ordinal,
            }),
            None => Err(EngineError::UnknownIdentifier(segments.join("."))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Syntax;
    use mdx_model::Catalog;
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.add_measure("Unit Sales", "unit_sales").unwrap();
        c.add_dimension("Time").unwrap();
        c.add_hierarchy("Time", "Time").unwrap();
        c.add_level("Time", "Year", "year").unwrap();
        c.add_level("Time", "Quarter", "quarter").unwrap();
        let y1997 = c.add_member("Time", "1997", 1997i64, None).unwrap();
        c.add_member("Time", "Q1", "Q1", Some(y1997)).unwrap();
        c.add_member("Time", "Q2", "Q2", Some(y1997)).unwrap();
        c
    }

    #[test]
    fn measure_name_resolves_to_a_member_on_the_measures_hierarchy() {
        let catalog = catalog();
        let table = FunctionTable::with_builtins();
        let mut compiler = Compiler::new(&catalog, &table);
        let node = compiler
            .compile(&Ast::id(["Measures", "Unit Sales"]))
            .unwrap();
        match node {
            Calc::MemberRef { hierarchy, .. } => assert_eq!(hierarchy, 0),
            other => panic!("expected a member reference, got {other:?}"),
        }
    }

    #[test]
    fn trailing_level_segment_resolves_to_a_level() {
        let catalog = catalog();
        let table = FunctionTable::with_builtins();
        let mut compiler = Compiler::new(&catalog, &table);
        let node = compiler.compile(&Ast::id(["Time", "Quarter"])).unwrap();
        match node {
            Calc::LevelRef { hierarchy, depth } => {
                assert_eq!(hierarchy, 1);
                assert_eq!(depth, 1);
            }
            other => panic!("expected a level reference, got {other:?}"),
        }
    }

    #[test]
    fn unknown_identifier_is_a_compile_error() {
        let catalog = catalog();
        let table = FunctionTable::with_builtins();
        let mut compiler = Compiler::new(&catalog, &table);
        let err = compiler
            .compile(&Ast::id(["Time", "1997", "Q9"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown identifier: Time.1997.Q9");
    }

    #[test]
    fn no_overload_match_reports_name_and_syntax() {
        let catalog = catalog();
        let table = FunctionTable::with_builtins();
        let mut compiler = Compiler::new(&catalog, &table);
        // A set has no numeric conversion, so `+` cannot apply.
        let ast = Ast::infix(
            "+",
            Ast::property(Ast::id(["Time", "Quarter"]), "Members"),
            Ast::Number(1.0),
        );
        let err = compiler.compile(&ast).unwrap_err();
        match err {
            EngineError::NoApplicableFunction { name, syntax } => {
                assert_eq!(name, "+");
                assert_eq!(syntax, Syntax::Infix);
            }
            other => panic!("expected a resolution failure, got {other}"),
        }
    }

    #[test]
    fn member_in_numeric_position_becomes_a_cell_read() {
        let catalog = catalog();
        let table = FunctionTable::with_builtins();
        let mut compiler = Compiler::new(&catalog, &table);
        let node = compiler
            .compile(&Ast::infix(
                "*",
                Ast::id(["Unit Sales"]),
                Ast::Number(2.0),
            ))
            .unwrap();
        match node {
            Calc::Arith { left, .. } => {
                assert!(matches!(*left, Calc::CellRead { .. }));
            }
            other => panic!("expected arithmetic, got {other:?}"),
        }
    }

    #[test]
    fn memo_wrapper_records_only_live_dependencies() {
        let catalog = catalog();
        let table = FunctionTable::with_builtins();
        let mut compiler = Compiler::new(&catalog, &table);
        // Reading a named measure pins hierarchy 0, so the value depends only
        // on the Time hierarchy.
        let node = compiler
            .compile_cached(&Ast::infix(
                "*",
                Ast::id(["Unit Sales"]),
                Ast::Number(2.0),
            ))
            .unwrap();
        match node {
            Calc::MemoCache { depends, .. } => {
                assert_eq!(depends.as_slice(), &[1u16]);
            }
            other => panic!("expected a memo wrapper, got {other:?}"),
        }
    }
}
