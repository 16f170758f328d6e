//! End-to-end compile/evaluate coverage against the in-memory sales fixture.

mod common;

use common::FactLoader;
use mdx_cache::SegmentCacheIndex;
use mdx_engine::{
    Ast, Compiler, EngineError, EvalConfig, EvalResult, Evaluator, FunctionTable,
    SegmentCellReader, Tuple,
};
use mdx_model::{CatalogView, CellValue, MemberId};
use pretty_assertions::assert_eq;

fn member(catalog: &dyn CatalogView, ordinal: usize, name: &str) -> MemberId {
    catalog
        .member_by_name(ordinal, name)
        .unwrap_or_else(|| panic!("fixture member {name} missing"))
        .id
}

fn value(n: f64) -> EvalResult {
    EvalResult::Value(CellValue::from(n))
}

#[test]
fn literal_arithmetic_is_stable_across_evaluations() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    let node = Compiler::new(&catalog, &table)
        .compile(&Ast::infix("*", Ast::Number(3.0), Ast::Number(4.0)))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    assert_eq!(node.evaluate(&mut ev).unwrap(), value(12.0));
    assert_eq!(node.evaluate(&mut ev).unwrap(), value(12.0));
}

#[test]
fn measure_reads_aggregate_under_the_default_context() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    // Default context: 1997, USA.
    let node = Compiler::new(&catalog, &table)
        .compile(&Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(2.0)))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    assert_eq!(node.evaluate(&mut ev).unwrap(), value(200.0));
}

#[test]
fn tuple_coordinate_pins_the_context_and_restores_it() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);
    let mut compiler = Compiler::new(&catalog, &table);

    let q1_sales = compiler
        .compile(&Ast::infix(
            "*",
            Ast::parens(vec![
                Ast::id(["Measures", "Unit Sales"]),
                Ast::id(["Time", "Q1"]),
            ]),
            Ast::Number(1.0),
        ))
        .unwrap();
    let default_sales = compiler
        .compile(&Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(1.0)))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    assert_eq!(q1_sales.evaluate(&mut ev).unwrap(), value(10.0));
    // The pinned quarter must not leak into later evaluations.
    assert_eq!(default_sales.evaluate(&mut ev).unwrap(), value(100.0));
}

#[test]
fn filter_keeps_quarters_over_the_threshold() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    let node = Compiler::new(&catalog, &table)
        .compile(&Ast::call(
            "Count",
            vec![Ast::call(
                "Filter",
                vec![
                    Ast::property(Ast::id(["Time", "Quarter"]), "Members"),
                    Ast::infix(">", Ast::id(["Unit Sales"]), Ast::Number(15.0)),
                ],
            )],
        ))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    // USA quarters over 15: Q2, Q3, Q4.
    assert_eq!(node.evaluate(&mut ev).unwrap(), EvalResult::Value(3i64.into()));
}

#[test]
fn sum_totals_cells_and_expressions() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);
    let mut compiler = Compiler::new(&catalog, &table);

    let quarters = Ast::property(Ast::id(["Time", "Quarter"]), "Members");
    let plain = compiler
        .compile(&Ast::call("Sum", vec![quarters.clone()]))
        .unwrap();
    let with_expr = compiler
        .compile(&Ast::call(
            "Sum",
            vec![
                quarters,
                Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(2.0)),
            ],
        ))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    assert_eq!(plain.evaluate(&mut ev).unwrap(), value(100.0));
    assert_eq!(with_expr.evaluate(&mut ev).unwrap(), value(200.0));
}

#[test]
fn crossjoin_is_left_major_and_except_preserves_order() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);
    let mut compiler = Compiler::new(&catalog, &table);

    let cross = compiler
        .compile(&Ast::call(
            "CrossJoin",
            vec![
                Ast::property(Ast::id(["Time", "Quarter"]), "Members"),
                Ast::property(Ast::id(["Store"]), "Members"),
            ],
        ))
        .unwrap();
    let except = compiler
        .compile(&Ast::call(
            "Except",
            vec![
                Ast::property(Ast::id(["Time", "Quarter"]), "Members"),
                Ast::braces(vec![Ast::id(["Time", "Q2"]), Ast::id(["Time", "Q3"])]),
            ],
        ))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    let q1 = member(&catalog, 1, "Q1");
    let q4 = member(&catalog, 1, "Q4");
    let usa = member(&catalog, 2, "USA");
    let mexico = member(&catalog, 2, "Mexico");

    match cross.evaluate(&mut ev).unwrap() {
        EvalResult::Set(tuples) => {
            assert_eq!(tuples.len(), 12);
            assert_eq!(tuples[0], Tuple::from_slice(&[q1, usa]));
            assert_eq!(tuples[1], Tuple::from_slice(&[q1, mexico]));
            assert_eq!(tuples[3], Tuple::from_slice(&[member(&catalog, 1, "Q2"), usa]));
        }
        other => panic!("expected a set, got {other:?}"),
    }

    match except.evaluate(&mut ev).unwrap() {
        EvalResult::Set(tuples) => {
            assert_eq!(
                tuples,
                vec![Tuple::from_slice(&[q1]), Tuple::from_slice(&[q4])]
            );
        }
        other => panic!("expected a set, got {other:?}"),
    }
}

#[test]
fn result_limit_aborts_oversized_sets() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    let cross = Compiler::new(&catalog, &table)
        .compile(&Ast::call(
            "CrossJoin",
            vec![
                Ast::property(Ast::id(["Time", "Quarter"]), "Members"),
                Ast::property(Ast::id(["Store"]), "Members"),
            ],
        ))
        .unwrap();

    let mut limited = Evaluator::new(
        &catalog,
        &reader,
        EvalConfig::default().with_result_limit(5),
    )
    .unwrap();
    let err = cross.evaluate(&mut limited).unwrap_err();
    assert_eq!(err.to_string(), "result (6) exceeded limit (5)");

    let mut unlimited = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();
    match cross.evaluate(&mut unlimited).unwrap() {
        EvalResult::Set(tuples) => assert_eq!(tuples.len(), 12),
        other => panic!("expected a set, got {other:?}"),
    }
}

#[test]
fn memoized_roots_recompute_once_per_context() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    let node = Compiler::new(&catalog, &table)
        .compile_cached(&Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(2.0)))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    for _ in 0..3 {
        assert_eq!(node.evaluate(&mut ev).unwrap(), value(200.0));
    }
    let stats = ev.stats();
    assert_eq!(stats.memo_misses, 1);
    assert_eq!(stats.memo_hits, 2);
    assert_eq!(stats.cells_read, 1);
}

#[test]
fn memoization_respects_context_changes() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    let node = Compiler::new(&catalog, &table)
        .compile_cached(&Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(2.0)))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();
    let q1 = member(&catalog, 1, "Q1");

    assert_eq!(node.evaluate(&mut ev).unwrap(), value(200.0));

    ev.push_frame();
    ev.set_context(q1).unwrap();
    assert_eq!(node.evaluate(&mut ev).unwrap(), value(20.0));
    ev.pop_frame();

    // Back under the original context the cached value is correct, not stale.
    assert_eq!(node.evaluate(&mut ev).unwrap(), value(200.0));
    assert_eq!(ev.stats().memo_misses, 2);
    assert_eq!(ev.stats().memo_hits, 1);
}

#[test]
fn repeated_reads_hit_the_resident_segment() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);

    // Deliberately uncached: every evaluation reads the cell again.
    let node = Compiler::new(&catalog, &table)
        .compile(&Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(2.0)))
        .unwrap();
    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();

    assert_eq!(node.evaluate(&mut ev).unwrap(), value(200.0));
    assert_eq!(node.evaluate(&mut ev).unwrap(), value(200.0));
    assert_eq!(ev.stats().cells_read, 2);
    assert_eq!(loader.call_count(), 1);
}

#[test]
fn empty_cells_propagate_and_coalesce() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let index = SegmentCacheIndex::new();
    let loader = FactLoader::new();
    let reader = SegmentCellReader::new(&index, &loader);
    let mut compiler = Compiler::new(&catalog, &table);

    let doubled = compiler
        .compile(&Ast::infix("*", Ast::id(["Unit Sales"]), Ast::Number(2.0)))
        .unwrap();
    let coalesced = compiler
        .compile(&Ast::call(
            "CoalesceEmpty",
            vec![Ast::id(["Unit Sales"]), Ast::Number(0.0)],
        ))
        .unwrap();

    let mut ev = Evaluator::new(&catalog, &reader, EvalConfig::default()).unwrap();
    ev.pin_slicer(&[member(&catalog, 2, "Canada")]).unwrap();

    // Canada has no facts: the cell is empty, and emptiness propagates
    // through arithmetic rather than turning into zero.
    assert_eq!(
        doubled.evaluate(&mut ev).unwrap(),
        EvalResult::Value(CellValue::Blank)
    );
    assert_eq!(coalesced.evaluate(&mut ev).unwrap(), value(0.0));
}

#[test]
fn unknown_function_is_a_compile_error() {
    let catalog = common::sales_catalog();
    let table = FunctionTable::with_builtins();
    let err = Compiler::new(&catalog, &table)
        .compile(&Ast::call("Median", vec![Ast::Number(1.0)]))
        .unwrap_err();
    assert!(matches!(err, EngineError::NoApplicableFunction { .. }));
}
