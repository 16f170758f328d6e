//! Shared fixture: a small sales catalog and an in-memory fact backend.

use mdx_cache::{
    AggregateLoader, SegmentAxis, SegmentBody, SegmentBodyBuilder, SegmentHeader,
    SegmentLoadError,
};
use mdx_model::{Catalog, CellValue};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Row {
    pub year: i64,
    pub quarter: &'static str,
    pub country: &'static str,
    pub unit_sales: f64,
}

/// Measures: Unit Sales. Time: Year/Quarter with 1997 -> Q1..Q4.
/// Store: Country with USA, Mexico, Canada (USA is the default).
pub fn sales_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add_measure("Unit Sales", "unit_sales").unwrap();

    catalog.add_dimension("Time").unwrap();
    catalog.add_hierarchy("Time", "Time").unwrap();
    catalog.add_level("Time", "Year", "year").unwrap();
    catalog.add_level("Time", "Quarter", "quarter").unwrap();
    let y1997 = catalog.add_member("Time", "1997", 1997i64, None).unwrap();
    for quarter in ["Q1", "Q2", "Q3", "Q4"] {
        catalog
            .add_member("Time", quarter, quarter, Some(y1997))
            .unwrap();
    }

    catalog.add_dimension("Store").unwrap();
    catalog.add_hierarchy("Store", "Store").unwrap();
    catalog.add_level("Store", "Country", "country").unwrap();
    for country in ["USA", "Mexico", "Canada"] {
        catalog
            .add_member("Store", country, country, None)
            .unwrap();
    }

    catalog
}

/// USA sells 10/20/30/40 across the quarters; Mexico 5 and 15 in the first
/// two; Canada sells nothing.
pub fn sales_rows() -> Vec<Row> {
    [
        (1997, "Q1", "USA", 10.0),
        (1997, "Q2", "USA", 20.0),
        (1997, "Q3", "USA", 30.0),
        (1997, "Q4", "USA", 40.0),
        (1997, "Q1", "Mexico", 5.0),
        (1997, "Q2", "Mexico", 15.0),
    ]
    .into_iter()
    .map(|(year, quarter, country, unit_sales)| Row {
        year,
        quarter,
        country,
        unit_sales,
    })
    .collect()
}

/// Aggregating loader over the in-memory rows; counts backend round trips.
pub struct FactLoader {
    rows: Vec<Row>,
    pub calls: AtomicUsize,
}

impl FactLoader {
    pub fn new() -> Self {
        Self {
            rows: sales_rows(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn column_value(row: &Row, column: &str) -> CellValue {
    match column {
        "year" => row.year.into(),
        "quarter" => row.quarter.into(),
        "country" => row.country.into(),
        other => panic!("fixture has no column {other}"),
    }
}

impl AggregateLoader for FactLoader {
    fn load(&self, header: &SegmentHeader) -> Result<SegmentBody, SegmentLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut axes = Vec::new();
        for constraint in header.constraints() {
            let values: Vec<CellValue> = match &constraint.values {
                Some(set) => set.iter().cloned().collect(),
                None => self
                    .rows
                    .iter()
                    .map(|row| column_value(row, &constraint.column))
                    .collect(),
            };
            axes.push(SegmentAxis::new(values));
        }

        let mut totals: Vec<(Vec<CellValue>, f64)> = Vec::new();
        'rows: for row in &self.rows {
            let mut coord = Vec::new();
            for constraint in header.constraints() {
                let value = column_value(row, &constraint.column);
                if let Some(set) = &constraint.values {
                    if !set.contains(&value) {
                        continue 'rows;
                    }
                }
                coord.push(value);
            }
            match totals.iter_mut().find(|(existing, _)| *existing == coord) {
                Some((_, total)) => *total += row.unit_sales,
                None => totals.push((coord, row.unit_sales)),
            }
        }

        let mut builder = SegmentBodyBuilder::new(axes);
        for (coord, total) in totals {
            builder.set(&coord, total);
        }
        Ok(builder.build())
    }
}
