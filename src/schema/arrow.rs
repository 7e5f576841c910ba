// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
use std::sync::Arc;

use crate::record::Metric;

/// Identifier columns of the canonical table, in snapshot order.
///
/// - State, StateAbr, County, FIPS → Utf8 (FIPS must never become numeric)
/// - Year                          → Int32
pub const IDENTIFIER_COLUMNS: [(&str, DataType); 5] = [
    ("State", DataType::Utf8),
    ("StateAbr", DataType::Utf8),
    ("County", DataType::Utf8),
    ("FIPS", DataType::Utf8),
    ("Year", DataType::Int32),
];

/// Arrow schema of the canonical table: identifiers, then one Float64
/// column per [`Metric`] in `Metric::ALL` order.
pub fn canonical_schema() -> Arc<ArrowSchema> {
    let mut fields: Vec<ArrowField> = IDENTIFIER_COLUMNS
        .iter()
        .map(|(name, dt)| ArrowField::new(*name, dt.clone(), false))
        .collect();
    fields.extend(
        Metric::ALL
            .iter()
            .map(|m| ArrowField::new(m.column_name(), DataType::Float64, false)),
    );
    Arc::new(ArrowSchema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fips_column_is_utf8() {
        let schema = canonical_schema();
        assert_eq!(
            schema.field_with_name("FIPS").unwrap().data_type(),
            &DataType::Utf8
        );
        assert_eq!(schema.fields().len(), 5 + Metric::ALL.len());
    }
}
