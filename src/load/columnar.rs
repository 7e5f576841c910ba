use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::RawTable;
use crate::error::Result;

/// Read a parquet snapshot into a string table. Values are rendered with
/// arrow's display formatter; nulls become empty strings.
pub fn read(bytes: Bytes) -> Result<RawTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.with_batch_size(8192).build()?;

    let options = FormatOptions::default();
    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let formatters = batch
            .columns()
            .iter()
            .map(|col| ArrayFormatter::try_new(col.as_ref(), &options))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for row in 0..batch.num_rows() {
            rows.push(
                formatters
                    .iter()
                    .map(|f| f.value(row).to_string())
                    .collect(),
            );
        }
    }

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    #[test]
    fn numeric_columns_render_as_text_and_nulls_as_empty() -> anyhow::Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("fips", DataType::Int64, false),
            Field::new("unemp", DataType::Float64, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![6037, 1001])) as ArrayRef,
                Arc::new(Float64Array::from(vec![Some(5.5), None])) as ArrayRef,
                Arc::new(StringArray::from(vec![Some("Los Angeles"), None])) as ArrayRef,
            ],
        )?;
        let mut buf = Vec::new();
        {
            let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
            writer.write(&batch)?;
            writer.close()?;
        }

        let t = read(Bytes::from(buf))?;
        assert_eq!(t.headers, vec!["fips", "unemp", "name"]);
        assert_eq!(t.rows[0], vec!["6037", "5.5", "Los Angeles"]);
        assert_eq!(t.rows[1], vec!["1001", "", ""]);
        Ok(())
    }
}
