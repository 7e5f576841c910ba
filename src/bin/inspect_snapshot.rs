use anyhow::{bail, Context, Result};
use ckdscope::snapshot;
use parquet::file::metadata::RowGroupMetaData;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::schema::types::Type;
use std::{env, fs::File, path::Path};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        bail!("Usage: {} <SNAPSHOT_FILE>", args[0]);
    }
    inspect(Path::new(&args[1]))
}

fn inspect(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("reading parquet footer")?;
    let meta = reader.metadata();
    let file_meta = meta.file_metadata();

    println!("=== Snapshot: {} ===", path.display());
    println!(
        "Created by:           {}",
        file_meta.created_by().unwrap_or("<unknown>")
    );
    println!("Total rows:           {}", file_meta.num_rows());
    println!("Number of row groups: {}", meta.num_row_groups());
    println!("Size on disk:         {} bytes", std::fs::metadata(path)?.len());
    match snapshot::read_meta(path)? {
        Some(m) => println!(
            "Written at:           {} ({} rows, years {:?})",
            m.written_at.to_rfc3339(),
            m.rows,
            m.years
        ),
        None => println!("Written at:           <no sidecar>"),
    }
    println!();

    println!("=== Schema ===");
    print_schema(file_meta.schema_descr().root_schema(), 0);
    println!();

    for idx in 0..meta.num_row_groups() {
        print_row_group(idx, meta.row_group(idx));
    }

    // Full decode also checks the columns against the canonical layout.
    let table = snapshot::read(path).context("snapshot does not match the canonical schema")?;
    println!(
        "Canonical check:      ok ({} records, years {:?})",
        table.len(),
        table.years()
    );
    Ok(())
}

fn print_schema(node: &Type, level: usize) {
    let indent = "  ".repeat(level);
    match node {
        Type::PrimitiveType {
            basic_info,
            physical_type,
            ..
        } => {
            let logical = basic_info
                .logical_type()
                .as_ref()
                .map_or(String::new(), |lt| format!(", {:?}", lt));
            println!("{}- {}: {:?}{}", indent, basic_info.name(), physical_type, logical);
        }
        Type::GroupType {
            basic_info, fields, ..
        } => {
            println!("{}+ {} (group)", indent, basic_info.name());
            for field in fields {
                print_schema(field.as_ref(), level + 1);
            }
        }
    }
}

fn print_row_group(idx: usize, rg: &RowGroupMetaData) {
    println!("--- Row Group {} ---", idx);
    println!("  Rows:              {}", rg.num_rows());
    println!("  Uncompressed size: {} bytes", rg.total_byte_size());
    for col in rg.columns() {
        let nulls = col
            .statistics()
            .and_then(|s| s.null_count_opt())
            .map_or("?".to_string(), |n| n.to_string());
        println!(
            "  > {:<20} {:?} compressed {} / {} bytes, nulls {}",
            col.column_descr().name(),
            col.compression(),
            col.compressed_size(),
            col.uncompressed_size(),
            nulls
        );
    }
    println!();
}
