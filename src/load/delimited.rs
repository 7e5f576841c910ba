use csv::ReaderBuilder;
use std::io::Cursor;

use super::RawTable;
use crate::error::{Error, Result};
use crate::schema::Dataset;

/// Read comma- or tab-delimited text with a header row. Every cell stays a
/// string here; typing happens per dataset once columns are resolved.
pub fn read(dataset: Dataset, delimiter: u8, data: &[u8]) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true) // short trailing rows read as empty cells
        .from_reader(Cursor::new(data));

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| Error::malformed(dataset.as_str(), 0, "<header>", &e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            Error::malformed(dataset.as_str(), idx + 1, "<record>", &e.to_string())
        })?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_keeps_leading_zeros_and_skips_blank_lines() {
        let tsv = "CountyName\tStateName\tCountyFIPS\tStateAbbr\n\
                   Los Angeles\tCalifornia\t06037\tCA\n\
                   \t\t\t\n\
                   Autauga\tAlabama\t01001\tAL\n";
        let t = read(Dataset::Crosswalk, b'\t', tsv.as_bytes()).unwrap();
        assert_eq!(t.headers[2], "CountyFIPS");
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0][2], "06037");
        assert_eq!(t.rows[1][2], "01001");
    }

    #[test]
    fn quoted_commas_stay_in_one_cell() {
        let csv = "State,County,Year,CkdRate\n\"Virginia\",\"Richmond, city\",2019,14.2\n";
        let t = read(Dataset::Ckd, b',', csv.as_bytes()).unwrap();
        assert_eq!(t.rows[0][1], "Richmond, city");
    }
}
