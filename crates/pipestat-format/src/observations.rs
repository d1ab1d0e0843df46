//! Wide input table decoder.
//!
//! The input has one row per (image, pipeline) pair: an `image_name`
//! column, a `pipeline` column, and one column per metric. Each row
//! expands into one [`Observation`] per metric column.
//!
//! Empty cells and `nan` (any case) are missing values. Anything else
//! that is not a finite number, `inf` included, is an error.

use std::collections::HashSet;
use std::io::Read;

use pipestat_core::{Observation, ObservationTable};

use crate::error::FormatError;

/// Header of the image identifier column.
pub const IMAGE_COLUMN: &str = "image_name";

/// Header of the pipeline identifier column.
pub const PIPELINE_COLUMN: &str = "pipeline";

/// Decode a wide CSV table from any reader; a byte slice works for input
/// already in memory.
///
/// Cells are trimmed of surrounding whitespace. Metric order follows the
/// header.
///
/// # Errors
///
/// Returns [`FormatError::MissingColumn`] if a key column is absent,
/// [`FormatError::NoMetrics`] if there are no metric columns,
/// [`FormatError::EmptyKey`] or [`FormatError::DuplicateRow`] for bad key
/// cells, [`FormatError::InvalidNumber`] for a metric cell that is not a
/// finite number or a missing marker, and [`FormatError::Csv`] if the CSV
/// itself is malformed.
pub fn read_observations<R: Read>(reader: R) -> Result<ObservationTable, FormatError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| FormatError::MissingColumn(name.to_string()))
    };
    let image_col = position(IMAGE_COLUMN)?;
    let pipeline_col = position(PIPELINE_COLUMN)?;

    let metric_cols: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != image_col && *i != pipeline_col)
        .collect();
    if metric_cols.is_empty() {
        return Err(FormatError::NoMetrics);
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut observations = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row = record.position().map_or(0, csv::Position::line);

        let key = |col: usize, name: &str| match record.get(col) {
            Some(cell) if !cell.is_empty() => Ok(cell.to_string()),
            _ => Err(FormatError::EmptyKey {
                row,
                column: name.to_string(),
            }),
        };
        let image = key(image_col, IMAGE_COLUMN)?;
        let pipeline = key(pipeline_col, PIPELINE_COLUMN)?;

        if !seen.insert((image.clone(), pipeline.clone())) {
            return Err(FormatError::DuplicateRow {
                row,
                image,
                pipeline,
            });
        }

        for &(col, metric) in &metric_cols {
            let cell = record.get(col).unwrap_or("");
            let value = parse_cell(cell).ok_or_else(|| FormatError::InvalidNumber {
                row,
                column: metric.to_string(),
                value: cell.to_string(),
            })?;
            observations.push(Observation::new(
                image.as_str(),
                pipeline.as_str(),
                metric,
                value,
            ));
        }
    }

    Ok(ObservationTable::new(observations)?)
}

/// `Some(None)` for a missing cell, `Some(Some(v))` for a finite number,
/// `None` for anything else.
fn parse_cell(cell: &str) -> Option<Option<f64>> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn expands_rows_into_observations() {
        let input = "\
image_name,pipeline,entropy,contrast
img_a,p0,7.5,0.25
img_a,p2,7.25,
img_b,p0,nan,0.5
";
        let table = read_observations(input.as_bytes()).unwrap();
        assert_eq!(table.metrics(), ["entropy", "contrast"]);
        assert_eq!(table.len(), 6);

        let entropy: Vec<Option<f64>> = table.for_metric("entropy").map(|o| o.value).collect();
        assert_eq!(entropy, vec![Some(7.5), Some(7.25), None]);
        let contrast: Vec<Option<f64>> = table.for_metric("contrast").map(|o| o.value).collect();
        assert_eq!(contrast, vec![Some(0.25), None, Some(0.5)]);
    }

    #[test]
    fn key_columns_may_appear_anywhere() {
        let input = "entropy,pipeline,image_name\n1.0, p5 , img\n";
        let table = read_observations(input.as_bytes()).unwrap();
        let obs = &table.observations()[0];
        assert_eq!(obs.image_id, "img");
        assert_eq!(obs.pipeline_id.as_str(), "p5");
    }

    #[test]
    fn missing_key_column() {
        let err = read_observations(b"image_name,entropy\na,1\n".as_slice()).unwrap_err();
        assert!(matches!(err, FormatError::MissingColumn(ref c) if c == "pipeline"));
        assert!(err.is_malformed_input());
    }

    #[test]
    fn no_metric_columns() {
        let err = read_observations(b"image_name,pipeline\na,p0\n".as_slice()).unwrap_err();
        assert!(matches!(err, FormatError::NoMetrics));
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let input = "image_name,pipeline,m\na,p0,1\nb,p0,2\na,p0,3\n";
        let err = read_observations(input.as_bytes()).unwrap_err();
        match err {
            FormatError::DuplicateRow { row, image, pipeline } => {
                assert_eq!(row, 4);
                assert_eq!(image, "a");
                assert_eq!(pipeline, "p0");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_key_is_rejected() {
        let input = "image_name,pipeline,m\n,p0,1\n";
        let err = read_observations(input.as_bytes()).unwrap_err();
        assert!(matches!(err, FormatError::EmptyKey { row: 2, .. }));
    }

    #[test]
    fn non_numeric_cell_is_rejected() {
        let input = "image_name,pipeline,m\na,p0,blurry\n";
        let err = read_observations(input.as_bytes()).unwrap_err();
        match err {
            FormatError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 2);
                assert_eq!(column, "m");
                assert_eq!(value, "blurry");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_cell_variants() {
        assert_eq!(parse_cell(""), Some(None));
        assert_eq!(parse_cell("NaN"), Some(None));
        assert_eq!(parse_cell("1e-3"), Some(Some(0.001)));
        assert_eq!(parse_cell("-4"), Some(Some(-4.0)));
        assert_eq!(parse_cell("n/a"), None);
        assert_eq!(parse_cell("inf"), None);
        assert_eq!(parse_cell("-Infinity"), None);
        assert_eq!(parse_cell("1e400"), None);
    }

    #[test]
    fn infinite_cell_is_rejected() {
        let input = "image_name,pipeline,m\na,p0,1\na,p2,inf\n";
        let err = read_observations(input.as_bytes()).unwrap_err();
        assert!(err.is_malformed_input());
        match err {
            FormatError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 3);
                assert_eq!(column, "m");
                assert_eq!(value, "inf");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
