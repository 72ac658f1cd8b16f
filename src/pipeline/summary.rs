//! Statistical summary of a CSV upload.
//!
//! The language model never sees raw rows; it gets one paragraph per column
//! describing the data. Numeric columns report count/min/max/mean/median,
//! text columns report count, distinct values and the most frequent value.
//! A column is numeric when every non-empty cell parses as `f64`.

use crate::error::SlidesError;
use crate::request::DocumentKind;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Summarise CSV bytes as plain text.
///
/// The first record is the header. Ragged rows are tolerated; missing cells
/// count as empty. A file with a header but no data rows still yields a
/// summary listing the columns.
pub fn summarize_csv(bytes: &[u8]) -> Result<String, SlidesError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h.is_empty() {
                format!("column_{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect();

    if headers.is_empty() {
        return Ok(String::new());
    }

    let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        rows += 1;
        for (i, column) in columns.iter_mut().enumerate() {
            let cell = record.get(i).unwrap_or("");
            if !cell.is_empty() {
                column.push(cell.to_string());
            }
        }
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Dataset with {rows} rows and {} columns: {}.",
        headers.len(),
        headers.join(", ")
    );

    for (name, values) in headers.iter().zip(&columns) {
        out.push('\n');
        out.push_str(&describe_column(name, values));
    }

    Ok(out)
}

fn describe_column(name: &str, values: &[String]) -> String {
    if values.is_empty() {
        return format!("Column '{name}': no values.");
    }

    let numbers: Option<Vec<f64>> = values.iter().map(|v| v.parse::<f64>().ok()).collect();
    match numbers {
        Some(numbers) => {
            let stats = NumericStats::from_values(&numbers);
            format!(
                "Column '{name}' (numeric): count {}, min {}, max {}, mean {}, median {}.",
                numbers.len(),
                fmt_number(stats.min),
                fmt_number(stats.max),
                fmt_number(stats.mean),
                fmt_number(stats.median),
            )
        }
        None => {
            let mut freq: HashMap<&str, usize> = HashMap::new();
            for v in values {
                *freq.entry(v.as_str()).or_default() += 1;
            }
            // Highest count wins; ties go to the value seen first.
            let mut top: Option<(&str, usize)> = None;
            for v in values {
                let n = freq[v.as_str()];
                if top.map_or(true, |(_, best)| n > best) {
                    top = Some((v.as_str(), n));
                }
            }
            let (top_value, top_count) = top.unwrap_or(("", 0));
            format!(
                "Column '{name}' (text): count {}, distinct {}, most frequent '{top_value}' ({top_count}).",
                values.len(),
                freq.len(),
            )
        }
    }
}

struct NumericStats {
    min: f64,
    max: f64,
    mean: f64,
    median: f64,
}

impl NumericStats {
    fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
        }
    }
}

/// Integers print without a fraction, everything else with two decimals.
fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v:.2}")
    }
}

fn csv_error(e: csv::Error) -> SlidesError {
    SlidesError::UnsupportedFormat {
        mime_type: DocumentKind::Csv.mime_type().to_string(),
        reason: format!("malformed CSV: {e}"),
    }
}
