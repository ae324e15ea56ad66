use std::error::Error;
use std::fs::File;
use std::io;
use std::io::BufRead;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde_json::Value;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::error::{malformed, FfmError};
use crate::feature_buffer::{FeatureBuffer, FeatureBufferTranslator};

/// Tabular rows the trainer reads from. Every call to `rows()` starts again from the first row.
pub trait RowSource {
    fn num_rows(&self) -> usize;
    fn column_names(&self) -> &[String];
    fn rows<'a>(&'a self) -> Box<dyn Iterator<Item = &'a [Value]> + 'a>;

    fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names().iter().position(|c| c == name)
    }
}

/// In-memory table of positional rows
#[derive(Clone, Debug, Default)]
pub struct Table {
    column_names: Vec<String>,
    rows: Vec<Vec<Value>>,
}

pub fn create_buffered_input(input_filename: &Path) -> Result<Box<dyn BufRead>, Box<dyn Error>> {
    // Handler for different (or no) compression types
    let input = match File::open(input_filename) {
        Ok(input) => input,
        Err(e) => {
            return Err(Box::new(FfmError::IoFailure(format!(
                "Could not open {:?}: {}",
                input_filename, e
            ))))
        }
    };
    let extension = input_filename.extension().and_then(|ext| ext.to_str());
    match extension {
        Some("gz") => Ok(Box::new(io::BufReader::new(MultiGzDecoder::new(input)))),
        Some("zst") => Ok(Box::new(io::BufReader::new(ZstdDecoder::new(input)?))),
        _ => Ok(Box::new(io::BufReader::new(input))),
    }
}

impl Table {
    pub fn new<S: AsRef<str>>(column_names: &[S]) -> Table {
        Table {
            column_names: column_names.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), Box<dyn Error>> {
        if row.len() != self.column_names.len() {
            return malformed(format!(
                "Row has {} values, table has {} columns",
                row.len(),
                self.column_names.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// One JSON object per line, projected onto `column_names`. Keys that are absent become null.
    pub fn from_json_lines<S: AsRef<str>>(
        input: &mut dyn BufRead,
        column_names: &[S],
    ) -> Result<Table, Box<dyn Error>> {
        let mut table = Table::new(column_names);
        let mut line = String::new();
        let mut line_number = 0;
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let mut record = match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(record)) => record,
                Ok(_) => return malformed(format!("Line {} is not a JSON object", line_number)),
                Err(e) => return malformed(format!("Line {} is not valid JSON: {}", line_number, e)),
            };
            let row = table
                .column_names
                .iter()
                .map(|c| record.remove(c).unwrap_or(Value::Null))
                .collect();
            table.rows.push(row);
        }
        log::debug!("Read {} rows from {} lines", table.rows.len(), line_number);
        Ok(table)
    }

    pub fn from_path<S: AsRef<str>>(path: &Path, column_names: &[S]) -> Result<Table, Box<dyn Error>> {
        let mut input = create_buffered_input(path)?;
        let table = Table::from_json_lines(&mut *input, column_names)?;
        log::info!("Loaded {} rows from {:?}", table.num_rows(), path);
        Ok(table)
    }
}

impl RowSource for Table {
    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn column_names(&self) -> &[String] {
        &self.column_names
    }

    fn rows<'a>(&'a self) -> Box<dyn Iterator<Item = &'a [Value]> + 'a> {
        Box::new(self.rows.iter().map(|r| r.as_slice()))
    }
}

/// A row source together with the roles of its columns and the model dimensions it implies
pub struct Problem<'a> {
    pub source: &'a dyn RowSource,
    pub target_column: usize,
    pub feature_columns: Vec<usize>,
    /// size of the feature index space
    pub n: usize,
    /// number of fields, one per feature column
    pub m: usize,
}

fn resolve_column(source: &dyn RowSource, name: &str) -> Result<usize, Box<dyn Error>> {
    match source.column_index(name) {
        Some(index) => Ok(index),
        None => malformed(format!("Column \"{}\" does not exist", name)),
    }
}

impl<'a> Problem<'a> {
    /// Resolves the columns and scans all rows once, validating them and finding `n`
    pub fn new<S: AsRef<str>>(
        source: &'a dyn RowSource,
        target_column: &str,
        feature_columns: &[S],
    ) -> Result<Problem<'a>, Box<dyn Error>> {
        let mut problem = Problem::with_dimensions(source, target_column, feature_columns, 0, feature_columns.len())?;
        let mut max_index: Option<u32> = None;
        problem.for_each_row(|fb| {
            for node in &fb.nodes {
                // u32::MAX marks ids that could not be represented
                if node.index != u32::MAX {
                    max_index = Some(max_index.map_or(node.index, |i| i.max(node.index)));
                }
            }
            Ok(())
        })?;
        problem.n = max_index.map_or(0, |i| i as usize + 1);
        log::debug!("Problem with {} rows, n: {}, m: {}", problem.num_rows(), problem.n, problem.m);
        Ok(problem)
    }

    /// Resolves the columns only, dimensions are given (e.g. validation data sized like training data)
    pub fn with_dimensions<S: AsRef<str>>(
        source: &'a dyn RowSource,
        target_column: &str,
        feature_columns: &[S],
        n: usize,
        m: usize,
    ) -> Result<Problem<'a>, Box<dyn Error>> {
        let target_column = resolve_column(source, target_column)?;
        let feature_columns = feature_columns
            .iter()
            .map(|c| resolve_column(source, c.as_ref()))
            .collect::<Result<Vec<usize>, Box<dyn Error>>>()?;
        Ok(Problem {
            source,
            target_column,
            feature_columns,
            n,
            m,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.source.num_rows()
    }

    /// Visits all rows in order. The first malformed row stops the iteration with its error.
    pub fn for_each_row<F>(&self, mut f: F) -> Result<(), Box<dyn Error>>
    where
        F: FnMut(&FeatureBuffer) -> Result<(), Box<dyn Error>>,
    {
        let mut fbt = FeatureBufferTranslator::new(self.target_column, self.feature_columns.clone());
        for (example_number, row) in self.source.rows().enumerate() {
            fbt.translate(row, example_number as u64)?;
            f(&fbt.feature_buffer)?;
        }
        Ok(())
    }
}
