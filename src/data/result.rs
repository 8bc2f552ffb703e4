//! Output tables produced by a normalization run.

use crate::data::MaskedVec;
use crate::error::{NormError, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Text written for missing numeric cells.
pub const MISSING_CELL: &str = "NA";

/// Contents of one output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    /// Numeric values with explicit missingness.
    Numeric(MaskedVec),
    /// Free text (identifiers, concatenated annotations).
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Self::Numeric(v) => v
                .get(row)
                .map(|x| x.to_string())
                .unwrap_or_else(|| MISSING_CELL.to_string()),
            Self::Text(v) => v[row].clone(),
        }
    }
}

/// A named output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub values: ColumnValues,
}

/// Column-oriented output table; every column has the same number of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    columns: Vec<OutputColumn>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: String, values: ColumnValues) -> Result<()> {
        if let Some(first) = self.columns.first() {
            if first.values.len() != values.len() {
                return Err(NormError::InputShapeMismatch {
                    what: format!("output column '{}'", name),
                    expected: first.values.len(),
                    actual: values.len(),
                });
            }
        }
        self.columns.push(OutputColumn { name, values });
        Ok(())
    }

    /// Append a numeric column.
    pub fn push_numeric(&mut self, name: impl Into<String>, values: MaskedVec) -> Result<()> {
        self.push(name.into(), ColumnValues::Numeric(values))
    }

    /// Append a text column.
    pub fn push_text(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        self.push(name.into(), ColumnValues::Text(values))
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&OutputColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Numeric column by name.
    pub fn numeric(&self, name: &str) -> Option<&MaskedVec> {
        match self.column(name).map(|c| &c.values) {
            Some(ColumnValues::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// Text column by name.
    pub fn text(&self, name: &str) -> Option<&[String]> {
        match self.column(name).map(|c| &c.values) {
            Some(ColumnValues::Text(v)) => Some(v),
            _ => None,
        }
    }

    /// Write as tab-separated text; missing numbers are written as `NA`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.to_writer(file)
    }

    /// Write as tab-separated text to any writer.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.n_rows() {
            wtr.write_record(self.columns.iter().map(|c| c.values.cell(row)))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_and_lookup() {
        let mut table = OutputTable::new();
        table.push_text("ID", vec!["g1".into(), "g2".into()]).unwrap();
        table
            .push_numeric("M_normalized", MaskedVec::from_options(&[Some(0.5), None]))
            .unwrap();

        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.n_cols(), 2);
        assert_eq!(table.headers(), vec!["ID", "M_normalized"]);
        assert_eq!(table.text("ID").unwrap()[1], "g2");
        assert!(table.numeric("M_normalized").unwrap().is_missing(1));
        assert!(table.numeric("ID").is_none());
    }

    #[test]
    fn test_length_mismatch() {
        let mut table = OutputTable::new();
        table.push_text("ID", vec!["g1".into()]).unwrap();
        let err = table.push_numeric("A", MaskedVec::from_values(vec![1.0, 2.0]));
        assert!(matches!(err, Err(NormError::InputShapeMismatch { .. })));
    }

    #[test]
    fn test_writer_marks_missing() {
        let mut table = OutputTable::new();
        table.push_text("ID", vec!["g1".into(), "g2".into()]).unwrap();
        table
            .push_numeric("A", MaskedVec::from_options(&[Some(1.5), None]))
            .unwrap();

        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "ID\tA\ng1\t1.5\ng2\tNA\n");
    }
}
