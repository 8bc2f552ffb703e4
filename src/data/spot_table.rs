//! Spot tables: raw array scans as named text columns.

use crate::data::MaskedVec;
use crate::error::{NormError, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Cell values read as missing.
const MISSING_TOKENS: [&str; 5] = ["", "NA", "?", "~", "nan"];

fn is_missing_token(cell: &str) -> bool {
    let cell = cell.trim();
    MISSING_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t))
}

/// A table of spots (rows) with named columns, kept as text until a column
/// is requested as numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SpotTable {
    /// Create a table, checking that every row matches the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for row in &rows {
            if row.len() != headers.len() {
                return Err(NormError::InputShapeMismatch {
                    what: "spot table row".to_string(),
                    expected: headers.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { headers, rows })
    }

    /// Load a tab-separated table whose first line holds the column names.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a tab-separated table from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(NormError::InsufficientData(
                "spot table has no columns".to_string(),
            ));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        Self::new(headers, rows)
    }

    /// Column names in file order.
    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of spots.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| NormError::MissingColumn(name.to_string()))
    }

    /// Cells of a column as text.
    pub fn text_column(&self, name: &str) -> Result<Vec<String>> {
        let col = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| r[col].trim().to_string()).collect())
    }

    /// Cells of a column as numbers; missing tokens become missing values.
    pub fn numeric_column(&self, name: &str) -> Result<MaskedVec> {
        let col = self.require_column(name)?;
        let mut values = Vec::with_capacity(self.rows.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let cell = row[col].trim();
            if is_missing_token(cell) {
                values.push(None);
                continue;
            }
            let value: f64 = cell.parse().map_err(|_| NormError::Parse {
                value: cell.to_string(),
                row: row_idx,
                column: name.to_string(),
            })?;
            values.push(Some(value));
        }
        Ok(MaskedVec::from_options(&values))
    }

    /// True when every non-missing cell of the column parses as a number.
    pub fn is_numeric_column(&self, name: &str) -> bool {
        match self.column_index(name) {
            Some(col) => self.rows.iter().all(|r| {
                let cell = r[col].trim();
                is_missing_token(cell) || cell.parse::<f64>().is_ok()
            }),
            None => false,
        }
    }
}

/// Which table columns feed the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Probe identifier (valA).
    pub id_a: String,
    /// Optional secondary identifier (valB).
    pub id_b: Option<String>,
    pub sig_smpl: String,
    pub sig_ref: String,
    pub bg_smpl: String,
    pub bg_ref: String,
    pub bg_smpl_sd: Option<String>,
    pub bg_ref_sd: Option<String>,
    /// Extra columns carried through to the output.
    #[serde(default)]
    pub others: Vec<String>,
}

/// Pick the header equal to `exact`, else the shortest header containing every keyword.
fn find_column(headers: &[String], exact: Option<&str>, keywords: &[&str]) -> Option<String> {
    if let Some(exact) = exact {
        if let Some(h) = headers.iter().find(|h| h.eq_ignore_ascii_case(exact)) {
            return Some(h.clone());
        }
    }
    headers
        .iter()
        .filter(|h| {
            let lower = h.to_lowercase();
            keywords.iter().all(|k| lower.contains(k))
        })
        .min_by_key(|h| h.len())
        .cloned()
}

impl ColumnMapping {
    /// Guess the column assignment from header names.
    ///
    /// Signals are the shortest headers containing the channel name, `raw`
    /// and `med`; backgrounds contain `background` instead of `raw`, and
    /// background deviations contain `st.dev` instead of `med`. The
    /// identifier is the column named or containing `id`, else the first
    /// column. The secondary identifier is never guessed.
    pub fn detect(headers: &[String]) -> Result<Self> {
        let require = |keywords: &[&str]| {
            find_column(headers, None, keywords)
                .ok_or_else(|| NormError::MissingColumn(keywords.join("+")))
        };
        Self::with_signal_columns(
            headers,
            require(&["smpl", "raw", "med"])?,
            require(&["ref", "raw", "med"])?,
            require(&["smpl", "background", "med"])?,
            require(&["ref", "background", "med"])?,
        )
    }

    /// Mapping with given signal and background columns; the identifier and
    /// the background deviations are still guessed from the headers.
    pub fn with_signal_columns(
        headers: &[String],
        sig_smpl: impl Into<String>,
        sig_ref: impl Into<String>,
        bg_smpl: impl Into<String>,
        bg_ref: impl Into<String>,
    ) -> Result<Self> {
        let first = headers
            .first()
            .ok_or_else(|| NormError::MissingColumn("id".to_string()))?;
        let id_a = find_column(headers, Some("id"), &["id"]).unwrap_or_else(|| first.clone());

        Ok(Self {
            id_a,
            id_b: None,
            sig_smpl: sig_smpl.into(),
            sig_ref: sig_ref.into(),
            bg_smpl: bg_smpl.into(),
            bg_ref: bg_ref.into(),
            bg_smpl_sd: find_column(headers, None, &["smpl", "background", "st.dev"]),
            bg_ref_sd: find_column(headers, None, &["ref", "background", "st.dev"]),
            others: Vec::new(),
        })
    }

    /// Use `name` as the secondary identifier.
    pub fn with_id_b(mut self, name: impl Into<String>) -> Self {
        self.id_b = Some(name.into());
        self
    }

    /// Carry extra columns to the output.
    pub fn with_others(mut self, others: Vec<String>) -> Self {
        self.others = others;
        self
    }

    /// Check that every mapped column exists in `table`.
    pub fn validate(&self, table: &SpotTable) -> Result<()> {
        let mandatory = [
            &self.id_a,
            &self.sig_smpl,
            &self.sig_ref,
            &self.bg_smpl,
            &self.bg_ref,
        ];
        let optional = [&self.id_b, &self.bg_smpl_sd, &self.bg_ref_sd];
        for name in mandatory
            .into_iter()
            .chain(optional.into_iter().flatten())
            .chain(self.others.iter())
        {
            if table.column_index(name).is_none() {
                return Err(NormError::MissingColumn(name.clone()));
            }
        }
        Ok(())
    }

    /// Extract the intensity columns from `table`.
    pub fn raw_intensities(&self, table: &SpotTable) -> Result<RawIntensities> {
        self.validate(table)?;
        let sd = |name: &Option<String>| -> Result<Option<MaskedVec>> {
            name.as_deref().map(|n| table.numeric_column(n)).transpose()
        };
        RawIntensities::new(
            table.numeric_column(&self.sig_smpl)?,
            table.numeric_column(&self.sig_ref)?,
            table.numeric_column(&self.bg_smpl)?,
            table.numeric_column(&self.bg_ref)?,
            sd(&self.bg_smpl_sd)?,
            sd(&self.bg_ref_sd)?,
        )
    }
}

/// Foreground/background intensities of both channels, one entry per spot.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIntensities {
    pub sig_smpl: MaskedVec,
    pub sig_ref: MaskedVec,
    pub bg_smpl: MaskedVec,
    pub bg_ref: MaskedVec,
    pub bg_smpl_sd: Option<MaskedVec>,
    pub bg_ref_sd: Option<MaskedVec>,
}

impl RawIntensities {
    /// Bundle the channel vectors, checking that all lengths agree.
    pub fn new(
        sig_smpl: MaskedVec,
        sig_ref: MaskedVec,
        bg_smpl: MaskedVec,
        bg_ref: MaskedVec,
        bg_smpl_sd: Option<MaskedVec>,
        bg_ref_sd: Option<MaskedVec>,
    ) -> Result<Self> {
        let raw = Self {
            sig_smpl,
            sig_ref,
            bg_smpl,
            bg_ref,
            bg_smpl_sd,
            bg_ref_sd,
        };
        raw.validate()?;
        Ok(raw)
    }

    /// Intensities without background deviations.
    pub fn from_values(sig_smpl: &[f64], sig_ref: &[f64], bg_smpl: &[f64], bg_ref: &[f64]) -> Result<Self> {
        Self::new(
            MaskedVec::from_values(sig_smpl.to_vec()),
            MaskedVec::from_values(sig_ref.to_vec()),
            MaskedVec::from_values(bg_smpl.to_vec()),
            MaskedVec::from_values(bg_ref.to_vec()),
            None,
            None,
        )
    }

    /// Attach background standard deviations for both channels.
    pub fn with_background_sd(mut self, bg_smpl_sd: MaskedVec, bg_ref_sd: MaskedVec) -> Result<Self> {
        self.bg_smpl_sd = Some(bg_smpl_sd);
        self.bg_ref_sd = Some(bg_ref_sd);
        self.validate()?;
        Ok(self)
    }

    /// Check that every channel has the same number of spots.
    pub fn validate(&self) -> Result<()> {
        let n = self.sig_smpl.len();
        let channels = [
            ("sigRef", Some(&self.sig_ref)),
            ("bgSmpl", Some(&self.bg_smpl)),
            ("bgRef", Some(&self.bg_ref)),
            ("bgSmplSD", self.bg_smpl_sd.as_ref()),
            ("bgRefSD", self.bg_ref_sd.as_ref()),
        ];
        for (name, channel) in channels {
            if let Some(v) = channel {
                if v.len() != n {
                    return Err(NormError::InputShapeMismatch {
                        what: name.to_string(),
                        expected: n,
                        actual: v.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of spots.
    #[inline]
    pub fn len(&self) -> usize {
        self.sig_smpl.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sig_smpl.is_empty()
    }

    /// Both background deviation columns are present.
    pub fn has_background_sd(&self) -> bool {
        self.bg_smpl_sd.is_some() && self.bg_ref_sd.is_some()
    }
}
