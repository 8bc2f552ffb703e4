//! Probe annotation tables: expected ratios, aliases and display markers.

use crate::error::{NormError, Result};
use crate::probe::ProbeCatalog;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// 24-bit display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Parse `RRGGBB`. A lone `0` is black, since spreadsheets collapse
    /// `000000` to it; anything else unparsable is `None`.
    pub fn from_hex(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "0" {
            return Some(Self::BLACK);
        }
        if text.len() != 6 || !text.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&text[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// How a probe is drawn. Has no effect on numerics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub color: Option<Rgb>,
    pub symbol: Option<i32>,
}

/// One row of a probe annotation table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeAnnotation {
    pub id_a: String,
    pub id_a_alias: Option<String>,
    pub id_b: Option<String>,
    /// Empty, `-`, or a positive number.
    pub ratio: String,
    pub marker: Marker,
}

/// Recognised header spellings, compared without case or spaces.
const ID_A_NAMES: [&str; 2] = ["ida", "vara"];
const ID_B_NAMES: [&str; 2] = ["idb", "varb"];
const ALIAS_NAMES: [&str; 2] = ["idaalias", "varaalias"];
const RATIO_NAMES: [&str; 1] = ["ratio"];
const COLOR_NAMES: [&str; 2] = ["colorrgb", "color"];
const SYMBOL_NAMES: [&str; 1] = ["symbol"];

fn normalize_header(h: &str) -> String {
    h.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn find_header(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&normalize_header(h).as_str()))
}

/// Annotation rows, applied to a probe catalog by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeAnnotationTable {
    rows: Vec<ProbeAnnotation>,
}

impl ProbeAnnotationTable {
    pub fn new(rows: Vec<ProbeAnnotation>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ProbeAnnotation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: ProbeAnnotation) {
        self.rows.push(row);
    }

    /// Load from a tab-separated file.
    ///
    /// `idA` and `ratio` columns are required; `idB`, `idAAlias`, `colorRGB`
    /// and `symbol` are optional.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

        let id_a = find_header(&headers, &ID_A_NAMES)
            .ok_or_else(|| NormError::MissingColumn("idA".to_string()))?;
        let ratio = find_header(&headers, &RATIO_NAMES)
            .ok_or_else(|| NormError::MissingColumn("ratio".to_string()))?;
        let id_b = find_header(&headers, &ID_B_NAMES);
        let alias = find_header(&headers, &ALIAS_NAMES);
        let color = find_header(&headers, &COLOR_NAMES);
        let symbol = find_header(&headers, &SYMBOL_NAMES);

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let cell = |idx: Option<usize>| -> Option<String> {
                idx.and_then(|i| record.get(i))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };
            rows.push(ProbeAnnotation {
                id_a: cell(Some(id_a)).unwrap_or_default(),
                id_a_alias: cell(alias),
                id_b: cell(id_b),
                ratio: cell(Some(ratio)).unwrap_or_default(),
                marker: Marker {
                    color: cell(color).and_then(|c| Rgb::from_hex(&c)),
                    symbol: cell(symbol).and_then(|s| s.parse().ok()),
                },
            });
        }
        Ok(Self { rows })
    }

    /// Current annotation of every probe set, sorted by key.
    pub fn from_catalog(catalog: &ProbeCatalog) -> Self {
        let mut probes: Vec<_> = catalog.iter().collect();
        probes.sort_by(|x, y| x.key().cmp(y.key()));
        let rows = probes
            .into_iter()
            .map(|p| ProbeAnnotation {
                id_a: p.val_a().to_string(),
                id_a_alias: Some(p.val_a_alias.clone()),
                id_b: (!p.val_b().is_empty()).then(|| p.val_b().to_string()),
                ratio: p.ratio_expr().to_string(),
                marker: p.marker,
            })
            .collect();
        Self { rows }
    }

    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.to_writer(file)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
        wtr.write_record(["idA", "idAAlias", "idB", "ratio", "colorRGB", "symbol"])?;
        for row in &self.rows {
            wtr.write_record([
                row.id_a.clone(),
                row.id_a_alias.clone().unwrap_or_default(),
                row.id_b.clone().unwrap_or_default(),
                row.ratio.clone(),
                row.marker.color.map(|c| c.to_hex()).unwrap_or_default(),
                row.marker.symbol.map(|s| s.to_string()).unwrap_or_default(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_parse() {
        assert_eq!(Rgb::from_hex("FF8000"), Some(Rgb { r: 255, g: 128, b: 0 }));
        assert_eq!(Rgb::from_hex("0"), Some(Rgb::BLACK));
        assert_eq!(Rgb::from_hex("GG0000"), None);
        assert_eq!(Rgb::from_hex("FFF"), None);
        assert_eq!(Rgb::from_hex("00ff7f").map(|c| c.to_hex()), Some("00FF7F".to_string()));
    }

    #[test]
    fn test_read_legacy_headers() {
        let text = "Var A\tVar B\tRatio\tColorRGB\tSymbol\tVar A alias\n\
spike1\tctl\t2\tFF0000\t3\tSpike one\n\
neg1\t\t-\t0\tx\t\n";
        let table = ProbeAnnotationTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);

        let first = &table.rows()[0];
        assert_eq!(first.id_a, "spike1");
        assert_eq!(first.id_b.as_deref(), Some("ctl"));
        assert_eq!(first.ratio, "2");
        assert_eq!(first.id_a_alias.as_deref(), Some("Spike one"));
        assert_eq!(first.marker.symbol, Some(3));

        let second = &table.rows()[1];
        assert_eq!(second.id_b, None);
        assert_eq!(second.marker.color, Some(Rgb::BLACK));
        assert_eq!(second.marker.symbol, None);
    }

    #[test]
    fn test_missing_ratio_column() {
        let text = "idA\tcolorRGB\ng1\tFF0000\n";
        assert!(matches!(
            ProbeAnnotationTable::from_reader(text.as_bytes()),
            Err(NormError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_export_sorted_by_key() {
        let a: Vec<String> = ["g2", "g1", "g2"].iter().map(|s| s.to_string()).collect();
        let mut catalog = ProbeCatalog::ingest(&a, None).unwrap();
        catalog
            .set_ratio(&crate::probe::ProbeKey::from_a("g2"), "1.5")
            .unwrap();

        let table = ProbeAnnotationTable::from_catalog(&catalog);
        assert_eq!(table.rows()[0].id_a, "g1");
        assert_eq!(table.rows()[1].ratio, "1.5");

        let mut buf = Vec::new();
        table.to_writer(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("idA\tidAAlias\tidB\tratio\tcolorRGB\tsymbol\n"));

        let back = ProbeAnnotationTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(back.rows()[1].ratio, "1.5");
        assert_eq!(back.rows()[0].id_a_alias.as_deref(), Some("g1"));
    }
}
