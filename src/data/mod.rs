//! Data structures: masked arrays, spot tables, probe annotations and output tables.

mod annotation;
mod masked;
mod result;
mod spot_table;

pub use annotation::{Marker, ProbeAnnotation, ProbeAnnotationTable, Rgb};
pub use masked::{MaskedMatrix, MaskedVec};
pub use result::{ColumnValues, OutputColumn, OutputTable};
pub use spot_table::{ColumnMapping, RawIntensities, SpotTable};
