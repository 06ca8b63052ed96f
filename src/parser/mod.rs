// Parser module: record import/export formats.

pub mod fuel_csv;

pub use fuel_csv::{export_csv, FuelCsvParser, Parser};
