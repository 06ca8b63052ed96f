// CSV import/export of fuel price records
use crate::model::{FuelPriceRecord, NewFuelPrice, ParserError, Region};
use crate::utils::parse_period;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

pub const COLUMNS: [&str; 7] = ["State", "Region", "Period", "AGO", "PMS", "DPK", "LPG"];

pub trait Parser {
    fn parse(&self, text: &str) -> Result<Vec<NewFuelPrice>, ParserError>;
}

pub struct FuelCsvParser;

impl FuelCsvParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FuelCsvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Positions of the expected columns within the file's header row.
struct ColumnIndex([usize; 7]);

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, ParserError> {
        let mut index = [0usize; 7];
        for (slot, name) in index.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| ParserError::MissingField(name.to_string()))?;
        }
        Ok(Self(index))
    }

    fn field<'r>(&self, row: &'r StringRecord, column: usize) -> &'r str {
        row.get(self.0[column]).unwrap_or("")
    }
}

fn parse_price(raw: &str, column: &str, line: u64) -> Result<f64, ParserError> {
    raw.replace(',', "")
        .parse::<f64>()
        .map_err(|_| ParserError::InvalidRow {
            line,
            reason: format!("{} is not a number: {:?}", column, raw),
        })
}

impl Parser for FuelCsvParser {
    fn parse(&self, text: &str) -> Result<Vec<NewFuelPrice>, ParserError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(text.as_bytes());
        let columns = ColumnIndex::from_headers(reader.headers()?)?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();

            let region_text = columns.field(&row, 1);
            let region: Region = region_text.parse().map_err(|e| ParserError::InvalidRow {
                line,
                reason: format!("{}", e),
            })?;
            let period_text = columns.field(&row, 2);
            let period = parse_period(period_text).ok_or_else(|| ParserError::InvalidRow {
                line,
                reason: format!("invalid period {:?}", period_text),
            })?;

            records.push(NewFuelPrice {
                state: columns.field(&row, 0).to_string(),
                region,
                period,
                ago: parse_price(columns.field(&row, 3), COLUMNS[3], line)?,
                pms: parse_price(columns.field(&row, 4), COLUMNS[4], line)?,
                dpk: parse_price(columns.field(&row, 5), COLUMNS[5], line)?,
                lpg: parse_price(columns.field(&row, 6), COLUMNS[6], line)?,
            });
        }

        Ok(records)
    }
}

/// Writes records with the same columns the parser reads.
pub fn export_csv(records: &[FuelPriceRecord]) -> Result<String, ParserError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for r in records {
        writer.write_record([
            r.state.clone(),
            r.region.name().to_string(),
            r.period.format("%Y-%m-%d").to_string(),
            r.ago.to_string(),
            r.pms.to_string(),
            r.dpk.to_string(),
            r.lpg.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ParserError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
