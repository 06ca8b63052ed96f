// Core structs: FuelPriceRecord, Product, Region and the derived analysis results
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four tracked petroleum products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Premium Motor Spirit (petrol)
    #[serde(rename = "PMS")]
    Pms,
    /// Automotive Gas Oil (diesel)
    #[serde(rename = "AGO")]
    Ago,
    /// Dual Purpose Kerosene
    #[serde(rename = "DPK")]
    Dpk,
    /// Liquefied Petroleum Gas (cooking gas)
    #[serde(rename = "LPG")]
    Lpg,
}

impl Product {
    pub const ALL: [Product; 4] = [Product::Pms, Product::Ago, Product::Dpk, Product::Lpg];

    pub fn code(self) -> &'static str {
        match self {
            Product::Pms => "PMS",
            Product::Ago => "AGO",
            Product::Dpk => "DPK",
            Product::Lpg => "LPG",
        }
    }

    /// Column holding this product's price in the `fuel_prices` table.
    pub fn column(self) -> &'static str {
        match self {
            Product::Pms => "pms",
            Product::Ago => "ago",
            Product::Dpk => "dpk",
            Product::Lpg => "lpg",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown product: {0}")]
pub struct UnknownProduct(pub String);

impl FromStr for Product {
    type Err = UnknownProduct;

    /// Product codes are matched exactly; callers that accept lowercase input
    /// uppercase it first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PMS" => Ok(Product::Pms),
            "AGO" => Ok(Product::Ago),
            "DPK" => Ok(Product::Dpk),
            "LPG" => Ok(Product::Lpg),
            other => Err(UnknownProduct(other.to_string())),
        }
    }
}

/// Geopolitical zone a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Region {
    NorthEast,
    NorthWest,
    NorthCentral,
    SouthEast,
    SouthWest,
    SouthSouth,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::NorthEast,
        Region::NorthWest,
        Region::NorthCentral,
        Region::SouthEast,
        Region::SouthWest,
        Region::SouthSouth,
    ];

    /// Display name, which is also the stored form.
    pub fn name(self) -> &'static str {
        match self {
            Region::NorthEast => "North East",
            Region::NorthWest => "North West",
            Region::NorthCentral => "North Central",
            Region::SouthEast => "South East",
            Region::SouthWest => "South West",
            Region::SouthSouth => "South South",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown region: {0}")]
pub struct UnknownRegion(pub String);

impl FromStr for Region {
    type Err = UnknownRegion;

    /// Accepts both "South West" and "SOUTH_WEST" spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        Region::ALL
            .into_iter()
            .find(|r| r.name().to_uppercase() == wanted)
            .ok_or_else(|| UnknownRegion(s.to_string()))
    }
}

impl TryFrom<String> for Region {
    type Error = UnknownRegion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.name().to_string()
    }
}

/// A stored fuel price observation for one state on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelPriceRecord {
    pub id: i64,
    pub state: String,
    pub region: Region,
    pub period: NaiveDate,
    #[serde(rename = "PMS")]
    pub pms: f64,
    #[serde(rename = "AGO")]
    pub ago: f64,
    #[serde(rename = "DPK")]
    pub dpk: f64,
    #[serde(rename = "LPG")]
    pub lpg: f64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl FuelPriceRecord {
    pub fn price(&self, product: Product) -> f64 {
        match product {
            Product::Pms => self.pms,
            Product::Ago => self.ago,
            Product::Dpk => self.dpk,
            Product::Lpg => self.lpg,
        }
    }
}

/// Ingestion shape of a record, before the store assigns an id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFuelPrice {
    pub state: String,
    pub region: Region,
    pub period: NaiveDate,
    #[serde(rename = "PMS")]
    pub pms: f64,
    #[serde(rename = "AGO")]
    pub ago: f64,
    #[serde(rename = "DPK")]
    pub dpk: f64,
    #[serde(rename = "LPG")]
    pub lpg: f64,
}

impl NewFuelPrice {
    pub fn price(&self, product: Product) -> f64 {
        match product {
            Product::Pms => self.pms,
            Product::Ago => self.ago,
            Product::Dpk => self.dpk,
            Product::Lpg => self.lpg,
        }
    }
}

/// Partial edit of a record. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub state: Option<String>,
    pub region: Option<Region>,
    pub period: Option<NaiveDate>,
    #[serde(rename = "PMS")]
    pub pms: Option<f64>,
    #[serde(rename = "AGO")]
    pub ago: Option<f64>,
    #[serde(rename = "DPK")]
    pub dpk: Option<f64>,
    #[serde(rename = "LPG")]
    pub lpg: Option<f64>,
}

impl RecordPatch {
    pub fn set_price(&mut self, product: Product, price: f64) {
        match product {
            Product::Pms => self.pms = Some(price),
            Product::Ago => self.ago = Some(price),
            Product::Dpk => self.dpk = Some(price),
            Product::Lpg => self.lpg = Some(price),
        }
    }

    pub fn apply(&self, base: &FuelPriceRecord) -> NewFuelPrice {
        NewFuelPrice {
            state: self.state.clone().unwrap_or_else(|| base.state.clone()),
            region: self.region.unwrap_or(base.region),
            period: self.period.unwrap_or(base.period),
            pms: self.pms.unwrap_or(base.pms),
            ago: self.ago.unwrap_or(base.ago),
            dpk: self.dpk.unwrap_or(base.dpk),
            lpg: self.lpg.unwrap_or(base.lpg),
        }
    }

    /// Turns a patch carrying every field into a new record.
    pub fn complete(self) -> Result<NewFuelPrice, IngestError> {
        let missing = |field: &str| IngestError::Invalid(format!("missing field: {field}"));
        Ok(NewFuelPrice {
            state: self.state.ok_or_else(|| missing("state"))?,
            region: self.region.ok_or_else(|| missing("region"))?,
            period: self.period.ok_or_else(|| missing("period"))?,
            pms: self.pms.ok_or_else(|| missing("PMS"))?,
            ago: self.ago.ok_or_else(|| missing("AGO"))?,
            dpk: self.dpk.ok_or_else(|| missing("DPK"))?,
            lpg: self.lpg.ok_or_else(|| missing("LPG"))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Anything other than "asc" sorts descending.
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "no-change")]
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub product: Product,
    pub current_price: f64,
    pub previous_price: f64,
    pub value_change: f64,
    /// `None` when the previous price is zero.
    pub percentage_change: Option<f64>,
    pub trend_direction: TrendDirection,
}

/// All-time mean per product. Every field is `None` when the store is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NationalAverage {
    #[serde(rename = "avgPMS")]
    pub avg_pms: Option<f64>,
    #[serde(rename = "avgAGO")]
    pub avg_ago: Option<f64>,
    #[serde(rename = "avgDPK")]
    pub avg_dpk: Option<f64>,
    #[serde(rename = "avgLPG")]
    pub avg_lpg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAverage {
    pub region: Region,
    #[serde(rename = "avgPMS")]
    pub avg_pms: Option<f64>,
    #[serde(rename = "avgAGO")]
    pub avg_ago: Option<f64>,
    #[serde(rename = "avgDPK")]
    pub avg_dpk: Option<f64>,
    #[serde(rename = "avgLPG")]
    pub avg_lpg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    pub state: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniTrendPoint {
    pub period: NaiveDate,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult {
    pub current_price: f64,
    pub previous_price: f64,
    pub change: f64,
    pub percentage_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReportRow {
    pub state: String,
    pub current_price: f64,
    pub previous_price: f64,
    pub change: f64,
    pub percentage_change: Option<f64>,
    /// Up to seven prices, oldest first.
    pub trend: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub states: Vec<String>,
    pub regions: Vec<Region>,
    pub products: Vec<Product>,
    pub ranges: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column: {0}")]
    MissingField(String),
    #[error("line {line}: {reason}")]
    InvalidRow { line: u64, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_codes_are_exact() {
        assert_eq!("PMS".parse::<Product>(), Ok(Product::Pms));
        assert_eq!("LPG".parse::<Product>(), Ok(Product::Lpg));
        assert!("pms".parse::<Product>().is_err());
        assert!("INVALID".parse::<Product>().is_err());
    }

    #[test]
    fn region_accepts_both_spellings() {
        assert_eq!("SOUTH_WEST".parse::<Region>(), Ok(Region::SouthWest));
        assert_eq!("South West".parse::<Region>(), Ok(Region::SouthWest));
        assert_eq!("north  central".parse::<Region>(), Ok(Region::NorthCentral));
        assert!("Middle Belt".parse::<Region>().is_err());
    }

    #[test]
    fn region_serializes_by_display_name() {
        let json = serde_json::to_string(&Region::SouthSouth).unwrap();
        assert_eq!(json, "\"South South\"");
        let back: Region = serde_json::from_str("\"NORTH_EAST\"").unwrap();
        assert_eq!(back, Region::NorthEast);
    }

    #[test]
    fn summary_uses_wire_field_names() {
        let summary = SummaryResult {
            product: Product::Ago,
            current_price: 10.0,
            previous_price: 0.0,
            value_change: 10.0,
            percentage_change: None,
            trend_direction: TrendDirection::NoChange,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["product"], "AGO");
        assert_eq!(value["trendDirection"], "no-change");
        assert!(value["percentageChange"].is_null());
    }

    #[test]
    fn incomplete_patch_names_the_missing_field() {
        let mut patch = RecordPatch {
            state: Some("Oyo".to_string()),
            region: Some(Region::SouthWest),
            period: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..RecordPatch::default()
        };
        patch.set_price(Product::Pms, 610.0);
        patch.set_price(Product::Ago, 1010.0);
        patch.set_price(Product::Dpk, 1110.0);

        let err = patch.clone().complete().unwrap_err();
        assert_eq!(err.to_string(), "invalid record: missing field: LPG");

        patch.set_price(Product::Lpg, 810.0);
        assert_eq!(patch.complete().unwrap().lpg, 810.0);
    }

    #[test]
    fn sort_order_defaults_to_desc() {
        assert_eq!(SortOrder::parse_lenient("ASC"), SortOrder::Asc);
        assert_eq!(SortOrder::parse_lenient("sideways"), SortOrder::Desc);
    }
}
