// Storage module: the record store interface consumed by the analyzer and its backends.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::model::{FuelPriceRecord, NewFuelPrice, Product, Region, SortOrder, StorageError};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Predicate over stored records. Unset fields do not constrain the match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub state: Option<String>,
    pub region: Option<Region>,
    /// Inclusive lower bound on `period`.
    pub period_from: Option<NaiveDate>,
    /// Inclusive upper bound on `period`.
    pub period_to: Option<NaiveDate>,
    /// Only records whose price for this product is finite. Prices are never
    /// NULL, so in practice this drops infinities and nothing else.
    pub has_product: Option<Product>,
    /// Case-insensitive substring of the state or region name.
    pub search: Option<String>,
    pub price_range: Option<PriceRange>,
}

/// Inclusive bounds on one product's price. A missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub product: Product,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PriceRange {
    pub fn contains(&self, price: f64) -> bool {
        self.min.is_none_or(|min| price >= min) && self.max.is_none_or(|max| price <= max)
    }
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn period_from(mut self, date: NaiveDate) -> Self {
        self.period_from = Some(date);
        self
    }

    pub fn period_to(mut self, date: NaiveDate) -> Self {
        self.period_to = Some(date);
        self
    }

    pub fn has_product(mut self, product: Product) -> Self {
        self.has_product = Some(product);
        self
    }

    /// Empty text matches every record.
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn price_between(mut self, product: Product, min: Option<f64>, max: Option<f64>) -> Self {
        self.price_range = Some(PriceRange { product, min, max });
        self
    }

    pub fn matches(&self, record: &FuelPriceRecord) -> bool {
        if let Some(state) = &self.state {
            if &record.state != state {
                return false;
            }
        }
        if let Some(region) = self.region {
            if record.region != region {
                return false;
            }
        }
        if let Some(from) = self.period_from {
            if record.period < from {
                return false;
            }
        }
        if let Some(to) = self.period_to {
            if record.period > to {
                return false;
            }
        }
        if let Some(product) = self.has_product {
            if !record.price(product).is_finite() {
                return false;
            }
        }
        if let Some(text) = &self.search {
            let needle = text.to_lowercase();
            if !record.state.to_lowercase().contains(&needle)
                && !record.region.name().to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(range) = &self.price_range {
            if !range.contains(record.price(range.product)) {
                return false;
            }
        }
        true
    }
}

/// Primary sort column. Ties fall back to period and then id, in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Period,
    State,
    Region,
    Price(Product),
}

impl SortKey {
    /// Accepts `period`, `state`, `region` or a product code, case-insensitively.
    pub fn from_field(field: &str) -> Option<Self> {
        match field.to_lowercase().as_str() {
            "period" => Some(SortKey::Period),
            "state" => Some(SortKey::State),
            "region" => Some(SortKey::Region),
            other => other.to_uppercase().parse().ok().map(SortKey::Price),
        }
    }
}

/// One page of records plus the number of records matching the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<FuelPriceRecord>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    State,
    Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    /// A single group over every matching record.
    All,
    State,
    Region,
    Period,
}

/// Mean of each requested product within a group; unrequested products stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProductMeans {
    pub pms: Option<f64>,
    pub ago: Option<f64>,
    pub dpk: Option<f64>,
    pub lpg: Option<f64>,
}

impl ProductMeans {
    pub fn get(&self, product: Product) -> Option<f64> {
        match product {
            Product::Pms => self.pms,
            Product::Ago => self.ago,
            Product::Dpk => self.dpk,
            Product::Lpg => self.lpg,
        }
    }

    pub fn set(&mut self, product: Product, value: Option<f64>) {
        match product {
            Product::Pms => self.pms = value,
            Product::Ago => self.ago = value,
            Product::Dpk => self.dpk = value,
            Product::Lpg => self.lpg = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMean {
    /// Group value in its stored text form; `None` for [`GroupKey::All`].
    pub key: Option<String>,
    pub count: u64,
    pub means: ProductMeans,
}

/// Queryable time-series store of fuel price records.
///
/// Groups from `aggregate_group_mean` come back ordered by key. `GroupKey::All`
/// always yields exactly one group, with `count == 0` and empty means when
/// nothing matches. `find_top_n` breaks period ties by record id in the same
/// direction as the sort.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_top_n(
        &self,
        filter: &RecordFilter,
        sort_key: SortKey,
        order: SortOrder,
        n: usize,
    ) -> Result<Vec<FuelPriceRecord>, StorageError>;

    async fn find_all(&self, filter: &RecordFilter) -> Result<Vec<FuelPriceRecord>, StorageError>;

    async fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>, StorageError>;

    async fn aggregate_group_mean(
        &self,
        group_key: GroupKey,
        filter: &RecordFilter,
        products: &[Product],
    ) -> Result<Vec<GroupMean>, StorageError>;

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StorageError>;

    /// Skips `offset` matching records and returns at most `limit` of the rest.
    async fn find_page(
        &self,
        filter: &RecordFilter,
        sort_key: SortKey,
        order: SortOrder,
        offset: usize,
        limit: usize,
    ) -> Result<Page, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<FuelPriceRecord>, StorageError>;

    /// Persists an already validated record and returns its id.
    async fn insert(&self, record: &NewFuelPrice) -> Result<i64, StorageError>;

    /// Replaces every field of record `id`, keeping `created_at` and bumping
    /// `updated_at`. `None` when no such record exists.
    async fn update(
        &self,
        id: i64,
        record: &NewFuelPrice,
    ) -> Result<Option<FuelPriceRecord>, StorageError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: i64) -> Result<bool, StorageError>;
}
