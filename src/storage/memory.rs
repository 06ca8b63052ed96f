use crate::model::{FuelPriceRecord, NewFuelPrice, Product, SortOrder, StorageError};
use crate::storage::{
    DistinctField, GroupKey, GroupMean, Page, ProductMeans, RecordFilter, RecordStore, SortKey,
};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

/// Record store kept entirely in memory. Used for fixtures and tests.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<Vec<FuelPriceRecord>>,
    /// Highest id ever handed out; ids of deleted records are not reused.
    last_id: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<FuelPriceRecord>) -> Self {
        let last_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        Self {
            records: RwLock::new(records),
            last_id: AtomicI64::new(last_id),
        }
    }
}

fn sorted(
    mut records: Vec<FuelPriceRecord>,
    sort_key: SortKey,
    order: SortOrder,
) -> Vec<FuelPriceRecord> {
    records.sort_by(|a, b| {
        let ord = compare(a, b, sort_key);
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    records
}

fn compare(a: &FuelPriceRecord, b: &FuelPriceRecord, sort_key: SortKey) -> Ordering {
    let primary = match sort_key {
        SortKey::Period => Ordering::Equal,
        SortKey::State => a.state.cmp(&b.state),
        SortKey::Region => a.region.name().cmp(b.region.name()),
        SortKey::Price(product) => a.price(product).total_cmp(&b.price(product)),
    };
    primary
        .then(a.period.cmp(&b.period))
        .then(a.id.cmp(&b.id))
}

fn group_value(record: &FuelPriceRecord, group_key: GroupKey) -> Option<String> {
    match group_key {
        GroupKey::All => None,
        GroupKey::State => Some(record.state.clone()),
        GroupKey::Region => Some(record.region.name().to_string()),
        GroupKey::Period => Some(record.period.format("%Y-%m-%d").to_string()),
    }
}

fn means_of(records: &[&FuelPriceRecord], products: &[Product]) -> ProductMeans {
    let mut means = ProductMeans::default();
    if records.is_empty() {
        return means;
    }
    for &product in products {
        let total: f64 = records.iter().map(|r| r.price(product)).sum();
        means.set(product, Some(total / records.len() as f64));
    }
    means
}

#[async_trait]
impl RecordStore for MemoryStorage {
    async fn find_top_n(
        &self,
        filter: &RecordFilter,
        sort_key: SortKey,
        order: SortOrder,
        n: usize,
    ) -> Result<Vec<FuelPriceRecord>, StorageError> {
        let mut matching = sorted(self.find_all(filter).await?, sort_key, order);
        matching.truncate(n);
        Ok(matching)
    }

    async fn find_all(&self, filter: &RecordFilter) -> Result<Vec<FuelPriceRecord>, StorageError> {
        let records = self.records.read().await;
        let mut matching: Vec<FuelPriceRecord> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| compare(a, b, SortKey::Period));
        Ok(matching)
    }

    async fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>, StorageError> {
        let records = self.records.read().await;
        let values: BTreeSet<String> = records
            .iter()
            .map(|r| match field {
                DistinctField::State => r.state.clone(),
                DistinctField::Region => r.region.name().to_string(),
            })
            .collect();
        Ok(values.into_iter().collect())
    }

    async fn aggregate_group_mean(
        &self,
        group_key: GroupKey,
        filter: &RecordFilter,
        products: &[Product],
    ) -> Result<Vec<GroupMean>, StorageError> {
        let records = self.records.read().await;
        let matching: Vec<&FuelPriceRecord> = records.iter().filter(|r| filter.matches(r)).collect();

        if group_key == GroupKey::All {
            return Ok(vec![GroupMean {
                key: None,
                count: matching.len() as u64,
                means: means_of(&matching, products),
            }]);
        }

        let mut groups: BTreeMap<String, Vec<&FuelPriceRecord>> = BTreeMap::new();
        for record in matching {
            if let Some(key) = group_value(record, group_key) {
                groups.entry(key).or_default().push(record);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, members)| GroupMean {
                count: members.len() as u64,
                means: means_of(&members, products),
                key: Some(key),
            })
            .collect())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StorageError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn find_page(
        &self,
        filter: &RecordFilter,
        sort_key: SortKey,
        order: SortOrder,
        offset: usize,
        limit: usize,
    ) -> Result<Page, StorageError> {
        let matching = sorted(self.find_all(filter).await?, sort_key, order);
        let total = matching.len() as u64;
        let records = matching.into_iter().skip(offset).take(limit).collect();
        Ok(Page { records, total })
    }

    async fn get(&self, id: i64) -> Result<Option<FuelPriceRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn insert(&self, record: &NewFuelPrice) -> Result<i64, StorageError> {
        let mut records = self.records.write().await;
        let id = self.last_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let now = Utc::now();
        records.push(FuelPriceRecord {
            id,
            state: record.state.clone(),
            region: record.region,
            period: record.period,
            pms: record.pms,
            ago: record.ago,
            dpk: record.dpk,
            lpg: record.lpg,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn update(
        &self,
        id: i64,
        record: &NewFuelPrice,
    ) -> Result<Option<FuelPriceRecord>, StorageError> {
        let mut records = self.records.write().await;
        let Some(stored) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        stored.state = record.state.clone();
        stored.region = record.region;
        stored.period = record.period;
        stored.pms = record.pms;
        stored.ago = record.ago;
        stored.dpk = record.dpk;
        stored.lpg = record.lpg;
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }
}
