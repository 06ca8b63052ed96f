// Record management: paginated listing and single-record edits
use crate::model::{
    FuelPriceRecord, IngestError, NewFuelPrice, RecordPatch, SortOrder, StorageError,
};
use crate::normalizer::{normalize, validate};
use crate::storage::{RecordFilter, RecordStore, SortKey};
use serde::Serialize;
use tracing::info;

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: RecordFilter,
    pub sort_key: SortKey,
    pub order: SortOrder,
    /// 1-based.
    pub page: usize,
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: RecordFilter::new(),
            sort_key: SortKey::Period,
            order: SortOrder::Desc,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub total_pages: u64,
    pub data: Vec<FuelPriceRecord>,
}

/// Page and limit below 1 are raised to 1.
pub async fn list_records(
    store: &dyn RecordStore,
    query: &ListQuery,
) -> Result<RecordPage, StorageError> {
    let page = query.page.max(1);
    let limit = query.limit.max(1);
    let offset = (page - 1).saturating_mul(limit);

    let found = store
        .find_page(&query.filter, query.sort_key, query.order, offset, limit)
        .await?;

    Ok(RecordPage {
        page,
        limit,
        total: found.total,
        total_pages: found.total.div_ceil(limit as u64),
        data: found.records,
    })
}

pub async fn create_record(
    store: &dyn RecordStore,
    mut record: NewFuelPrice,
) -> Result<FuelPriceRecord, IngestError> {
    normalize(&mut record);
    validate(&record)?;
    let id = store.insert(&record).await?;
    info!("Created record {} for {} on {}", id, record.state, record.period);
    store
        .get(id)
        .await?
        .ok_or_else(|| StorageError::Corrupt(format!("record {id} vanished after insert")).into())
}

/// Applies `patch` over the stored record. `None` when the id is unknown.
pub async fn update_record(
    store: &dyn RecordStore,
    id: i64,
    patch: &RecordPatch,
) -> Result<Option<FuelPriceRecord>, IngestError> {
    let Some(existing) = store.get(id).await? else {
        return Ok(None);
    };
    let mut record = patch.apply(&existing);
    normalize(&mut record);
    validate(&record)?;

    let updated = store.update(id, &record).await?;
    if updated.is_some() {
        info!("Updated record {}", id);
    }
    Ok(updated)
}

pub async fn delete_record(store: &dyn RecordStore, id: i64) -> Result<bool, StorageError> {
    let removed = store.delete(id).await?;
    if removed {
        info!("Deleted record {}", id);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Product, Region};
    use crate::storage::MemoryStorage;
    use chrono::NaiveDate;

    fn record(state: &str, day: u32, pms: f64) -> NewFuelPrice {
        NewFuelPrice {
            state: state.to_string(),
            region: Region::NorthCentral,
            period: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
            pms,
            ago: 1000.0,
            dpk: 1100.0,
            lpg: 900.0,
        }
    }

    #[tokio::test]
    async fn zero_page_and_limit_are_raised_to_one() {
        let store = MemoryStorage::new();
        for day in 1..=3 {
            store.insert(&record("Kogi", day, 600.0)).await.unwrap();
        }
        let query = ListQuery {
            page: 0,
            limit: 0,
            ..ListQuery::default()
        };
        let page = list_records(&store, &query).await.unwrap();
        assert_eq!((page.page, page.limit), (1, 1));
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data[0].period, NaiveDate::from_ymd_opt(2024, 7, 3).unwrap());
    }

    #[tokio::test]
    async fn invalid_patch_leaves_record_untouched() {
        let store = MemoryStorage::new();
        let created = create_record(&store, record("  Plateau ", 1, 640.0))
            .await
            .unwrap();
        assert_eq!(created.state, "Plateau");

        let mut patch = RecordPatch::default();
        patch.set_price(Product::Pms, -1.0);
        let err = update_record(&store, created.id, &patch).await.unwrap_err();
        assert!(matches!(err, IngestError::Invalid(_)));

        let stored = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.pms, 640.0);
    }
}
