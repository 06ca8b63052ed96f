use crate::model::{IngestError, NewFuelPrice};
use crate::normalizer::{normalize_all, validate};
use crate::storage::RecordStore;
use tracing::{info, warn};

/// Outcome of a bulk ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Stores every valid record. Invalid rows are logged and skipped; a storage
/// failure aborts the whole batch.
pub async fn ingest_all(
    store: &dyn RecordStore,
    mut records: Vec<NewFuelPrice>,
) -> Result<IngestReport, IngestError> {
    normalize_all(&mut records);

    let mut report = IngestReport::default();
    for record in &records {
        if let Err(e) = validate(record) {
            warn!("Skipping record: {}", e);
            report.skipped += 1;
            continue;
        }
        store.insert(record).await?;
        report.inserted += 1;
    }

    info!(
        "Ingested {} records ({} skipped)",
        report.inserted, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;
    use crate::storage::{MemoryStorage, RecordFilter};
    use chrono::NaiveDate;

    fn record(state: &str, pms: f64) -> NewFuelPrice {
        NewFuelPrice {
            state: state.to_string(),
            region: Region::NorthCentral,
            period: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            pms,
            ago: 1000.0,
            dpk: 1100.0,
            lpg: 900.0,
        }
    }

    #[tokio::test]
    async fn invalid_rows_are_skipped() {
        let store = MemoryStorage::new();
        let report = ingest_all(
            &store,
            vec![record(" Niger ", 640.0), record("Kwara", -5.0), record("", 600.0)],
        )
        .await
        .unwrap();

        assert_eq!(report, IngestReport { inserted: 1, skipped: 2 });
        let stored = store.find_all(&RecordFilter::new()).await.unwrap();
        assert_eq!(stored[0].state, "Niger");
    }

    #[tokio::test]
    async fn non_finite_prices_never_reach_the_store() {
        let store = MemoryStorage::new();
        let report = ingest_all(&store, vec![record("Benue", f64::INFINITY)])
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(store.count(&RecordFilter::new()).await.unwrap(), 0);
    }
}
