//! Shared fixtures for the analyzer integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use fuel_analytics::analyzer::{AnalyzerImpl, FixedClock};
use fuel_analytics::ingest::ingest_all;
use fuel_analytics::model::{NewFuelPrice, Region};
use fuel_analytics::storage::{MemoryStorage, RecordStore, SqliteStorage};
use std::sync::Arc;

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// A record whose other products sit at fixed offsets from `pms`.
pub fn entry(state: &str, region: Region, period: NaiveDate, pms: f64) -> NewFuelPrice {
    NewFuelPrice {
        state: state.to_string(),
        region,
        period,
        pms,
        ago: pms + 400.0,
        dpk: pms + 500.0,
        lpg: pms + 200.0,
    }
}

/// A fresh, empty instance of every store backend, labelled for assertion messages.
pub fn both_stores() -> Vec<(&'static str, Arc<dyn RecordStore>)> {
    vec![
        ("memory", Arc::new(MemoryStorage::new())),
        ("sqlite", Arc::new(SqliteStorage::in_memory().unwrap())),
    ]
}

pub async fn seed(store: &Arc<dyn RecordStore>, records: Vec<NewFuelPrice>) {
    let expected = records.len();
    let report = ingest_all(store.as_ref(), records).await.unwrap();
    assert_eq!(report.inserted, expected, "fixture rows must all be valid");
}

pub fn analyzer_over(store: Arc<dyn RecordStore>, today: NaiveDate) -> AnalyzerImpl {
    AnalyzerImpl::with_clock(store, Arc::new(FixedClock(today)))
}
