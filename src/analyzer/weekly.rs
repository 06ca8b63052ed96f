use crate::analyzer::market_indicators::MarketAnalyzer;
use crate::model::{Product, SortOrder, StorageError, WeeklyReportRow};
use crate::storage::{DistinctField, RecordFilter, RecordStore, SortKey};
use futures::future::join_all;
use tracing::debug;

/// Observations per state considered by the weekly report and the mini trend.
pub const WINDOW: usize = 7;

/// Builds one report row per state holding at least two observations.
/// States are queried concurrently; rows follow the store's state order.
pub async fn build_weekly_report(
    store: &dyn RecordStore,
    product: Product,
) -> Result<Vec<WeeklyReportRow>, StorageError> {
    let states = store.distinct_values(DistinctField::State).await?;
    debug!("Weekly report for {} across {} states", product, states.len());

    let rows = join_all(states.into_iter().map(|state| async move {
        let filter = RecordFilter::new().state(state.clone());
        let records = store
            .find_top_n(&filter, SortKey::Period, SortOrder::Desc, WINDOW)
            .await?;
        let prices: Vec<f64> = records.iter().map(|r| r.price(product)).collect();
        Ok::<_, StorageError>(report_row(state, &prices))
    }))
    .await;

    let mut report = Vec::new();
    for row in rows {
        if let Some(row) = row? {
            report.push(row);
        }
    }
    Ok(report)
}

/// `newest_first` holds the state's latest prices, most recent first.
pub fn report_row(state: String, newest_first: &[f64]) -> Option<WeeklyReportRow> {
    if newest_first.len() < 2 {
        return None;
    }

    let current_price = newest_first[0];
    let previous_price = newest_first[newest_first.len() - 1];
    let delta = MarketAnalyzer::price_delta(current_price, previous_price);
    let trend = newest_first.iter().rev().copied().collect();

    Some(WeeklyReportRow {
        state,
        current_price,
        previous_price,
        change: delta.change,
        percentage_change: delta.percentage_change,
        trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_observation_is_skipped() {
        assert!(report_row("Kano".into(), &[600.0]).is_none());
        assert!(report_row("Kano".into(), &[]).is_none());
    }

    #[test]
    fn compares_newest_against_oldest_in_window() {
        let row = report_row("Oyo".into(), &[660.0, 650.0, 640.0]).unwrap();
        assert_eq!(row.current_price, 660.0);
        assert_eq!(row.previous_price, 640.0);
        assert_eq!(row.change, 20.0);
        assert_eq!(row.percentage_change, Some(3.13));
        assert_eq!(row.trend, vec![640.0, 650.0, 660.0]);
    }
}
