use crate::analyzer::market_indicators::MarketAnalyzer;
use crate::analyzer::range::{self, Clock, SystemClock, RANGE_TOKENS};
use crate::analyzer::weekly::{self, WINDOW};
use crate::model::{
    AnalysisError, ChangeResult, FilterOptions, MiniTrendPoint, NationalAverage, Product, Region,
    RegionAverage, SortOrder, StateValue, StorageError, SummaryResult, TrendPoint,
    WeeklyReportRow,
};
use crate::storage::{DistinctField, GroupKey, RecordFilter, RecordStore, SortKey};
use crate::utils::round2;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// How many states `top_states` returns.
pub const TOP_STATES_LIMIT: usize = 5;

/// Fuel price analytics over a record store.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Compares the two most recent observations carrying `product`.
    async fn summary_with_change(
        &self,
        product: Product,
    ) -> Result<Option<SummaryResult>, AnalysisError>;

    /// `summary_with_change` for every product, dropping products without enough data.
    async fn summary(&self) -> Result<Vec<SummaryResult>, AnalysisError>;

    async fn national_average(&self) -> Result<NationalAverage, AnalysisError>;

    async fn average_by_region(&self) -> Result<Vec<RegionAverage>, AnalysisError>;

    /// Five states ranked by their all-time mean price. Fails on an unknown product code.
    async fn top_states(
        &self,
        product: &str,
        order: SortOrder,
    ) -> Result<Vec<StateValue>, AnalysisError>;

    /// Mean price per day since the start of `range`, oldest first. A state
    /// filter wins over a region filter.
    async fn trend(
        &self,
        product: Product,
        state: Option<&str>,
        region: Option<Region>,
        range: &str,
    ) -> Result<Vec<TrendPoint>, AnalysisError>;

    /// The state's seven latest observations, oldest first.
    async fn mini_trend(
        &self,
        state: &str,
        product: Product,
    ) -> Result<Vec<MiniTrendPoint>, AnalysisError>;

    /// Latest price against the latest price at least `window_days` old.
    async fn price_change(
        &self,
        state: &str,
        product: Product,
        window_days: u32,
    ) -> Result<Option<ChangeResult>, AnalysisError>;

    /// Per-state change over each state's latest observations. An unknown
    /// product code yields an empty report.
    async fn weekly_report(&self, product: &str) -> Result<Vec<WeeklyReportRow>, AnalysisError>;

    async fn filter_options(&self) -> Result<FilterOptions, AnalysisError>;

    /// The store the analyzer reads from, for record listing and edits.
    fn record_store(&self) -> &dyn RecordStore;
}

/// Implementation of the fuel price analyzer.
pub struct AnalyzerImpl {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl AnalyzerImpl {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn latest(
        &self,
        filter: &RecordFilter,
        product: Product,
    ) -> Result<Option<f64>, StorageError> {
        let records = self
            .store
            .find_top_n(filter, SortKey::Period, SortOrder::Desc, 1)
            .await?;
        Ok(records.first().map(|r| r.price(product)))
    }
}

fn parse_group_key<T: std::str::FromStr>(key: Option<String>) -> Result<T, StorageError>
where
    T::Err: std::fmt::Display,
{
    let key = key.ok_or_else(|| StorageError::Corrupt("group without key".to_string()))?;
    key.parse()
        .map_err(|e: T::Err| StorageError::Corrupt(format!("group key {key:?}: {e}")))
}

#[async_trait]
impl Analyzer for AnalyzerImpl {
    async fn summary_with_change(
        &self,
        product: Product,
    ) -> Result<Option<SummaryResult>, AnalysisError> {
        let filter = RecordFilter::new().has_product(product);
        let records = self
            .store
            .find_top_n(&filter, SortKey::Period, SortOrder::Desc, 2)
            .await?;

        let [latest, previous] = records.as_slice() else {
            debug!("Not enough {} observations for a summary", product);
            return Ok(None);
        };

        let current_price = latest.price(product);
        let previous_price = previous.price(product);
        let delta = MarketAnalyzer::price_delta(current_price, previous_price);

        Ok(Some(SummaryResult {
            product,
            current_price,
            previous_price,
            value_change: delta.change,
            percentage_change: delta.percentage_change,
            trend_direction: delta.direction,
        }))
    }

    async fn summary(&self) -> Result<Vec<SummaryResult>, AnalysisError> {
        let results = join_all(Product::ALL.map(|p| self.summary_with_change(p))).await;

        let mut summary = Vec::new();
        for result in results {
            if let Some(entry) = result? {
                summary.push(entry);
            }
        }
        Ok(summary)
    }

    async fn national_average(&self) -> Result<NationalAverage, AnalysisError> {
        let groups = self
            .store
            .aggregate_group_mean(GroupKey::All, &RecordFilter::new(), &Product::ALL)
            .await?;

        let Some(group) = groups.into_iter().next() else {
            return Ok(NationalAverage::default());
        };
        Ok(NationalAverage {
            avg_pms: group.means.pms.map(round2),
            avg_ago: group.means.ago.map(round2),
            avg_dpk: group.means.dpk.map(round2),
            avg_lpg: group.means.lpg.map(round2),
        })
    }

    async fn average_by_region(&self) -> Result<Vec<RegionAverage>, AnalysisError> {
        let groups = self
            .store
            .aggregate_group_mean(GroupKey::Region, &RecordFilter::new(), &Product::ALL)
            .await?;

        let mut averages = Vec::with_capacity(groups.len());
        for group in groups {
            averages.push(RegionAverage {
                region: parse_group_key(group.key)?,
                avg_pms: group.means.pms.map(round2),
                avg_ago: group.means.ago.map(round2),
                avg_dpk: group.means.dpk.map(round2),
                avg_lpg: group.means.lpg.map(round2),
            });
        }
        Ok(averages)
    }

    async fn top_states(
        &self,
        product: &str,
        order: SortOrder,
    ) -> Result<Vec<StateValue>, AnalysisError> {
        let product: Product = product
            .parse()
            .map_err(|_| AnalysisError::InvalidArgument(format!("Invalid product type: {product}")))?;

        let groups = self
            .store
            .aggregate_group_mean(GroupKey::State, &RecordFilter::new(), &[product])
            .await?;

        let mut ranked: Vec<(String, f64)> = Vec::with_capacity(groups.len());
        for group in groups {
            if let Some(value) = group.means.get(product) {
                ranked.push((parse_group_key(group.key)?, value));
            }
        }

        // Stable sort, so equal means keep the store's state order
        ranked.sort_by(|a, b| match order {
            SortOrder::Asc => a.1.total_cmp(&b.1),
            SortOrder::Desc => b.1.total_cmp(&a.1),
        });
        ranked.truncate(TOP_STATES_LIMIT);

        Ok(ranked
            .into_iter()
            .map(|(state, value)| StateValue {
                state,
                value: round2(value),
            })
            .collect())
    }

    async fn trend(
        &self,
        product: Product,
        state: Option<&str>,
        region: Option<Region>,
        range: &str,
    ) -> Result<Vec<TrendPoint>, AnalysisError> {
        let start = range::resolve_at(range, self.clock.today());
        let mut filter = RecordFilter::new().period_from(start);
        match (state.filter(|s| !s.is_empty()), region) {
            (Some(state), _) => filter = filter.state(state),
            (None, Some(region)) => filter = filter.region(region),
            (None, None) => {}
        }

        let groups = self
            .store
            .aggregate_group_mean(GroupKey::Period, &filter, &[product])
            .await?;

        let mut trend = Vec::with_capacity(groups.len());
        for group in groups {
            let Some(price) = group.means.get(product) else {
                continue;
            };
            let date: NaiveDate = parse_group_key(group.key)?;
            trend.push(TrendPoint {
                date,
                price: round2(price),
            });
        }
        trend.sort_by_key(|point| point.date);
        Ok(trend)
    }

    async fn mini_trend(
        &self,
        state: &str,
        product: Product,
    ) -> Result<Vec<MiniTrendPoint>, AnalysisError> {
        let filter = RecordFilter::new().state(state);
        let records = self
            .store
            .find_top_n(&filter, SortKey::Period, SortOrder::Desc, WINDOW)
            .await?;

        Ok(records
            .iter()
            .rev()
            .map(|r| MiniTrendPoint {
                period: r.period,
                price: r.price(product),
            })
            .collect())
    }

    async fn price_change(
        &self,
        state: &str,
        product: Product,
        window_days: u32,
    ) -> Result<Option<ChangeResult>, AnalysisError> {
        let Some(cutoff) = self
            .clock
            .today()
            .checked_sub_days(Days::new(u64::from(window_days)))
        else {
            return Ok(None);
        };

        let latest_filter = RecordFilter::new().state(state);
        let previous_filter = RecordFilter::new().state(state).period_to(cutoff);
        let (latest, previous) = futures::try_join!(
            self.latest(&latest_filter, product),
            self.latest(&previous_filter, product),
        )?;

        let (Some(current_price), Some(previous_price)) = (latest, previous) else {
            debug!(
                "Insufficient {} history for {} before {}",
                product, state, cutoff
            );
            return Ok(None);
        };

        let delta = MarketAnalyzer::price_delta(current_price, previous_price);
        Ok(Some(ChangeResult {
            current_price,
            previous_price,
            change: delta.change,
            percentage_change: delta.percentage_change,
        }))
    }

    async fn weekly_report(&self, product: &str) -> Result<Vec<WeeklyReportRow>, AnalysisError> {
        let Ok(product) = product.parse::<Product>() else {
            debug!("Weekly report requested for unknown product {:?}", product);
            return Ok(Vec::new());
        };
        Ok(weekly::build_weekly_report(self.store.as_ref(), product).await?)
    }

    async fn filter_options(&self) -> Result<FilterOptions, AnalysisError> {
        let (states, regions) = futures::try_join!(
            self.store.distinct_values(DistinctField::State),
            self.store.distinct_values(DistinctField::Region),
        )?;

        let regions = regions
            .into_iter()
            .map(|r| parse_group_key(Some(r)))
            .collect::<Result<Vec<Region>, _>>()?;

        Ok(FilterOptions {
            states,
            regions,
            products: Product::ALL.to_vec(),
            ranges: RANGE_TOKENS.iter().map(|r| r.to_string()).collect(),
        })
    }

    fn record_store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }
}
