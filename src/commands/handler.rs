// commands/handler.rs

use crate::analyzer::Analyzer;
use crate::commands::CommandResponse;
use crate::model::{AnalysisError, IngestError, Product, RecordPatch, Region, SortOrder};
use crate::records::{self, ListQuery};
use crate::storage::{RecordStore, SortKey};
use crate::utils::parse_period;
use serde_json::{json, Value};
use tracing::{error, info};

const DEFAULT_TREND_RANGE: &str = "30d";
const DEFAULT_CHANGE_RANGE: &str = "7d";
const DEFAULT_CHANGE_DAYS: u32 = 7;

const HELP: &str = "Available commands:
/summary - latest change per product
/average - all-time national average
/regions - average by region
/top <product> [asc|desc] - top 5 states by average price
/trend <product> [state=..] [region=..] [range=7d|30d|90d|ytd|all] - daily average price
/mini <state> <product> - last 7 observations for a state
/change <state> <product> [Nd] - price change over N days (default 7d)
/weekly <product> - weekly report across states
/filters - available states, regions, products and ranges
/list [page=N] [limit=N] [search=..] [sort=period|state|region|<product>] [order=asc|desc] [product=.. min=.. max=..] - stored records
/record <id> - one stored record
/record add state=.. region=.. period=YYYY-MM-DD PMS=.. AGO=.. DPK=.. LPG=.. - store a new record
/record update <id> [field=value..] - change some fields of a record
/record delete <id> - remove a record
Use underscores for spaces in key=value arguments, e.g. state=Cross_River";

/// Handles an incoming command and maps the analyzer's answer to a response.
pub async fn handle_command(command_text: &str, analyzer: &dyn Analyzer) -> CommandResponse {
    info!("Handling command: {}", command_text);
    let mut tokens = command_text.split_whitespace();
    let Some(command) = tokens.next() else {
        return CommandResponse::fail(400, "Empty command. Type /help for a list of commands.");
    };
    let args: Vec<&str> = tokens.collect();

    match command {
        "/help" => CommandResponse::ok(HELP),
        "/summary" => respond(analyzer.summary().await),
        "/average" => respond(analyzer.national_average().await),
        "/regions" => respond(analyzer.average_by_region().await),
        "/filters" => respond(analyzer.filter_options().await),
        "/top" => top(&args, analyzer).await,
        "/trend" => trend(&args, analyzer).await,
        "/mini" => mini_trend(&args, analyzer).await,
        "/change" => price_change(&args, analyzer).await,
        "/weekly" => weekly(&args, analyzer).await,
        "/list" => list(&args, analyzer).await,
        "/record" => record(&args, analyzer).await,
        _ => CommandResponse::fail(404, "Unknown command. Type /help for a list of commands."),
    }
}

fn respond<T: serde::Serialize>(result: Result<T, AnalysisError>) -> CommandResponse {
    match result {
        Ok(data) => CommandResponse::ok(data),
        Err(e) => failure(e),
    }
}

fn failure(err: AnalysisError) -> CommandResponse {
    match err {
        AnalysisError::InvalidArgument(message) => CommandResponse::fail(400, message),
        AnalysisError::Storage(e) => {
            error!("Store failure: {}", e);
            CommandResponse::fail(500, "Internal server error")
        }
    }
}

fn ingest_failure(err: IngestError) -> CommandResponse {
    match err {
        IngestError::Invalid(message) => CommandResponse::fail(400, message),
        IngestError::Storage(e) => failure(e.into()),
    }
}

/// Splits `key=value` arguments, turning `_` in values into spaces.
fn key_values(args: &[&str]) -> Result<Vec<(String, String)>, CommandResponse> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(key, value)| (key.to_lowercase(), value.replace('_', " ")))
                .ok_or_else(|| {
                    CommandResponse::fail(400, format!("Expected key=value, got {arg:?}"))
                })
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CommandResponse> {
    value
        .parse()
        .map_err(|_| CommandResponse::fail(400, format!("Invalid {key}: {value}")))
}

/// Splits `<state words..> <product>` into its parts.
fn state_and_product<'a>(args: &[&'a str]) -> Option<(String, &'a str)> {
    let (product, state) = args.split_last()?;
    if state.is_empty() {
        return None;
    }
    Some((state.join(" "), product))
}

fn is_day_range(token: &str) -> bool {
    token
        .strip_suffix(['d', 'D'])
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Zero or unparsable day counts fall back to the default window.
fn window_days(range: &str) -> u32 {
    range
        .trim_end_matches(['d', 'D'])
        .parse::<u32>()
        .ok()
        .filter(|&days| days > 0)
        .unwrap_or(DEFAULT_CHANGE_DAYS)
}

async fn top(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let Some(product) = args.first() else {
        return CommandResponse::fail(400, "Product is required");
    };
    let order = args
        .get(1)
        .map(|o| SortOrder::parse_lenient(o))
        .unwrap_or_default();
    respond(analyzer.top_states(&product.to_uppercase(), order).await)
}

async fn trend(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let Some(product) = args.first().and_then(|p| p.parse::<Product>().ok()) else {
        return CommandResponse::fail(400, "Invalid or missing product type");
    };

    let mut state: Option<String> = None;
    let mut region: Option<Region> = None;
    let mut range = DEFAULT_TREND_RANGE.to_string();
    for arg in &args[1..] {
        let Some((key, value)) = arg.split_once('=') else {
            return CommandResponse::fail(400, format!("Expected key=value, got {arg:?}"));
        };
        let value = value.replace('_', " ");
        match key {
            "state" => state = Some(value),
            "region" => match value.parse() {
                Ok(r) => region = Some(r),
                Err(_) => return CommandResponse::fail(400, format!("Invalid region: {value}")),
            },
            "range" => range = value,
            other => return CommandResponse::fail(400, format!("Unknown filter: {other}")),
        }
    }

    match analyzer
        .trend(product, state.as_deref(), region, &range)
        .await
    {
        Ok(trend) => CommandResponse::ok(json!({
            "filters": {
                "product": product,
                "state": state,
                "region": region,
                "range": range,
            },
            "trend": trend,
        })),
        Err(e) => failure(e),
    }
}

async fn mini_trend(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let Some((state, product)) = state_and_product(args) else {
        return CommandResponse::fail(400, "state and product are required");
    };
    let Ok(product) = product.parse::<Product>() else {
        return CommandResponse::fail(400, "Invalid product type");
    };

    match analyzer.mini_trend(&state, product).await {
        Ok(trend) => CommandResponse::ok(json!({
            "state": state,
            "product": product,
            "trend": trend,
        })),
        Err(e) => failure(e),
    }
}

async fn price_change(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let (args, range) = match args.split_last() {
        Some((last, rest)) if is_day_range(last) => (rest, *last),
        _ => (args, DEFAULT_CHANGE_RANGE),
    };
    let Some((state, product)) = state_and_product(args) else {
        return CommandResponse::fail(400, "state and product are required");
    };
    let Ok(product) = product.parse::<Product>() else {
        return CommandResponse::fail(400, "Invalid product type");
    };

    match analyzer
        .price_change(&state, product, window_days(range))
        .await
    {
        Ok(Some(change)) => {
            let mut data = json!({
                "state": state,
                "product": product,
                "range": range,
            });
            if let (Value::Object(data), Ok(Value::Object(fields))) =
                (&mut data, serde_json::to_value(&change))
            {
                data.extend(fields);
            }
            CommandResponse::ok(data)
        }
        Ok(None) => CommandResponse::fail(404, "Insufficient data to calculate change"),
        Err(e) => failure(e),
    }
}

async fn weekly(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let Some(product) = args.first() else {
        return CommandResponse::fail(400, "Product is required");
    };

    match analyzer.weekly_report(product).await {
        Ok(report) => CommandResponse::ok(json!({
            "product": product,
            "report": report,
        })),
        Err(e) => failure(e),
    }
}

fn list_query(args: &[&str]) -> Result<ListQuery, CommandResponse> {
    let mut query = ListQuery::default();
    let mut product: Option<Product> = None;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    for (key, value) in key_values(args)? {
        match key.as_str() {
            "page" => query.page = parse_number(&key, &value)?,
            "limit" => query.limit = parse_number(&key, &value)?,
            "search" => query.filter = query.filter.search(value),
            "sort" => {
                query.sort_key = SortKey::from_field(&value).ok_or_else(|| {
                    CommandResponse::fail(400, format!("Cannot sort by {value}"))
                })?
            }
            "order" => query.order = SortOrder::parse_lenient(&value),
            "product" => {
                product = Some(value.to_uppercase().parse().map_err(|_| {
                    CommandResponse::fail(400, format!("Invalid product type: {value}"))
                })?)
            }
            "min" => min = Some(parse_number(&key, &value)?),
            "max" => max = Some(parse_number(&key, &value)?),
            other => return Err(CommandResponse::fail(400, format!("Unknown filter: {other}"))),
        }
    }

    match product {
        Some(product) if min.is_some() || max.is_some() => {
            query.filter = query.filter.price_between(product, min, max);
        }
        None if min.is_some() || max.is_some() => {
            return Err(CommandResponse::fail(400, "min and max need a product"));
        }
        _ => {}
    }
    Ok(query)
}

async fn list(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let query = match list_query(args) {
        Ok(query) => query,
        Err(response) => return response,
    };
    match records::list_records(analyzer.record_store(), &query).await {
        Ok(page) => CommandResponse::ok(page),
        Err(e) => failure(e.into()),
    }
}

fn record_patch(args: &[&str]) -> Result<RecordPatch, CommandResponse> {
    let mut patch = RecordPatch::default();
    for (key, value) in key_values(args)? {
        match key.as_str() {
            "state" => patch.state = Some(value),
            "region" => {
                patch.region = Some(value.parse().map_err(|_| {
                    CommandResponse::fail(400, format!("Invalid region: {value}"))
                })?)
            }
            "period" => {
                patch.period = Some(parse_period(&value).ok_or_else(|| {
                    CommandResponse::fail(400, format!("Invalid period: {value}"))
                })?)
            }
            other => {
                let product: Product = other
                    .to_uppercase()
                    .parse()
                    .map_err(|_| CommandResponse::fail(400, format!("Unknown field: {other}")))?;
                patch.set_price(product, parse_number(other, &value)?);
            }
        }
    }
    Ok(patch)
}

fn record_id(args: &[&str]) -> Result<i64, CommandResponse> {
    let Some(arg) = args.first() else {
        return Err(CommandResponse::fail(400, "Record id is required"));
    };
    parse_number("record id", arg)
}

fn not_found(id: i64) -> CommandResponse {
    CommandResponse::fail(404, format!("Record {id} not found"))
}

async fn record(args: &[&str], analyzer: &dyn Analyzer) -> CommandResponse {
    let store = analyzer.record_store();
    match args.split_first() {
        Some((&"add", rest)) => add_record(rest, store).await,
        Some((&"update", rest)) => update_record(rest, store).await,
        Some((&"delete", rest)) => delete_record(rest, store).await,
        _ => show_record(args, store).await,
    }
}

async fn show_record(args: &[&str], store: &dyn RecordStore) -> CommandResponse {
    let id = match record_id(args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match store.get(id).await {
        Ok(Some(found)) => CommandResponse::ok(found),
        Ok(None) => not_found(id),
        Err(e) => failure(e.into()),
    }
}

async fn add_record(args: &[&str], store: &dyn RecordStore) -> CommandResponse {
    let patch = match record_patch(args) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    let created = match patch.complete() {
        Ok(new) => records::create_record(store, new).await,
        Err(e) => Err(e),
    };
    match created {
        Ok(record) => CommandResponse::created(record),
        Err(e) => ingest_failure(e),
    }
}

async fn update_record(args: &[&str], store: &dyn RecordStore) -> CommandResponse {
    let fields = args.get(1..).unwrap_or_default();
    let (id, patch) = match (record_id(args), record_patch(fields)) {
        (Ok(id), Ok(patch)) => (id, patch),
        (Err(response), _) | (_, Err(response)) => return response,
    };
    match records::update_record(store, id, &patch).await {
        Ok(Some(updated)) => CommandResponse::ok(updated),
        Ok(None) => not_found(id),
        Err(e) => ingest_failure(e),
    }
}

async fn delete_record(args: &[&str], store: &dyn RecordStore) -> CommandResponse {
    let id = match record_id(args) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match records::delete_record(store, id).await {
        Ok(true) => CommandResponse::ok(json!({ "deleted": id })),
        Ok(false) => not_found(id),
        Err(e) => failure(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerImpl, FixedClock};
    use crate::model::NewFuelPrice;
    use crate::storage::{MemoryStorage, RecordStore};
    use chrono::NaiveDate;
    use std::sync::Arc;

    async fn analyzer() -> AnalyzerImpl {
        let store = Arc::new(MemoryStorage::new());
        for (state, region, day, pms) in [
            ("Lagos", Region::SouthWest, 1, 600.0),
            ("Lagos", Region::SouthWest, 10, 620.0),
            ("Cross River", Region::SouthSouth, 1, 700.0),
            ("Cross River", Region::SouthSouth, 10, 650.0),
        ] {
            store
                .insert(&NewFuelPrice {
                    state: state.to_string(),
                    region,
                    period: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
                    pms,
                    ago: 1000.0,
                    dpk: 1100.0,
                    lpg: 900.0,
                })
                .await
                .unwrap();
        }
        let today = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        AnalyzerImpl::with_clock(store, Arc::new(FixedClock(today)))
    }

    #[tokio::test]
    async fn invalid_top_product_is_bad_request() {
        let analyzer = analyzer().await;
        let response = handle_command("/top diesel", &analyzer).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body["success"], false);
    }

    #[tokio::test]
    async fn top_uppercases_product() {
        let analyzer = analyzer().await;
        let response = handle_command("/top pms asc", &analyzer).await;
        assert!(response.is_success());
        assert_eq!(response.body["data"][0]["state"], "Lagos");
        assert_eq!(response.body["data"][0]["value"], 610.0);
    }

    #[tokio::test]
    async fn change_handles_multi_word_states() {
        let analyzer = analyzer().await;
        let response = handle_command("/change Cross River PMS 5d", &analyzer).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["data"]["state"], "Cross River");
        assert_eq!(response.body["data"]["range"], "5d");
        assert_eq!(response.body["data"]["change"], -50.0);
        assert_eq!(response.body["data"]["percentageChange"], -7.14);
    }

    #[tokio::test]
    async fn change_without_history_is_not_found() {
        let analyzer = analyzer().await;
        let response = handle_command("/change Lagos PMS 30d", &analyzer).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn weekly_with_unknown_product_is_empty() {
        let analyzer = analyzer().await;
        let response = handle_command("/weekly pms", &analyzer).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["data"]["report"], json!([]));
    }

    #[tokio::test]
    async fn trend_reads_key_value_filters() {
        let analyzer = analyzer().await;
        let response =
            handle_command("/trend PMS state=Cross_River range=all", &analyzer).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["data"]["filters"]["state"], "Cross River");
        assert_eq!(response.body["data"]["trend"][1]["price"], 650.0);
        assert_eq!(response.body["data"]["trend"][1]["date"], "2024-01-10");

        let bad = handle_command("/trend PMS region=Atlantis", &analyzer).await;
        assert_eq!(bad.status, 400);
    }

    #[tokio::test]
    async fn unknown_command_is_not_found() {
        let analyzer = analyzer().await;
        assert_eq!(handle_command("/launch", &analyzer).await.status, 404);
        assert_eq!(handle_command("   ", &analyzer).await.status, 400);
    }

    #[tokio::test]
    async fn list_pages_sorts_and_filters() {
        let analyzer = analyzer().await;
        let response = handle_command("/list limit=3 sort=PMS order=asc", &analyzer).await;
        assert_eq!(response.status, 200);
        let page = &response.body["data"];
        assert_eq!(page["total"], 4);
        assert_eq!(page["totalPages"], 2);
        assert_eq!(page["data"].as_array().unwrap().len(), 3);
        assert_eq!(page["data"][0]["PMS"], 600.0);

        let cross =
            handle_command("/list search=cross_river product=pms min=660", &analyzer).await;
        assert_eq!(cross.body["data"]["total"], 1);
        assert_eq!(cross.body["data"]["data"][0]["PMS"], 700.0);

        assert_eq!(handle_command("/list min=5", &analyzer).await.status, 400);
        assert_eq!(handle_command("/list sort=colour", &analyzer).await.status, 400);
        assert_eq!(handle_command("/list page=two", &analyzer).await.status, 400);
    }

    #[tokio::test]
    async fn record_commands_add_edit_and_remove() {
        let analyzer = analyzer().await;
        let added = handle_command(
            "/record add state=Ogun region=south_west period=2024-01-11 PMS=630 AGO=1000 DPK=1100 LPG=900",
            &analyzer,
        )
        .await;
        assert_eq!(added.status, 201);
        let id = added.body["data"]["id"].as_i64().unwrap();
        assert_eq!(id, 5);

        let updated = handle_command(&format!("/record update {id} pms=640"), &analyzer).await;
        assert_eq!(updated.status, 200);
        assert_eq!(updated.body["data"]["PMS"], 640.0);
        assert_eq!(updated.body["data"]["state"], "Ogun");

        let shown = handle_command(&format!("/record {id}"), &analyzer).await;
        assert_eq!(shown.body["data"]["region"], "South West");

        let rejected = handle_command(&format!("/record update {id} PMS=-3"), &analyzer).await;
        assert_eq!(rejected.status, 400);
        let deleted = handle_command(&format!("/record delete {id}"), &analyzer).await;
        assert_eq!(deleted.body["data"]["deleted"], id);
        assert_eq!(handle_command(&format!("/record {id}"), &analyzer).await.status, 404);
        assert_eq!(handle_command("/record update 99 PMS=1", &analyzer).await.status, 404);
        assert_eq!(handle_command("/record add state=Ogun", &analyzer).await.status, 400);
        assert_eq!(handle_command("/record abc", &analyzer).await.status, 400);
    }

    #[test]
    fn window_days_falls_back_to_a_week() {
        assert_eq!(window_days("30d"), 30);
        assert_eq!(window_days("0d"), 7);
        assert_eq!(window_days("soon"), 7);
        assert!(is_day_range("90d"));
        assert!(!is_day_range("d"));
        assert!(!is_day_range("PMS"));
    }
}
