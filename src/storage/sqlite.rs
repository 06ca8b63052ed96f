use crate::model::{FuelPriceRecord, NewFuelPrice, Product, SortOrder, StorageError};
use crate::storage::{
    DistinctField, GroupKey, GroupMean, Page, ProductMeans, RecordFilter, RecordStore, SortKey,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const RECORD_COLUMNS: &str =
    "id, state, region, period, pms, ago, dpk, lpg, created_at, updated_at";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and runs migrations.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS fuel_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                state TEXT NOT NULL,
                region TEXT NOT NULL,
                period TEXT NOT NULL,
                pms REAL NOT NULL,
                ago REAL NOT NULL,
                dpk REAL NOT NULL,
                lpg REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_fuel_prices_state_period
                ON fuel_prices (state, period);
            CREATE INDEX IF NOT EXISTS idx_fuel_prices_period
                ON fuel_prices (period);
            ",
        )?;

        // Databases created before audit timestamps were split lack this column
        Self::migrate_add_column_if_missing(&conn, "fuel_prices", "updated_at", "TEXT")?;
        conn.execute(
            "UPDATE fuel_prices SET updated_at = created_at WHERE updated_at IS NULL",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Adds the column to the table when it does not exist yet.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            debug!("Adding column {}.{}", table, column);
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    /// Renders the filter as a WHERE clause (with leading space) plus its bound values.
    fn build_where(filter: &RecordFilter) -> (String, Vec<Value>) {
        let mut frags: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(state) = &filter.state {
            frags.push("state = ?".to_string());
            values.push(Value::Text(state.clone()));
        }
        if let Some(region) = filter.region {
            frags.push("region = ?".to_string());
            values.push(Value::Text(region.name().to_string()));
        }
        if let Some(from) = filter.period_from {
            frags.push("period >= ?".to_string());
            values.push(Value::Text(date_text(from)));
        }
        if let Some(to) = filter.period_to {
            frags.push("period <= ?".to_string());
            values.push(Value::Text(date_text(to)));
        }
        if let Some(product) = filter.has_product {
            // 9e999 overflows to +Inf, so this keeps finite prices only
            frags.push(format!("ABS({}) < 9e999", product.column()));
        }
        if let Some(text) = &filter.search {
            frags.push("(state LIKE ? ESCAPE '\\' OR region LIKE ? ESCAPE '\\')".to_string());
            let pattern = format!("%{}%", escape_like(text));
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(range) = filter.price_range {
            let column = range.product.column();
            if let Some(min) = range.min {
                frags.push(format!("{column} >= ?"));
                values.push(Value::Real(min));
            }
            if let Some(max) = range.max {
                frags.push(format!("{column} <= ?"));
                values.push(Value::Real(max));
            }
        }

        if frags.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", frags.join(" AND ")), values)
        }
    }

    fn map_record(row: &Row) -> Result<FuelPriceRecord, rusqlite::Error> {
        let region_text: String = row.get(2)?;
        let region = region_text.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
        })?;

        Ok(FuelPriceRecord {
            id: row.get(0)?,
            state: row.get(1)?,
            region,
            period: row.get(3)?,
            pms: row.get(4)?,
            ago: row.get(5)?,
            dpk: row.get(6)?,
            lpg: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// LIKE is case-insensitive for ASCII; the wildcards in user text are escaped.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

fn order_by(sort_key: SortKey, order: SortOrder) -> String {
    let dir = direction(order);
    let primary = match sort_key {
        SortKey::Period => None,
        SortKey::State => Some("state"),
        SortKey::Region => Some("region"),
        SortKey::Price(product) => Some(product.column()),
    };
    match primary {
        Some(column) => format!("{column} {dir}, period {dir}, id {dir}"),
        None => format!("period {dir}, id {dir}"),
    }
}

fn select_by_id(conn: &Connection, id: i64) -> Result<Option<FuelPriceRecord>, StorageError> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM fuel_prices WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id], SqliteStorage::map_record)
        .optional()?)
}

#[async_trait]
impl RecordStore for SqliteStorage {
    async fn find_top_n(
        &self,
        filter: &RecordFilter,
        sort_key: SortKey,
        order: SortOrder,
        n: usize,
    ) -> Result<Vec<FuelPriceRecord>, StorageError> {
        let (where_clause, mut values) = Self::build_where(filter);
        let order_by = order_by(sort_key, order);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM fuel_prices{where_clause} ORDER BY {order_by} LIMIT ?"
        );
        values.push(Value::Integer(i64::try_from(n).unwrap_or(i64::MAX)));

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), Self::map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn find_all(&self, filter: &RecordFilter) -> Result<Vec<FuelPriceRecord>, StorageError> {
        let (where_clause, values) = Self::build_where(filter);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM fuel_prices{where_clause} ORDER BY period ASC, id ASC"
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), Self::map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn distinct_values(&self, field: DistinctField) -> Result<Vec<String>, StorageError> {
        let column = match field {
            DistinctField::State => "state",
            DistinctField::Region => "region",
        };
        let sql = format!("SELECT DISTINCT {column} FROM fuel_prices ORDER BY {column}");

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    async fn aggregate_group_mean(
        &self,
        group_key: GroupKey,
        filter: &RecordFilter,
        products: &[Product],
    ) -> Result<Vec<GroupMean>, StorageError> {
        let (where_clause, values) = Self::build_where(filter);
        let averages = Product::ALL
            .iter()
            .map(|p| {
                if products.contains(p) {
                    format!("AVG({})", p.column())
                } else {
                    "NULL".to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let group_column = match group_key {
            GroupKey::All => None,
            GroupKey::State => Some("state"),
            GroupKey::Region => Some("region"),
            GroupKey::Period => Some("period"),
        };
        let sql = match group_column {
            None => format!("SELECT NULL, COUNT(*), {averages} FROM fuel_prices{where_clause}"),
            Some(column) => format!(
                "SELECT {column}, COUNT(*), {averages} FROM fuel_prices{where_clause} \
                 GROUP BY {column} ORDER BY {column}"
            ),
        };

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let groups = stmt
            .query_map(params_from_iter(values), |row| {
                let count: i64 = row.get(1)?;
                Ok(GroupMean {
                    key: row.get(0)?,
                    count: u64::try_from(count).unwrap_or_default(),
                    means: ProductMeans {
                        pms: row.get(2)?,
                        ago: row.get(3)?,
                        dpk: row.get(4)?,
                        lpg: row.get(5)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StorageError> {
        let (where_clause, values) = Self::build_where(filter);
        let sql = format!("SELECT COUNT(*) FROM fuel_prices{where_clause}");

        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        u64::try_from(count).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn find_page(
        &self,
        filter: &RecordFilter,
        sort_key: SortKey,
        order: SortOrder,
        offset: usize,
        limit: usize,
    ) -> Result<Page, StorageError> {
        let (where_clause, values) = Self::build_where(filter);
        let count_sql = format!("SELECT COUNT(*) FROM fuel_prices{where_clause}");
        let order_by = order_by(sort_key, order);
        let page_sql = format!(
            "SELECT {RECORD_COLUMNS} FROM fuel_prices{where_clause} \
             ORDER BY {order_by} LIMIT ? OFFSET ?"
        );
        let mut page_values = values.clone();
        page_values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        page_values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let conn = self.conn.lock().await;
        let total: i64 = conn.query_row(&count_sql, params_from_iter(values), |row| row.get(0))?;
        let mut stmt = conn.prepare(&page_sql)?;
        let records = stmt
            .query_map(params_from_iter(page_values), Self::map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            records,
            total: u64::try_from(total).map_err(|e| StorageError::Corrupt(e.to_string()))?,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<FuelPriceRecord>, StorageError> {
        let conn = self.conn.lock().await;
        select_by_id(&conn, id)
    }

    async fn insert(&self, record: &NewFuelPrice) -> Result<i64, StorageError> {
        let now = Utc::now();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO fuel_prices (
                state, region, period, pms, ago, dpk, lpg, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &record.state,
                record.region.name(),
                &record.period,
                &record.pms,
                &record.ago,
                &record.dpk,
                &record.lpg,
                &now,
                &now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update(
        &self,
        id: i64,
        record: &NewFuelPrice,
    ) -> Result<Option<FuelPriceRecord>, StorageError> {
        let now = Utc::now();
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE fuel_prices
             SET state = ?1, region = ?2, period = ?3, pms = ?4, ago = ?5, dpk = ?6, lpg = ?7,
                 updated_at = ?8
             WHERE id = ?9",
            params![
                &record.state,
                record.region.name(),
                &record.period,
                &record.pms,
                &record.ago,
                &record.dpk,
                &record.lpg,
                &now,
                &id,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        select_by_id(&conn, id)
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM fuel_prices WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;

    fn record(state: &str, region: Region, day: u32, pms: f64) -> NewFuelPrice {
        NewFuelPrice {
            state: state.to_string(),
            region,
            period: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            pms,
            ago: pms + 100.0,
            dpk: pms + 50.0,
            lpg: pms - 100.0,
        }
    }

    async fn seeded() -> SqliteStorage {
        let storage = SqliteStorage::in_memory().unwrap();
        for r in [
            record("Lagos", Region::SouthWest, 1, 600.0),
            record("Lagos", Region::SouthWest, 2, 620.0),
            record("Kano", Region::NorthWest, 1, 610.0),
            record("Kano", Region::NorthWest, 3, 630.0),
        ] {
            storage.insert(&r).await.unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn find_top_n_sorts_by_period_and_limits() {
        let storage = seeded().await;
        let latest = storage
            .find_top_n(&RecordFilter::new(), SortKey::Period, SortOrder::Desc, 2)
            .await
            .unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].state, "Kano");
        assert_eq!(latest[0].period, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(latest[1].pms, 620.0);
        assert_eq!(latest[1].region, Region::SouthWest);
    }

    #[tokio::test]
    async fn filter_bounds_are_inclusive() {
        let storage = seeded().await;
        let filter = RecordFilter::new()
            .period_from(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
            .period_to(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(storage.count(&filter).await.unwrap(), 2);
        assert_eq!(
            storage.count(&RecordFilter::new().state("Lagos")).await.unwrap(),
            2
        );
        assert_eq!(
            storage
                .count(&RecordFilter::new().region(Region::SouthSouth))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn group_means_cover_requested_products_only() {
        let storage = seeded().await;
        let groups = storage
            .aggregate_group_mean(GroupKey::State, &RecordFilter::new(), &[Product::Pms])
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.as_deref(), Some("Kano"));
        assert_eq!(groups[0].means.pms, Some(620.0));
        assert_eq!(groups[0].means.ago, None);
        assert_eq!(groups[1].count, 2);
    }

    #[tokio::test]
    async fn group_all_on_empty_store_yields_empty_means() {
        let storage = SqliteStorage::in_memory().unwrap();
        let groups = storage
            .aggregate_group_mean(GroupKey::All, &RecordFilter::new(), &Product::ALL)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 0);
        assert_eq!(groups[0].means, ProductMeans::default());
    }

    #[tokio::test]
    async fn distinct_values_are_sorted() {
        let storage = seeded().await;
        let states = storage.distinct_values(DistinctField::State).await.unwrap();
        assert_eq!(states, vec!["Kano".to_string(), "Lagos".to_string()]);
        let regions = storage.distinct_values(DistinctField::Region).await.unwrap();
        assert_eq!(regions, vec!["North West".to_string(), "South West".to_string()]);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuel.db");
        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage
                .insert(&record("Enugu", Region::SouthEast, 5, 650.0))
                .await
                .unwrap();
        }
        let reopened = SqliteStorage::new(&path).unwrap();
        let all = reopened.find_all(&RecordFilter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, "Enugu");
        assert_eq!(all[0].created_at, all[0].updated_at);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let storage = seeded().await;
        storage
            .insert(&record("Ab_ia", Region::SouthEast, 4, 640.0))
            .await
            .unwrap();

        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(storage.count(&RecordFilter::new().search("b_i")).await.unwrap(), 1);
        assert_eq!(storage.count(&RecordFilter::new().search("%")).await.unwrap(), 0);
        assert_eq!(storage.count(&RecordFilter::new().search("WEST")).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn update_keeps_created_at() {
        let storage = seeded().await;
        let before = storage.get(1).await.unwrap().unwrap();
        let updated = storage
            .update(1, &record("Lagos", Region::SouthWest, 1, 605.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.pms, 605.0);
        assert_eq!(updated.created_at, before.created_at);
        assert!(updated.updated_at >= before.updated_at);
        let missing = storage
            .update(99, &record("Oyo", Region::SouthWest, 1, 1.0))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
