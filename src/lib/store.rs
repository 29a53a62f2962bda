//! SQLite-backed log tables: schema inspection, slot provisioning and the
//! grouped row queries the archiver consumes.

use std::{collections::BTreeSet, fs, path::Path};

use parking_lot::Mutex;
use rusqlite::{Connection, Row, params_from_iter, types::Value};
use tracing::{debug, trace};

use super::{
    error::Result,
    metrics::{EcommerceMetrics, GOAL_ECOMMERCE_CART, GOAL_ECOMMERCE_ORDER, GoalMetrics},
    provision::SlotProvisioner,
    schema::SchemaInspector,
    scope::Scope,
    slot::{self, LEGACY_PRICE_VALUE_SLOT},
    source::{
        ActionRow, ConversionRow, ExtraSelect, RowSource, SlotQuery, VisitMetrics, VisitRow,
    },
};

pub const DEFAULT_COLUMN_LENGTH: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Width of newly added `VARCHAR` custom variable columns.
    pub column_length: u32,
    /// When disabled the conversion source reports itself unavailable.
    pub conversions_enabled: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            column_length: DEFAULT_COLUMN_LENGTH,
            conversions_enabled: true,
        }
    }
}

/// One custom variable set on a logged visit, action or conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomVariable {
    pub index: u32,
    pub name: String,
    pub value: Option<String>,
}

impl CustomVariable {
    pub fn new(index: u32, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn without_value(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewVisit {
    pub visitor_id: String,
    pub user_id: Option<String>,
    pub total_actions: i64,
    pub total_time: i64,
    pub converted: bool,
    pub custom_variables: Vec<CustomVariable>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAction {
    pub visit_id: i64,
    pub visitor_id: String,
    pub custom_variables: Vec<CustomVariable>,
}

#[derive(Debug, Clone, Default)]
pub struct NewConversion {
    pub visit_id: i64,
    pub goal_id: i64,
    pub revenue: f64,
    pub ecommerce: Option<EcommerceMetrics>,
    pub custom_variables: Vec<CustomVariable>,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    options: StoreOptions,
}

impl SqliteStore {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened log database");
        Self::with_connection(conn, options)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, options)
    }

    fn with_connection(conn: Connection, options: StoreOptions) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            options,
        };
        store.ensure_log_tables()?;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Creates the three log tables without any custom variable column.
    pub fn ensure_log_tables(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS log_visit (
                idvisit INTEGER PRIMARY KEY AUTOINCREMENT,
                idvisitor TEXT NOT NULL,
                user_id TEXT,
                visit_total_actions INTEGER NOT NULL DEFAULT 0,
                visit_total_time INTEGER NOT NULL DEFAULT 0,
                visit_goal_converted INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS log_link_visit_action (
                idlink_va INTEGER PRIMARY KEY AUTOINCREMENT,
                idvisit INTEGER NOT NULL,
                idvisitor TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS log_conversion (
                idconversion INTEGER PRIMARY KEY AUTOINCREMENT,
                idvisit INTEGER NOT NULL,
                idgoal INTEGER NOT NULL,
                revenue REAL NOT NULL DEFAULT 0,
                revenue_subtotal REAL,
                revenue_tax REAL,
                revenue_shipping REAL,
                revenue_discount REAL,
                items INTEGER
            );",
        )?;
        Ok(())
    }

    pub fn insert_visit(&self, visit: &NewVisit) -> Result<i64> {
        let mut columns = vec![
            "idvisitor",
            "user_id",
            "visit_total_actions",
            "visit_total_time",
            "visit_goal_converted",
        ]
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
        let mut params = vec![
            Value::from(visit.visitor_id.clone()),
            visit.user_id.clone().map(Value::from).unwrap_or(Value::Null),
            Value::from(visit.total_actions),
            Value::from(visit.total_time),
            Value::from(i64::from(visit.converted)),
        ];
        push_custom_variables(&mut columns, &mut params, &visit.custom_variables);
        self.insert(Scope::Visit, &columns, params)
    }

    pub fn insert_action(&self, action: &NewAction) -> Result<i64> {
        let mut columns = vec!["idvisit".to_string(), "idvisitor".to_string()];
        let mut params = vec![
            Value::from(action.visit_id),
            Value::from(action.visitor_id.clone()),
        ];
        push_custom_variables(&mut columns, &mut params, &action.custom_variables);
        self.insert(Scope::Page, &columns, params)
    }

    pub fn insert_conversion(&self, conversion: &NewConversion) -> Result<i64> {
        let mut columns = vec![
            "idvisit".to_string(),
            "idgoal".to_string(),
            "revenue".to_string(),
        ];
        let mut params = vec![
            Value::from(conversion.visit_id),
            Value::from(conversion.goal_id),
            Value::from(conversion.revenue),
        ];
        if let Some(ecommerce) = &conversion.ecommerce {
            for (column, value) in [
                ("revenue_subtotal", Value::from(ecommerce.revenue_subtotal)),
                ("revenue_tax", Value::from(ecommerce.revenue_tax)),
                ("revenue_shipping", Value::from(ecommerce.revenue_shipping)),
                ("revenue_discount", Value::from(ecommerce.revenue_discount)),
                ("items", Value::from(ecommerce.items)),
            ] {
                columns.push(column.to_string());
                params.push(value);
            }
        }
        push_custom_variables(&mut columns, &mut params, &conversion.custom_variables);
        self.insert(Scope::Conversion, &columns, params)
    }

    fn insert(&self, scope: Scope, columns: &[String], params: Vec<Value>) -> Result<i64> {
        let placeholders: Vec<String> = (1..=columns.len()).map(|idx| format!("?{idx}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders})",
            table = scope.table_name(),
            columns = columns.join(", "),
            placeholders = placeholders.join(", ")
        );
        let conn = self.conn.lock();
        conn.execute(&sql, params_from_iter(params))?;
        Ok(conn.last_insert_rowid())
    }

    /// Whether both columns of `query`'s slot exist for `scope`.
    fn has_slot(&self, scope: Scope, query: &SlotQuery) -> Result<bool> {
        let columns = self.column_names(scope)?;
        Ok(columns.contains(&query.key_column) && columns.contains(&query.value_column))
    }

    fn query_rows<T>(
        &self,
        sql: &str,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn push_custom_variables(
    columns: &mut Vec<String>,
    params: &mut Vec<Value>,
    variables: &[CustomVariable],
) {
    for variable in variables {
        columns.push(slot::key_column(variable.index));
        params.push(Value::from(variable.name.clone()));
        columns.push(slot::value_column(variable.index));
        params.push(variable.value.clone().map(Value::from).unwrap_or(Value::Null));
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.collect::<rusqlite::Result<BTreeSet<_>>>()?)
}

fn highest_slot(conn: &Connection, table: &str) -> Result<u32> {
    Ok(table_columns(conn, table)?
        .iter()
        .filter_map(|column| slot::index_from_column(column))
        .max()
        .unwrap_or(0))
}

impl SchemaInspector for SqliteStore {
    fn column_names(&self, scope: Scope) -> Result<BTreeSet<String>> {
        let conn = self.conn.lock();
        table_columns(&conn, scope.table_name())
    }
}

impl SlotProvisioner for SqliteStore {
    fn add_slot(&self, scope: Scope) -> Result<u32> {
        let mut conn = self.conn.lock();
        let table = scope.table_name();
        let index = highest_slot(&conn, table)? + 1;
        let tx = conn.transaction()?;
        for column in [slot::key_column(index), slot::value_column(index)] {
            tx.execute(
                &format!(
                    "ALTER TABLE {table} ADD COLUMN {column} VARCHAR({len}) DEFAULT NULL",
                    len = self.options.column_length
                ),
                [],
            )?;
        }
        tx.commit()?;
        Ok(index)
    }

    fn remove_slot(&self, scope: Scope) -> Result<Option<u32>> {
        let mut conn = self.conn.lock();
        let table = scope.table_name();
        let index = highest_slot(&conn, table)?;
        if index == 0 {
            return Ok(None);
        }
        let existing = table_columns(&conn, table)?;
        let tx = conn.transaction()?;
        for column in [slot::key_column(index), slot::value_column(index)] {
            if existing.contains(&column) {
                tx.execute(&format!("ALTER TABLE {table} DROP COLUMN {column}"), [])?;
            }
        }
        tx.commit()?;
        Ok(Some(index))
    }
}

impl RowSource for SqliteStore {
    fn visit_rows(&self, query: &SlotQuery) -> Result<Vec<VisitRow>> {
        if !self.has_slot(Scope::Visit, query)? {
            trace!(slot = query.slot, "visit slot not provisioned");
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT v.{key} AS cv_key, v.{value} AS cv_value,
                COUNT(DISTINCT v.idvisitor),
                COUNT(*),
                COALESCE(SUM(v.visit_total_actions), 0),
                COUNT(DISTINCT v.user_id),
                COALESCE(MAX(v.visit_total_actions), 0),
                COALESCE(SUM(v.visit_total_time), 0),
                SUM(CASE WHEN v.visit_total_actions <= 1 THEN 1 ELSE 0 END),
                SUM(CASE WHEN v.visit_goal_converted = 1 THEN 1 ELSE 0 END)
             FROM log_visit v
             WHERE {filter}
             GROUP BY cv_key, cv_value",
            key = query.key_column,
            value = query.value_column,
            filter = query.filter_sql("v"),
        );
        self.query_rows(&sql, |row| {
            Ok(VisitRow {
                key: row.get(0)?,
                value: row.get(1)?,
                metrics: VisitMetrics {
                    nb_uniq_visitors: row.get(2)?,
                    nb_visits: row.get(3)?,
                    nb_actions: row.get(4)?,
                    nb_users: row.get(5)?,
                    max_actions: row.get(6)?,
                    sum_visit_length: row.get(7)?,
                    bounce_count: row.get(8)?,
                    nb_visits_converted: row.get(9)?,
                },
            })
        })
    }

    fn action_rows(&self, query: &SlotQuery) -> Result<Vec<ActionRow>> {
        if !self.has_slot(Scope::Page, query)? {
            trace!(slot = query.slot, "page slot not provisioned");
            return Ok(Vec::new());
        }
        let price_column = slot::value_column(LEGACY_PRICE_VALUE_SLOT);
        let with_price = query.wants(ExtraSelect::AveragePriceViewed)
            && self.column_names(Scope::Page)?.contains(&price_column);
        let price_select = if with_price {
            format!(", ROUND(AVG(CAST(a.{price_column} AS REAL)), 2)")
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT a.{key} AS cv_key, a.{value} AS cv_value,
                COUNT(DISTINCT a.idvisitor),
                COUNT(DISTINCT a.idvisit),
                COUNT(*){price_select}
             FROM log_link_visit_action a
             WHERE {filter}
             GROUP BY cv_key, cv_value",
            key = query.key_column,
            value = query.value_column,
            filter = query.filter_sql("a"),
        );
        self.query_rows(&sql, |row| {
            Ok(ActionRow {
                key: row.get(0)?,
                value: row.get(1)?,
                nb_uniq_visitors: row.get(2)?,
                nb_visits: row.get(3)?,
                nb_actions: row.get(4)?,
                price_viewed: if with_price { row.get(5)? } else { None },
            })
        })
    }

    fn conversion_rows(&self, query: &SlotQuery) -> Result<Option<Vec<ConversionRow>>> {
        if !self.options.conversions_enabled {
            return Ok(None);
        }
        if !self.has_slot(Scope::Conversion, query)? {
            trace!(slot = query.slot, "conversion slot not provisioned");
            return Ok(Some(Vec::new()));
        }
        let sql = format!(
            "SELECT c.{key} AS cv_key, c.{value} AS cv_value, c.idgoal,
                COUNT(*),
                COUNT(DISTINCT c.idvisit),
                COALESCE(SUM(c.revenue), 0.0),
                COALESCE(SUM(c.revenue_subtotal), 0.0),
                COALESCE(SUM(c.revenue_tax), 0.0),
                COALESCE(SUM(c.revenue_shipping), 0.0),
                COALESCE(SUM(c.revenue_discount), 0.0),
                COALESCE(SUM(c.items), 0)
             FROM log_conversion c
             WHERE {filter}
             GROUP BY cv_key, cv_value, c.idgoal",
            key = query.key_column,
            value = query.value_column,
            filter = query.filter_sql("c"),
        );
        let rows = self.query_rows(&sql, |row| {
            let goal_id: i64 = row.get(2)?;
            let ecommerce = if goal_id == GOAL_ECOMMERCE_ORDER || goal_id == GOAL_ECOMMERCE_CART {
                Some(EcommerceMetrics {
                    revenue_subtotal: row.get(6)?,
                    revenue_tax: row.get(7)?,
                    revenue_shipping: row.get(8)?,
                    revenue_discount: row.get(9)?,
                    items: row.get(10)?,
                })
            } else {
                None
            };
            Ok(ConversionRow {
                key: row.get(0)?,
                value: row.get(1)?,
                goal_id,
                metrics: GoalMetrics {
                    nb_conversions: row.get(3)?,
                    nb_visits_converted: row.get(4)?,
                    revenue: row.get(5)?,
                    ecommerce,
                },
            })
        })?;
        Ok(Some(rows))
    }
}
