//! JSON request descriptors for callers outside Rust.
//!
//! Page code on the other side of the C ABI cannot chain builder calls, so it
//! sends the whole chain as one document:
//!
//! ```json
//! {
//!   "table": "tours",
//!   "action": "select",
//!   "columns": "*",
//!   "filters": [{ "op": "gte", "field": "price", "value": 50000 }],
//!   "or": "title.ilike.%bali%,location.ilike.%bali%",
//!   "order": { "field": "price", "ascending": true },
//!   "range": { "from": 0, "to": 8 }
//! }
//! ```
//!
//! The descriptor is replayed onto the typed builders, so both paths share
//! one evaluation.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::filter::Filter;
use crate::local_db_model::{Booking, Record, Review, Table, Tour, User, Wishlist};
use crate::local_db_state::LocalDb;
use crate::query::{Direction, Query, SelectOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FilterSpec {
    Eq { field: String, value: Value },
    Gte { field: String, value: Value },
    Lte { field: String, value: Value },
    Ilike { field: String, pattern: String },
}

impl From<FilterSpec> for Filter {
    fn from(spec: FilterSpec) -> Self {
        match spec {
            FilterSpec::Eq { field, value } => Filter::eq(field, value),
            FilterSpec::Gte { field, value } => Filter::gte(field, value),
            FilterSpec::Lte { field, value } => Filter::lte(field, value),
            FilterSpec::Ilike { field, pattern } => Filter::ilike(field, &pattern),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    #[serde(default = "ascending_by_default")]
    pub ascending: bool,
}

fn ascending_by_default() -> bool {
    true
}

/// `to: null` means through the end of the filtered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeSpec {
    pub from: usize,
    #[serde(default)]
    pub to: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    pub table: String,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub columns: Option<String>,
    #[serde(default)]
    pub head: bool,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub or: Option<String>,
    #[serde(default)]
    pub order: Option<OrderSpec>,
    #[serde(default)]
    pub range: Option<RangeSpec>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub rows: Vec<Value>,
    #[serde(default)]
    pub patch: Option<Map<String, Value>>,
    /// Return the first row instead of the list.
    #[serde(default)]
    pub single: bool,
}

impl QueryRequest {
    /// Runs the request and returns its result envelope as JSON.
    pub fn execute(self, db: &LocalDb) -> Result<Value, StoreError> {
        match self.table.parse::<Table>()? {
            Table::Tours => self.run::<Tour>(db),
            Table::Users => self.run::<User>(db),
            Table::Bookings => self.run::<Booking>(db),
            Table::Reviews => self.run::<Review>(db),
            Table::Wishlists => self.run::<Wishlist>(db),
        }
    }

    fn run<R: Record>(self, db: &LocalDb) -> Result<Value, StoreError> {
        let single = self.single;
        match self.action {
            Action::Select => {
                let query = self.build_query::<R>(db);
                if single {
                    Ok(serde_json::to_value(query.single())?)
                } else {
                    Ok(serde_json::to_value(query.execute())?)
                }
            }
            Action::Insert => {
                let result = db.from::<R>().insert_json(self.rows);
                if single {
                    Ok(serde_json::to_value(result.single())?)
                } else {
                    Ok(serde_json::to_value(result)?)
                }
            }
            Action::Update => {
                let patch = self
                    .patch
                    .clone()
                    .ok_or_else(|| StoreError::Validation("update request needs a patch".into()))?;
                let result = self.build_query::<R>(db).update(patch).execute();
                if single {
                    Ok(serde_json::to_value(result.single())?)
                } else {
                    Ok(serde_json::to_value(result)?)
                }
            }
            Action::Delete => {
                let result = self.build_query::<R>(db).delete().execute();
                if single {
                    Ok(serde_json::to_value(result.single())?)
                } else {
                    Ok(serde_json::to_value(result)?)
                }
            }
        }
    }

    fn build_query<R: Record>(self, db: &LocalDb) -> Query<'_, R> {
        let options = SelectOptions {
            count: None,
            head: self.head,
        };
        let mut query = db
            .from::<R>()
            .select_with(self.columns.as_deref().unwrap_or("*"), options);

        for spec in self.filters {
            query = query.filter(spec.into());
        }
        if let Some(expr) = &self.or {
            query = query.or(expr);
        }
        if let Some(order) = &self.order {
            let direction = if order.ascending {
                Direction::Ascending
            } else {
                Direction::Descending
            };
            query = query.order(&order.field, direction);
        }
        // Mirrors chained calls: a limit registered after a range wins.
        if let Some(range) = self.range {
            query = match range.to {
                Some(to) => query.range(range.from, to),
                None => query.range_from(range.from),
            };
        }
        if let Some(n) = self.limit {
            query = query.limit(n);
        }
        query
    }
}
