//! The chainable query builder.
//!
//! A [`Query`] is bound to one collection and accumulates filters, a sort key
//! and a pagination window without touching the store. Nothing runs until a
//! terminal call ([`Query::execute`], [`Query::single`],
//! [`Query::maybe_single`]), which always evaluates in the same order
//! regardless of how the chain was written:
//!
//! 1. read the collection (seeding and deduplicating tours on the way)
//! 2. keep rows satisfying every filter
//! 3. record the count
//! 4. stable-sort by the order key, if any
//! 5. slice to the window, if any
//! 6. attach related records when the column list asks for them
//!
//! ```no_run
//! use wanderlust_store::local_db_model::Tour;
//! use wanderlust_store::local_db_state::LocalDb;
//! use wanderlust_store::query::Direction;
//!
//! let db = LocalDb::in_memory();
//! let page = db
//!     .from::<Tour>()
//!     .select("*")
//!     .or("title.ilike.%alps%,location.ilike.%alps%")
//!     .gte("price", 50_000)
//!     .order("price", Direction::Ascending)
//!     .range(0, 8)
//!     .execute();
//! assert!(page.error.is_none());
//! ```

use std::marker::PhantomData;

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ErrorSlot, StoreError};
use crate::filter::{parse_or_expression, sort_cmp, Filter, OrClause};
use crate::local_db_model::Record;
use crate::local_db_state::LocalDb;
use crate::relations::{self, Row};
use crate::write::{self, Mutation, WriteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    #[default]
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectOptions {
    pub count: Option<CountMode>,
    /// Return no rows, only the count.
    pub head: bool,
}

impl SelectOptions {
    pub fn exact() -> Self {
        Self {
            count: Some(CountMode::Exact),
            head: false,
        }
    }

    pub fn head() -> Self {
        Self {
            count: Some(CountMode::Exact),
            head: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderBy {
    field: String,
    direction: Direction,
}

/// A pagination window: `offset` rows skipped, at most `len` kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub len: Option<usize>,
}

impl Window {
    /// Inclusive `from..=to`; an inverted range is empty.
    pub fn between(from: usize, to: usize) -> Self {
        Self {
            offset: from,
            len: Some(if to >= from { to - from + 1 } else { 0 }),
        }
    }

    pub fn apply<T>(self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .skip(self.offset)
            .take(self.len.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Result envelope of a read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult<R> {
    pub data: Vec<Row<R>>,
    /// Matches before pagination.
    pub count: usize,
    pub error: Option<ErrorSlot>,
}

impl<R> QueryResult<R> {
    fn failed(error: ErrorSlot) -> Self {
        Self {
            data: Vec::new(),
            count: 0,
            error: Some(error),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.data.iter().map(|row| &row.record)
    }

    pub fn into_records(self) -> Vec<R> {
        self.data.into_iter().map(|row| row.record).collect()
    }
}

/// Result envelope of a single-row accessor. Not found is `data: None`
/// with no error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleResult<T> {
    pub data: Option<T>,
    pub error: Option<ErrorSlot>,
}

pub struct Query<'a, R: Record> {
    db: &'a LocalDb,
    columns: Option<String>,
    options: SelectOptions,
    filters: Vec<Filter>,
    order: Option<OrderBy>,
    window: Option<Window>,
    _record: PhantomData<R>,
}

impl<'a, R: Record> Query<'a, R> {
    pub(crate) fn new(db: &'a LocalDb) -> Self {
        Self {
            db,
            columns: None,
            options: SelectOptions::default(),
            filters: Vec::new(),
            order: None,
            window: None,
            _record: PhantomData,
        }
    }

    pub fn select(self, columns: &str) -> Self {
        self.select_with(columns, SelectOptions::default())
    }

    pub fn select_with(mut self, columns: &str, options: SelectOptions) -> Self {
        self.columns = Some(columns.to_string());
        self.options = options;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(field, value))
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::gte(field, value))
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::lte(field, value))
    }

    pub fn ilike(self, field: &str, pattern: &str) -> Self {
        self.filter(Filter::ilike(field, pattern))
    }

    /// Parses `field.op.value,field.op.value` into one any-of group.
    pub fn or(self, expression: &str) -> Self {
        self.any_of(parse_or_expression(expression))
    }

    pub fn any_of(self, clauses: Vec<OrClause>) -> Self {
        self.filter(Filter::Or(clauses))
    }

    /// Replaces any earlier sort key.
    pub fn order(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Inclusive window; replaces any earlier `range` or `limit`.
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.window = Some(Window::between(from, to));
        self
    }

    /// Everything from `from` to the end of the filtered set.
    pub fn range_from(mut self, from: usize) -> Self {
        self.window = Some(Window {
            offset: from,
            len: None,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.window = Some(Window {
            offset: 0,
            len: Some(n),
        });
        self
    }

    pub fn execute(self) -> QueryResult<R> {
        match self.evaluate() {
            Ok(result) => result,
            Err(e) => {
                warn!("Query on {} failed: {e}", R::TABLE);
                QueryResult::failed(ErrorSlot::new(e.to_string()))
            }
        }
    }

    /// The first row, if any.
    pub fn single(self) -> SingleResult<Row<R>> {
        let result = self.execute();
        SingleResult {
            data: result.data.into_iter().next(),
            error: result.error,
        }
    }

    pub fn maybe_single(self) -> SingleResult<Row<R>> {
        self.single()
    }

    /// Inserts `rows`, ignoring any registered filters.
    pub fn insert(self, rows: Vec<R>) -> WriteResult<R> {
        write::insert(self.db, rows)
    }

    /// Inserts untyped rows, validating each against `R`.
    pub fn insert_json(self, rows: Vec<Value>) -> WriteResult<R> {
        write::insert_values(self.db, rows)
    }

    /// Starts an update that inherits the filters registered so far.
    pub fn update(self, patch: Map<String, Value>) -> Mutation<'a, R> {
        Mutation::update(self.db, patch, self.filters)
    }

    /// Starts a delete that inherits the filters registered so far.
    pub fn delete(self) -> Mutation<'a, R> {
        Mutation::delete(self.db, self.filters)
    }

    fn evaluate(&self) -> Result<QueryResult<R>, StoreError> {
        let rows = self.db.read_table::<R>();

        let mut matched = Vec::new();
        for row in rows {
            let doc = serde_json::to_value(&row)?;
            if self.filters.iter().all(|f| f.matches(&doc)) {
                matched.push((row, doc));
            }
        }
        let count = matched.len();

        if let Some(order) = &self.order {
            matched.sort_by(|(_, a), (_, b)| {
                let ordering = sort_cmp(a.get(&order.field), b.get(&order.field));
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        let page = match self.window {
            Some(window) => window.apply(matched),
            None => matched,
        };

        debug!(
            "Query on {}: {} filters, {count} matched, {} returned",
            R::TABLE,
            self.filters.len(),
            page.len()
        );

        if self.options.head {
            return Ok(QueryResult {
                data: Vec::new(),
                count,
                error: None,
            });
        }

        let records = page.into_iter().map(|(row, _)| row).collect();
        Ok(QueryResult {
            data: relations::enrich(self.db, records, self.columns.as_deref()),
            count,
            error: None,
        })
    }
}
