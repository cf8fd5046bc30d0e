//! Insert, update and delete.
//!
//! Writes read the whole collection, transform it and write it back. The store
//! assigns identities: inserted rows get a fresh `id` and `created_at` (and
//! `updated_at` for tables that track one), whatever the caller supplied.
//! Failures never escape as `Err`; they surface in the result's `error` slot.

use std::marker::PhantomData;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ErrorSlot, StoreError};
use crate::filter::{Filter, OrClause};
use crate::local_db_model::Record;
use crate::local_db_state::LocalDb;
use crate::query::SingleResult;
use crate::seed::fresh_id;

/// Result envelope of a write: the inserted, changed or removed rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteResult<R> {
    pub data: Vec<R>,
    pub error: Option<ErrorSlot>,
}

impl<R> WriteResult<R> {
    fn ok(data: Vec<R>) -> Self {
        Self { data, error: None }
    }

    fn failed(error: ErrorSlot) -> Self {
        Self {
            data: Vec::new(),
            error: Some(error),
        }
    }

    /// The first affected row, for callers that wrote exactly one.
    pub fn single(self) -> SingleResult<R> {
        SingleResult {
            data: self.data.into_iter().next(),
            error: self.error,
        }
    }

    pub fn maybe_single(self) -> SingleResult<R> {
        self.single()
    }
}

pub(crate) fn insert<R: Record>(db: &LocalDb, rows: Vec<R>) -> WriteResult<R> {
    let values: Result<Vec<Value>, _> = rows.iter().map(serde_json::to_value).collect();
    match values {
        Ok(values) => insert_values(db, values),
        Err(e) => {
            warn!("Insert into {} failed: {e}", R::TABLE);
            WriteResult::failed(ErrorSlot::insert_failed())
        }
    }
}

pub(crate) fn insert_values<R: Record>(db: &LocalDb, rows: Vec<Value>) -> WriteResult<R> {
    match try_insert::<R>(db, rows) {
        Ok(inserted) => WriteResult::ok(inserted),
        Err(e) => {
            warn!("Insert into {} failed: {e}", R::TABLE);
            WriteResult::failed(ErrorSlot::insert_failed())
        }
    }
}

fn try_insert<R: Record>(db: &LocalDb, rows: Vec<Value>) -> Result<Vec<R>, StoreError> {
    let now = Utc::now();
    let mut table = db.read_table::<R>();

    let mut inserted: Vec<R> = Vec::with_capacity(rows.len());
    for row in rows {
        let id = fresh_id(|id| table.iter().chain(&inserted).any(|r| r.id() == id));
        inserted.push(stamp_new(row, id, now)?);
    }

    table.extend(inserted.iter().cloned());
    db.write_table(table);

    // A tour duplicating an existing one is collapsed on write.
    inserted.retain(|r| db.contains_id(R::TABLE, r.id()));
    debug!("Inserted {} rows into {}", inserted.len(), R::TABLE);
    Ok(inserted)
}

fn stamp_new<R: Record>(mut row: Value, id: String, now: DateTime<Utc>) -> Result<R, StoreError> {
    let fields = row
        .as_object_mut()
        .ok_or_else(|| StoreError::Validation(format!("{} row must be an object", R::TABLE)))?;

    let stamp = serde_json::to_value(now)?;
    fields.insert("id".into(), Value::String(id));
    fields.insert("created_at".into(), stamp.clone());
    if R::TRACKS_UPDATED_AT {
        fields.insert("updated_at".into(), stamp);
    } else {
        fields.remove("updated_at");
    }

    let record: R = serde_json::from_value(row)?;
    record.validate()?;
    Ok(record)
}

/// A later stamp than `previous`, even within the clock's resolution.
fn next_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(previous) if previous >= now => previous + Duration::microseconds(1),
        _ => now,
    }
}

#[derive(Debug, Clone)]
enum MutationKind {
    Update(Map<String, Value>),
    Delete,
}

/// A pending update or delete, narrowed by chained filters.
pub struct Mutation<'a, R: Record> {
    db: &'a LocalDb,
    kind: MutationKind,
    filters: Vec<Filter>,
    _record: PhantomData<R>,
}

impl<'a, R: Record> Mutation<'a, R> {
    pub(crate) fn update(db: &'a LocalDb, patch: Map<String, Value>, filters: Vec<Filter>) -> Self {
        Self {
            db,
            kind: MutationKind::Update(patch),
            filters,
            _record: PhantomData,
        }
    }

    pub(crate) fn delete(db: &'a LocalDb, filters: Vec<Filter>) -> Self {
        Self {
            db,
            kind: MutationKind::Delete,
            filters,
            _record: PhantomData,
        }
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

    pub fn any_of(self, clauses: Vec<OrClause>) -> Self {
        self.filter(Filter::Or(clauses))
    }

    pub fn execute(self) -> WriteResult<R> {
        let outcome = match &self.kind {
            MutationKind::Update(patch) => self.apply_update(patch),
            MutationKind::Delete => self.apply_delete(),
        };
        match outcome {
            Ok(rows) => WriteResult::ok(rows),
            Err(e) => {
                warn!("Write on {} failed: {e}", R::TABLE);
                WriteResult::failed(match self.kind {
                    MutationKind::Update(_) => ErrorSlot::update_failed(),
                    MutationKind::Delete => ErrorSlot::delete_failed(),
                })
            }
        }
    }

    pub fn single(self) -> SingleResult<R> {
        self.execute().single()
    }

    pub fn maybe_single(self) -> SingleResult<R> {
        self.execute().maybe_single()
    }

    fn matches(&self, row: &R) -> Result<bool, StoreError> {
        let doc = serde_json::to_value(row)?;
        Ok(self.filters.iter().all(|f| f.matches(&doc)))
    }

    fn apply_update(&self, patch: &Map<String, Value>) -> Result<Vec<R>, StoreError> {
        let now = Utc::now();
        let rows = self.db.read_table::<R>();

        let mut changed = Vec::new();
        let mut next = Vec::with_capacity(rows.len());
        for row in rows {
            if self.matches(&row)? {
                let updated = patch_row(&row, patch, now)?;
                changed.push(updated.clone());
                next.push(updated);
            } else {
                next.push(row);
            }
        }

        // Nothing is persisted unless every patched row validated.
        self.db.write_table(next);

        // A tour patched into a duplicate of another is collapsed on write.
        changed.retain(|r| self.db.contains_id(R::TABLE, r.id()));
        debug!("Updated {} rows in {}", changed.len(), R::TABLE);
        Ok(changed)
    }

    fn apply_delete(&self) -> Result<Vec<R>, StoreError> {
        let rows = self.db.read_table::<R>();

        let mut kept = Vec::with_capacity(rows.len());
        let mut removed = Vec::new();
        for row in rows {
            if self.matches(&row)? {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }

        self.db.write_table(kept);
        debug!("Deleted {} rows from {}", removed.len(), R::TABLE);
        Ok(removed)
    }
}

/// Merges `patch` over `row`. Identity fields cannot be patched.
fn patch_row<R: Record>(row: &R, patch: &Map<String, Value>, now: DateTime<Utc>) -> Result<R, StoreError> {
    let mut doc = serde_json::to_value(row)?;
    let fields = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::Validation(format!("{} row is not an object", R::TABLE)))?;

    for (key, value) in patch {
        if matches!(key.as_str(), "id" | "created_at" | "updated_at") {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    fields.insert(
        "updated_at".into(),
        serde_json::to_value(next_stamp(row.updated_at(), now))?,
    );

    let updated: R = serde_json::from_value(doc)?;
    updated.validate()?;
    Ok(updated)
}
