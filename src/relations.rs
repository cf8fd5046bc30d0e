//! Foreign-key join enrichment.
//!
//! A select whose column list mentions `tours` or `users` (for example
//! `"*, tours(*), users(*)"`) gets the referenced tour and user attached to
//! each booking, wishlist or review row. A key that no longer resolves yields
//! `null` for that side; it is never an error.

use serde::Serialize;

use crate::local_db_model::{Record, Table, Tour, User};
use crate::local_db_state::LocalDb;

/// Records attached to a row by foreign key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relations {
    pub tours: Option<Tour>,
    pub users: Option<User>,
}

/// A result row: the record's own fields, plus `tours` / `users` when joined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row<R> {
    #[serde(flatten)]
    pub record: R,
    #[serde(flatten)]
    pub relations: Option<Relations>,
}

impl<R> Row<R> {
    pub fn plain(record: R) -> Self {
        Self {
            record,
            relations: None,
        }
    }

    pub fn tour(&self) -> Option<&Tour> {
        self.relations.as_ref().and_then(|r| r.tours.as_ref())
    }

    pub fn user(&self) -> Option<&User> {
        self.relations.as_ref().and_then(|r| r.users.as_ref())
    }
}

/// Whether a select on `table` with `columns` asks for related records.
pub fn wants_join(table: Table, columns: Option<&str>) -> bool {
    matches!(table, Table::Bookings | Table::Wishlists | Table::Reviews)
        && columns.is_some_and(|list| list.contains("tours") || list.contains("users"))
}

/// Wraps `rows`, attaching relations when the column list requests them.
pub fn enrich<R: Record>(db: &LocalDb, rows: Vec<R>, columns: Option<&str>) -> Vec<Row<R>> {
    if rows.is_empty() || !wants_join(R::TABLE, columns) {
        return rows.into_iter().map(Row::plain).collect();
    }

    let tours = db.read_table::<Tour>();
    let users = db.read_table::<User>();

    rows.into_iter()
        .map(|record| {
            let relations = record.foreign_keys().map(|keys| Relations {
                tours: tours.iter().find(|t| t.id == keys.tour_id).cloned(),
                users: users.iter().find(|u| u.id == keys.user_id).cloned(),
            });
            Row { record, relations }
        })
        .collect()
}
