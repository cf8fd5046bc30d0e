//! Record definitions for the emulated backend.
//!
//! This module defines the five collections held by the store ([`Tour`],
//! [`User`], [`Booking`], [`Review`], [`Wishlist`]), the persisted
//! [`Database`] blob that groups them, and the [`Record`] trait through which
//! the query builder stays generic over a row type.
//!
//! Every record carries a store-assigned `id` and an immutable `created_at`.
//! Foreign keys (`user_id`, `tour_id`) are plain identifiers; nothing here
//! checks that they resolve.
//!
//! # Serialization
//!
//! Records serialize to the same JSON shape the storefront pages consume:
//!
//! ```rust
//! use wanderlust_store::local_db_model::{BookingStatus, Difficulty};
//!
//! assert_eq!(serde_json::to_string(&Difficulty::Challenging)?, "\"challenging\"");
//! assert_eq!(serde_json::to_string(&BookingStatus::Pending)?, "\"pending\"");
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// The five named collections of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Tours,
    Users,
    Bookings,
    Reviews,
    Wishlists,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Tours,
        Table::Users,
        Table::Bookings,
        Table::Reviews,
        Table::Wishlists,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Tours => "tours",
            Table::Users => "users",
            Table::Bookings => "bookings",
            Table::Reviews => "reviews",
            Table::Wishlists => "wishlists",
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| StoreError::UnknownTable(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Challenging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A bookable tour from the catalog.
///
/// `price` is in integer currency units; `duration` is in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    pub price: i64,
    pub duration: u32,
    pub location: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub available_dates: Vec<String>,
}

impl Tour {
    /// Content key two tours must never share.
    pub fn dedup_key(&self) -> (&str, &str, u32, i64) {
        (&self.title, &self.location, self.duration, self.price)
    }

    /// Key used to decide whether a catalog entry is already present.
    pub fn catalog_key(&self) -> (&str, &str) {
        (&self.title, &self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    // Older blobs predate these two fields, or hold them as null.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A reservation of `number_of_people` seats on a tour.
///
/// `total_amount` is computed by the caller (`price * number_of_people`);
/// the store records whatever it is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub tour_id: String,
    pub booking_date: String,
    pub number_of_people: u32,
    pub total_amount: i64,
    pub status: BookingStatus,
    #[serde(default)]
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub tour_id: String,
    pub rating: u8,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wishlist {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub tour_id: String,
}

/// The whole persisted blob.
///
/// A collection missing from an older blob decodes as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub tours: Vec<Tour>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub bookings: Vec<Booking>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub wishlists: Vec<Wishlist>,
}

impl Database {
    /// Decodes a persisted blob one record at a time.
    ///
    /// Only a blob that is not a JSON object fails. Inside it, a collection
    /// that is not a list starts empty and a record that does not decode is
    /// skipped with a warning, so one bad row never costs the others.
    pub fn decode(blob: &str) -> Result<Self, StoreError> {
        let Value::Object(mut root) = serde_json::from_str::<Value>(blob)? else {
            return Err(StoreError::Validation("persisted store is not a JSON object".into()));
        };
        Ok(Self {
            tours: decode_rows(root.remove("tours")),
            users: decode_rows(root.remove("users")),
            bookings: decode_rows(root.remove("bookings")),
            reviews: decode_rows(root.remove("reviews")),
            wishlists: decode_rows(root.remove("wishlists")),
        })
    }

    /// Backfills fields introduced after a blob was written.
    ///
    /// Returns `true` when any record changed.
    pub fn migrate(&mut self) -> bool {
        let mut changed = false;
        for user in &mut self.users {
            if user.updated_at.is_none() {
                user.updated_at = Some(user.created_at);
                changed = true;
            }
        }
        changed
    }

    pub fn contains_id(&self, table: Table, id: &str) -> bool {
        match table {
            Table::Tours => self.tours.iter().any(|r| r.id == id),
            Table::Users => self.users.iter().any(|r| r.id == id),
            Table::Bookings => self.bookings.iter().any(|r| r.id == id),
            Table::Reviews => self.reviews.iter().any(|r| r.id == id),
            Table::Wishlists => self.wishlists.iter().any(|r| r.id == id),
        }
    }

    pub fn len(&self, table: Table) -> usize {
        match table {
            Table::Tours => self.tours.len(),
            Table::Users => self.users.len(),
            Table::Bookings => self.bookings.len(),
            Table::Reviews => self.reviews.len(),
            Table::Wishlists => self.wishlists.len(),
        }
    }
}

/// The foreign keys a joinable record points through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeys<'a> {
    pub tour_id: &'a str,
    pub user_id: &'a str,
}

/// A row type stored in one of the collections.
///
/// The query builder is generic over this trait: it reaches the backing
/// vector through [`Record::rows`] / [`Record::rows_mut`] and evaluates
/// predicates against the row's serialized JSON form.
pub trait Record: Serialize + DeserializeOwned + Clone + Debug {
    const TABLE: Table;

    /// Whether inserts stamp `updated_at` alongside `created_at`.
    const TRACKS_UPDATED_AT: bool;

    fn id(&self) -> &str;

    fn updated_at(&self) -> Option<DateTime<Utc>>;

    fn rows(db: &Database) -> &Vec<Self>;

    fn rows_mut(db: &mut Database) -> &mut Vec<Self>;

    /// Foreign keys used by join enrichment; `None` for non-joinable tables.
    fn foreign_keys(&self) -> Option<ForeignKeys<'_>> {
        None
    }

    /// Fills fields an older blob may lack, before the row is decoded.
    fn backfill(_fields: &mut Map<String, Value>) {}

    /// Domain checks the type system cannot express.
    fn validate(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Record for Tour {
    const TABLE: Table = Table::Tours;
    const TRACKS_UPDATED_AT: bool = true;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn rows(db: &Database) -> &Vec<Self> {
        &db.tours
    }

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.tours
    }

    fn backfill(fields: &mut Map<String, Value>) {
        let missing = fields.get("updated_at").map_or(true, Value::is_null);
        if missing {
            if let Some(created_at) = fields.get("created_at").cloned() {
                fields.insert("updated_at".into(), created_at);
            }
        }
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation("tour title must not be empty".into()));
        }
        if self.price < 0 {
            return Err(StoreError::Validation(format!(
                "tour price must not be negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

impl Record for User {
    const TABLE: Table = Table::Users;
    const TRACKS_UPDATED_AT: bool = true;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn rows(db: &Database) -> &Vec<Self> {
        &db.users
    }

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.users
    }
}

impl Record for Booking {
    const TABLE: Table = Table::Bookings;
    const TRACKS_UPDATED_AT: bool = false;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn rows(db: &Database) -> &Vec<Self> {
        &db.bookings
    }

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.bookings
    }

    fn foreign_keys(&self) -> Option<ForeignKeys<'_>> {
        Some(ForeignKeys {
            tour_id: &self.tour_id,
            user_id: &self.user_id,
        })
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.number_of_people == 0 {
            return Err(StoreError::Validation(
                "booking must be for at least one person".into(),
            ));
        }
        Ok(())
    }
}

impl Record for Review {
    const TABLE: Table = Table::Reviews;
    const TRACKS_UPDATED_AT: bool = false;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn rows(db: &Database) -> &Vec<Self> {
        &db.reviews
    }

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.reviews
    }

    fn foreign_keys(&self) -> Option<ForeignKeys<'_>> {
        Some(ForeignKeys {
            tour_id: &self.tour_id,
            user_id: &self.user_id,
        })
    }

    fn validate(&self) -> Result<(), StoreError> {
        if !(1..=5).contains(&self.rating) {
            return Err(StoreError::Validation(format!(
                "review rating must be between 1 and 5, got {}",
                self.rating
            )));
        }
        Ok(())
    }
}

impl Record for Wishlist {
    const TABLE: Table = Table::Wishlists;
    const TRACKS_UPDATED_AT: bool = false;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn rows(db: &Database) -> &Vec<Self> {
        &db.wishlists
    }

    fn rows_mut(db: &mut Database) -> &mut Vec<Self> {
        &mut db.wishlists
    }

    fn foreign_keys(&self) -> Option<ForeignKeys<'_>> {
        Some(ForeignKeys {
            tour_id: &self.tour_id,
            user_id: &self.user_id,
        })
    }
}

fn decode_rows<R: Record>(collection: Option<Value>) -> Vec<R> {
    let items = match collection {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warn!("Persisted {} is not a list, starting it empty", R::TABLE);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, mut item)| {
            if let Some(fields) = item.as_object_mut() {
                R::backfill(fields);
            }
            match serde_json::from_value::<R>(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping persisted {} record #{index}: {e}", R::TABLE);
                    None
                }
            }
        })
        .collect()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
