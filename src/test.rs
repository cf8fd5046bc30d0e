//! # Test Suite for Wanderlust Store
//!
//! Covers the emulated backend end to end: seeding and migration, the query
//! builder's evaluation order, write scoping, join enrichment, persistence
//! through LMDB, and the C ABI.
//!
//! ## Test Categories
//!
//! ### 1. Seed & Migration
//! - Fresh stores, idempotent re-reads, catalog backfill, tour deduplication,
//!   user field migration, corrupt blobs
//!
//! ### 2. Query Builder
//! - AND / OR semantics, count vs. pagination, ordering, head selects,
//!   single-row accessors
//!
//! ### 3. Writes & Joins
//! - Insert identity, update scoping and stamping, delete partitioning,
//!   relation enrichment with dangling keys
//!
//! ### 4. Persistence, FFI, Config, Auth
//! - LMDB round trips, swallowed write failures, JSON requests over the C ABI,
//!   backend mode selection, demo sign-in
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test
//! cargo test test_query_   # query builder only
//! cargo test test_ffi_     # C ABI only
//! ```

#[cfg(test)]
pub mod tests {
    use std::ffi::{CStr, CString};

    use log::info;
    use serde_json::{json, Map, Value};

    use crate::app_response::AppResponse;
    use crate::auth::{demo_sign_in, is_demo_user, AuthError, DEMO_ADMIN, DEMO_USER};
    use crate::blob_store::{BlobStore, MemoryBlobStore};
    use crate::config::{BackendConfig, BackendMode, ENV_ANON_KEY, ENV_STORAGE_KEY, ENV_URL};
    use crate::error::{ErrorSlot, StoreError};
    use crate::filter::{compare_values, parse_or_expression, sort_cmp, stringify, ClauseOp, OrClause};
    use crate::local_db_model::{
        Booking, BookingStatus, Database, Difficulty, Review, Role, Table, Tour, User, Wishlist,
    };
    use crate::local_db_state::LocalDb;
    use crate::query::{Direction, SelectOptions};
    use crate::request::QueryRequest;
    use crate::seed::{self, SAMPLE_TOURS};
    use crate::{close_client, create_client, execute_request, free_c_string, reset_store};

    // Helper: an in-memory store plus a handle on its persisted blob
    fn memory_db() -> (LocalDb, MemoryBlobStore) {
        let store = MemoryBlobStore::new();
        let db = LocalDb::open(store.clone());
        (db, store)
    }

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("patch must be an object, got {other}"),
        }
    }

    fn tour_by_title(db: &LocalDb, title: &str) -> Tour {
        db.from::<Tour>()
            .eq("title", title)
            .single()
            .data
            .expect("catalog tour should exist")
            .record
    }

    fn booking_row(user_id: &str, tour: &Tour, people: u32) -> Value {
        json!({
            "user_id": user_id,
            "tour_id": tour.id,
            "booking_date": "2025-04-20",
            "number_of_people": people,
            "total_amount": tour.price * i64::from(people),
            "status": "pending",
            "special_requests": null,
        })
    }

    fn insert_booking(db: &LocalDb, user_id: &str, tour: &Tour, people: u32) -> Booking {
        db.from::<Booking>()
            .insert_json(vec![booking_row(user_id, tour, people)])
            .single()
            .data
            .expect("booking insert should succeed")
    }

    /// A backend whose writes always fail, for best-effort persistence.
    struct FailingBlobStore;

    impl BlobStore for FailingBlobStore {
        fn read(&self) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn write(&self, _blob: &str) -> Result<(), StoreError> {
            Err(StoreError::Validation("disk full".into()))
        }

        fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Validation("disk full".into()))
        }
    }

    fn ffi_call(ptr: *const std::os::raw::c_char) -> AppResponse {
        assert!(!ptr.is_null(), "FFI call returned null");
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        free_c_string(ptr);
        serde_json::from_str(&text).unwrap()
    }

    // ===============================
    // 1. SEED & MIGRATION
    // ===============================

    #[test]
    fn test_seed_fresh_store_has_catalog_and_demo_accounts() {
        let (db, store) = memory_db();

        let tours = db.from::<Tour>().select("*").execute();
        let users = db.from::<User>().select("*").execute();

        assert_eq!(tours.count, SAMPLE_TOURS.len());
        assert_eq!(users.count, 2);
        assert!(users.records().any(|u| u.id == "demo-admin" && u.role == Role::Admin));
        assert!(users.records().any(|u| u.id == "demo-user" && u.role == Role::User));
        assert!(store.snapshot().is_some(), "fresh store should be persisted");
    }

    #[test]
    fn test_seed_is_idempotent_across_reads_and_reopens() {
        let (db, store) = memory_db();
        db.from::<Tour>().execute();
        let first = store.snapshot();

        for _ in 0..3 {
            db.from::<Tour>().execute();
            db.from::<User>().execute();
            db.from::<Booking>().execute();
        }
        assert_eq!(store.snapshot(), first);

        let reopened = LocalDb::open(store.clone());
        reopened.from::<Tour>().execute();
        assert_eq!(store.snapshot(), first);
        assert_eq!(reopened.snapshot(), db.snapshot());
    }

    #[test]
    fn test_seed_backfills_catalog_from_older_store() {
        let now = chrono::Utc::now();
        let old = Database {
            tours: seed::catalog_tours(now).into_iter().take(2).collect(),
            users: seed::demo_users(now),
            ..Database::default()
        };
        let kept_ids: Vec<String> = old.tours.iter().map(|t| t.id.clone()).collect();
        let store = MemoryBlobStore::with_blob(serde_json::to_string(&old).unwrap());
        let db = LocalDb::open(store);

        let tours = db.from::<Tour>().execute().into_records();

        assert_eq!(tours.len(), SAMPLE_TOURS.len());
        assert_eq!(tours[0].id, kept_ids[0]);
        assert_eq!(tours[1].id, kept_ids[1]);
    }

    #[test]
    fn test_seed_collapses_duplicate_tours_keeping_first() {
        let now = chrono::Utc::now();
        let mut tours = seed::catalog_tours(now);
        let mut copy = tours[3].clone();
        copy.id = "duplicate".to_string();
        copy.description = "different text, same key".to_string();
        tours.push(copy);
        let old = Database {
            tours,
            users: seed::demo_users(now),
            ..Database::default()
        };
        let store = MemoryBlobStore::with_blob(serde_json::to_string(&old).unwrap());
        let db = LocalDb::open(store.clone());

        let result = db.from::<Tour>().execute();

        assert_eq!(result.count, SAMPLE_TOURS.len());
        assert!(result.records().all(|t| t.id != "duplicate"));
        let persisted: Database = serde_json::from_str(&store.snapshot().unwrap()).unwrap();
        assert_eq!(persisted.tours.len(), SAMPLE_TOURS.len());
    }

    #[test]
    fn test_seed_migrates_users_missing_new_fields() {
        let blob = json!({
            "users": [{
                "id": "legacy",
                "created_at": "2024-01-15T10:30:00Z",
                "email": "legacy@example.com",
                "full_name": "Legacy User",
                "role": "user",
                "phone": null
            }]
        });
        let db = LocalDb::open(MemoryBlobStore::with_blob(blob.to_string()));

        let user = db.from::<User>().eq("id", "legacy").single().data.unwrap().record;

        assert_eq!(user.phone, "");
        assert_eq!(user.address, "");
        assert_eq!(user.updated_at, Some(user.created_at));
        // Missing collections decode empty; tours are seeded on first read.
        assert_eq!(db.from::<Tour>().execute().count, SAMPLE_TOURS.len());
    }

    #[test]
    fn test_seed_undecodable_record_does_not_cost_the_rest() {
        let blob = json!({
            "tours": [{
                "id": "t-legacy",
                "created_at": "2024-01-15T10:30:00Z",
                "title": "Himalayan Adventure Trek",
                "description": null,
                "category": null,
                "price": 108500,
                "duration": 10,
                "location": "Nepal Himalayas",
                "max_group_size": 12,
                "difficulty": "challenging"
            }],
            "bookings": [{
                "id": "b1",
                "created_at": "2024-02-01T09:00:00Z",
                "user_id": "demo-user",
                "tour_id": "t-legacy",
                "booking_date": "2025-03-15",
                "number_of_people": 2,
                "total_amount": 217000,
                "status": "confirmed"
            }],
            "reviews": [
                {
                    "id": "r1",
                    "created_at": "2024-03-01T12:00:00Z",
                    "user_id": "demo-user",
                    "tour_id": "t-legacy",
                    "rating": 5,
                    "comment": null
                },
                {
                    "id": "r2",
                    "created_at": "2024-03-02T12:00:00Z",
                    "user_id": "demo-user",
                    "tour_id": "t-legacy",
                    "rating": 4.5,
                    "comment": "half stars are not a thing"
                }
            ],
            "wishlists": "not a list"
        });
        let store = MemoryBlobStore::with_blob(blob.to_string());
        let db = LocalDb::open(store.clone());

        assert!(
            store.snapshot().unwrap().contains("\"b1\""),
            "a readable blob must not be overwritten on open"
        );

        let bookings = db.from::<Booking>().execute().into_records();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].id, "b1");

        let reviews = db.from::<Review>().execute().into_records();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].id, "r1");
        assert_eq!(reviews[0].comment, "");
        assert_eq!(db.from::<Wishlist>().execute().count, 0);

        let legacy = db.from::<Tour>().eq("id", "t-legacy").single().data.unwrap().record;
        assert_eq!(legacy.description, "");
        assert_eq!(legacy.category, "");
        assert_eq!(legacy.updated_at, legacy.created_at);
        assert_eq!(db.from::<Tour>().execute().count, SAMPLE_TOURS.len());

        let persisted: Database = serde_json::from_str(&store.snapshot().unwrap()).unwrap();
        assert_eq!(persisted.bookings, bookings);
    }

    #[test]
    fn test_seed_unreadable_blob_is_reseeded() {
        let db = LocalDb::open(MemoryBlobStore::with_blob("{ not json"));
        assert_eq!(db.from::<Tour>().execute().count, SAMPLE_TOURS.len());
        assert_eq!(db.from::<User>().execute().count, 2);
    }

    #[test]
    fn test_seed_users_reseeded_when_emptied() {
        let (db, _) = memory_db();
        let removed = db.from::<User>().delete().execute();
        assert_eq!(removed.data.len(), 2);

        assert_eq!(db.from::<User>().execute().count, 2);
    }

    // ===============================
    // 2. QUERY BUILDER
    // ===============================

    #[test]
    fn test_query_ordered_page_of_nine_reports_full_count() {
        let (db, _) = memory_db();

        let result = db
            .from::<Tour>()
            .select_with("*", SelectOptions::exact())
            .range(0, 8)
            .order("price", Direction::Ascending)
            .execute();

        assert!(result.error.is_none());
        assert_eq!(result.count, 12);
        assert_eq!(result.data.len(), 9);
        let prices: Vec<i64> = result.records().map(|t| t.price).collect();
        assert!(prices.windows(2).all(|w| w[0] <= w[1]), "not ascending: {prices:?}");

        let cheapest = SAMPLE_TOURS.iter().map(|t| t.price).min().unwrap();
        assert_eq!(prices[0], cheapest);
    }

    #[test]
    fn test_query_count_and_window_are_consistent() {
        let (db, _) = memory_db();
        let total = db.from::<Tour>().gte("price", 80000).execute().count;
        assert!(total > 0);

        for from in 0..14usize {
            for to in from..16usize {
                let result = db
                    .from::<Tour>()
                    .gte("price", 80000)
                    .range(from, to)
                    .execute();
                let expected = if from >= total {
                    0
                } else {
                    (to - from + 1).min(total - from)
                };
                assert_eq!(result.count, total);
                assert_eq!(result.data.len(), expected, "window {from}..={to}");
            }
        }
    }

    #[test]
    fn test_query_filters_are_a_conjunction_in_any_order() {
        let (db, _) = memory_db();

        let forward: Vec<String> = db
            .from::<Tour>()
            .eq("difficulty", "easy")
            .gte("price", 80000)
            .execute()
            .into_records()
            .into_iter()
            .map(|t| t.id)
            .collect();
        let reversed: Vec<String> = db
            .from::<Tour>()
            .gte("price", 80000)
            .eq("difficulty", "easy")
            .execute()
            .into_records()
            .into_iter()
            .map(|t| t.id)
            .collect();

        assert_eq!(forward, reversed);
        let expected = SAMPLE_TOURS
            .iter()
            .filter(|t| t.price >= 80000 && t.difficulty == Difficulty::Easy)
            .count();
        assert_eq!(forward.len(), expected);
    }

    #[test]
    fn test_query_or_group_matches_either_field() {
        let (db, _) = memory_db();

        let safari = db
            .from::<Tour>()
            .or("title.ilike.%SAFARI%,location.ilike.%safari%")
            .execute();
        assert_eq!(safari.count, 1);
        assert_eq!(safari.data[0].record.title, "African Safari Adventure");

        let by_location = db
            .from::<Tour>()
            .or("title.ilike.%kenya%,location.ilike.%kenya%")
            .execute();
        assert_eq!(by_location.count, 1);

        let none = db
            .from::<Tour>()
            .or("title.ilike.%zzz%,location.ilike.%zzz%")
            .execute();
        assert_eq!(none.count, 0);
        assert!(none.error.is_none());
    }

    #[test]
    fn test_query_or_with_unknown_operator_matches_nothing() {
        let (db, _) = memory_db();

        assert_eq!(db.from::<Tour>().or("title.like.%a%").execute().count, 0);
        assert_eq!(db.from::<Tour>().or("garbage").execute().count, 0);
        assert_eq!(db.from::<Tour>().or("").execute().count, 0);

        // One bad clause does not poison the others.
        let mixed = db.from::<Tour>().or("title.like.%a%,location.ilike.%bali%").execute();
        assert_eq!(mixed.count, 1);
    }

    #[test]
    fn test_query_or_eq_clause_is_case_insensitive() {
        let (db, _) = memory_db();
        let cultural = db.from::<Tour>().or("category.eq.CULTURAL").execute();
        let expected = SAMPLE_TOURS.iter().filter(|t| t.category == "Cultural").count();
        assert_eq!(cultural.count, expected);
    }

    #[test]
    fn test_query_ilike_is_substring_match() {
        let (db, _) = memory_db();
        let japan = db.from::<Tour>().ilike("location", "%JAPAN%").execute();
        assert_eq!(japan.count, 1);
        assert_eq!(japan.data[0].record.location, "Tokyo, Japan");
    }

    #[test]
    fn test_query_head_returns_count_only() {
        let (db, _) = memory_db();
        let result = db
            .from::<Tour>()
            .select_with("*", SelectOptions::head())
            .eq("featured", true)
            .execute();

        assert!(result.data.is_empty());
        assert_eq!(result.count, SAMPLE_TOURS.iter().filter(|t| t.featured).count());
    }

    #[test]
    fn test_query_last_window_wins() {
        let (db, _) = memory_db();

        assert_eq!(db.from::<Tour>().range(0, 1).limit(5).execute().data.len(), 5);
        assert_eq!(db.from::<Tour>().limit(5).range(2, 3).execute().data.len(), 2);
        assert_eq!(db.from::<Tour>().limit(0).execute().data.len(), 0);
        assert_eq!(db.from::<Tour>().range_from(10).execute().data.len(), 2);
    }

    #[test]
    fn test_query_order_registration_order_does_not_matter() {
        let (db, _) = memory_db();

        let a: Vec<String> = db
            .from::<Tour>()
            .order("duration", Direction::Descending)
            .range(0, 3)
            .execute()
            .into_records()
            .into_iter()
            .map(|t| t.title)
            .collect();
        let b: Vec<String> = db
            .from::<Tour>()
            .range(0, 3)
            .order("duration", Direction::Descending)
            .execute()
            .into_records()
            .into_iter()
            .map(|t| t.title)
            .collect();

        assert_eq!(a, b);
        assert_eq!(a[0], "Patagonia Glacier Expedition");
    }

    #[test]
    fn test_query_later_order_replaces_earlier() {
        let (db, _) = memory_db();
        let result = db
            .from::<Tour>()
            .order("title", Direction::Ascending)
            .order("price", Direction::Descending)
            .limit(1)
            .execute();
        assert_eq!(result.data[0].record.title, "Swiss Alps Luxury Retreat");
    }

    #[test]
    fn test_query_order_groups_mixed_text_column() {
        let (db, _) = memory_db();
        let values = [
            "2024-01-01T00:00:00Z",
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T00:00:00X",
        ];
        let ids: Vec<String> = db
            .from::<Tour>()
            .execute()
            .into_records()
            .into_iter()
            .map(|t| t.id)
            .collect();
        for (i, id) in ids.iter().enumerate() {
            let result = db
                .from::<Tour>()
                .eq("id", id.as_str())
                .update(patch(json!({ "category": values[i % 3] })))
                .execute();
            assert_eq!(result.data.len(), 1);
        }

        let categories = |direction| -> Vec<String> {
            db.from::<Tour>()
                .order("category", direction)
                .execute()
                .into_records()
                .into_iter()
                .map(|t| t.category)
                .collect()
        };
        let ascending = categories(Direction::Ascending);
        let descending = categories(Direction::Descending);

        assert_eq!(ascending.len(), SAMPLE_TOURS.len());
        assert!(ascending[..8].iter().all(|c| c != values[2]), "{ascending:?}");
        assert!(ascending[8..].iter().all(|c| c == values[2]), "{ascending:?}");
        assert!(descending[..4].iter().all(|c| c == values[2]), "{descending:?}");
        assert!(ascending.windows(2).all(|w| {
            sort_cmp(Some(&json!(w[0])), Some(&json!(w[1]))) != std::cmp::Ordering::Greater
        }));
    }

    #[test]
    fn test_query_single_not_found_is_not_an_error() {
        let (db, _) = memory_db();
        let result = db.from::<Tour>().eq("id", "does-not-exist").single();
        assert!(result.data.is_none());
        assert!(result.error.is_none());
    }

    // ===============================
    // 3. WRITES & JOINS
    // ===============================

    #[test]
    fn test_write_booking_join_returns_nested_tour_and_user() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "Santorini Sunset Experience");
        insert_booking(&db, "demo-user", &tour, 3);

        let result = db
            .from::<Booking>()
            .select("*, tours(*), users(*)")
            .eq("user_id", "demo-user")
            .execute();

        assert_eq!(result.count, 1);
        let row = &result.data[0];
        assert_eq!(row.tour(), Some(&tour));
        assert_eq!(row.user().map(|u| u.email.as_str()), Some("user@example.com"));
        assert_eq!(row.record.total_amount, tour.price * 3);

        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["tours"]["title"], "Santorini Sunset Experience");
        assert_eq!(json["total_amount"], tour.price * 3);
    }

    #[test]
    fn test_write_dangling_foreign_keys_join_as_null() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "Bali Spiritual Journey");
        let wish = db
            .from::<Wishlist>()
            .insert_json(vec![json!({ "user_id": "ghost", "tour_id": tour.id })])
            .single()
            .data
            .unwrap();
        db.from::<Tour>().delete().eq("id", tour.id.as_str()).execute();

        let result = db.from::<Wishlist>().select("*, tours(*)").eq("id", wish.id.as_str()).execute();

        let row = &result.data[0];
        assert!(row.relations.is_some());
        assert!(row.tour().is_none());
        assert!(row.user().is_none());
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["tours"], Value::Null);
        assert_eq!(json["users"], Value::Null);
    }

    #[test]
    fn test_write_no_join_without_relation_in_columns() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "African Safari Adventure");
        insert_booking(&db, "demo-user", &tour, 1);

        let result = db.from::<Booking>().select("*").execute();

        assert!(result.data[0].relations.is_none());
        let json = serde_json::to_value(&result.data[0]).unwrap();
        assert!(json.get("tours").is_none());
    }

    #[test]
    fn test_write_insert_assigns_store_identity() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "Tokyo Cultural Immersion");
        let mut row = booking_row("demo-user", &tour, 2);
        row["id"] = json!("caller-chosen");
        row["updated_at"] = json!("2020-01-01T00:00:00Z");

        let booking = db.from::<Booking>().insert_json(vec![row]).single().data.unwrap();

        assert_ne!(booking.id, "caller-chosen");
        assert!(booking.updated_at.is_none());
        assert!(!db.contains_id(Table::Tours, &booking.id));

        let inserted_tour = db
            .from::<Tour>()
            .insert_json(vec![json!({
                "title": "Lofoten Islands Kayak",
                "description": "Paddling between fishing villages under the midnight sun.",
                "price": 120000,
                "duration": 6,
                "location": "Lofoten, Norway",
                "category": "Adventure",
                "max_group_size": 8,
                "difficulty": "moderate",
                "featured": false,
                "images": [],
                "available_dates": ["2025-06-21"]
            })])
            .single()
            .data
            .unwrap();
        assert_eq!(inserted_tour.updated_at, inserted_tour.created_at);
        assert_eq!(db.from::<Tour>().execute().count, SAMPLE_TOURS.len() + 1);
    }

    #[test]
    fn test_write_typed_insert_never_reuses_ids() {
        let (db, _) = memory_db();
        let existing = tour_by_title(&db, "Ha Long Bay Cruise");
        let review = Review {
            id: existing.id.clone(),
            created_at: existing.created_at,
            updated_at: None,
            user_id: "demo-user".into(),
            tour_id: existing.id.clone(),
            rating: 5,
            comment: "Unforgettable".into(),
        };

        let result = db.from::<Review>().insert(vec![review.clone(), review]);

        assert!(result.error.is_none());
        assert_eq!(result.data.len(), 2);
        assert_ne!(result.data[0].id, existing.id);
        assert_ne!(result.data[0].id, result.data[1].id);
    }

    #[test]
    fn test_write_insert_duplicate_tour_is_collapsed() {
        let (db, _) = memory_db();
        let existing = tour_by_title(&db, "African Safari Adventure");
        let duplicate = serde_json::to_value(&existing).unwrap();

        let result = db.from::<Tour>().insert_json(vec![duplicate]);

        assert!(result.error.is_none());
        assert!(result.data.is_empty());
        assert_eq!(db.snapshot().tours.len(), SAMPLE_TOURS.len());
    }

    #[test]
    fn test_write_insert_invalid_row_reports_error() {
        let (db, store) = memory_db();
        let before = store.snapshot();

        let result = db.from::<Review>().insert_json(vec![json!({
            "user_id": "demo-user",
            "tour_id": "anything",
            "rating": 9,
            "comment": "too enthusiastic"
        })]);

        assert_eq!(result.error, Some(ErrorSlot::insert_failed()));
        assert!(result.data.is_empty());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_write_update_changes_only_matching_row() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "Machu Picchu Inca Trail");
        let target = insert_booking(&db, "demo-user", &tour, 2);
        let other = insert_booking(&db, "demo-admin", &tour, 4);
        let other_before = serde_json::to_string(&other).unwrap();

        let first = db
            .from::<Booking>()
            .update(patch(json!({ "status": "confirmed" })))
            .eq("id", target.id.as_str())
            .execute();

        assert!(first.error.is_none());
        assert_eq!(first.data.len(), 1);
        assert_eq!(first.data[0].status, BookingStatus::Confirmed);
        let first_stamp = first.data[0].updated_at.expect("update stamps updated_at");

        let second = db
            .from::<Booking>()
            .update(patch(json!({ "status": "cancelled" })))
            .eq("id", target.id.as_str())
            .single();
        assert!(second.data.unwrap().updated_at.unwrap() > first_stamp);

        let other_after = db.from::<Booking>().eq("id", other.id.as_str()).single().data.unwrap();
        assert_eq!(serde_json::to_string(&other_after.record).unwrap(), other_before);
    }

    #[test]
    fn test_write_update_cannot_rewrite_identity() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "Sahara Desert Caravan");

        let updated = db
            .from::<Tour>()
            .eq("id", tour.id.as_str())
            .update(patch(json!({
                "id": "hijacked",
                "created_at": "1999-01-01T00:00:00Z",
                "featured": true
            })))
            .single()
            .data
            .unwrap();

        assert_eq!(updated.id, tour.id);
        assert_eq!(updated.created_at, tour.created_at);
        assert!(updated.featured);
        assert!(updated.updated_at > tour.updated_at);
    }

    #[test]
    fn test_write_update_into_duplicate_tour_is_not_returned() {
        let (db, _) = memory_db();
        let first = tour_by_title(&db, "Himalayan Adventure Trek");
        let later = tour_by_title(&db, "Santorini Sunset Experience");

        let result = db
            .from::<Tour>()
            .eq("id", later.id.as_str())
            .update(patch(json!({
                "title": first.title,
                "location": first.location,
                "duration": first.duration,
                "price": first.price
            })))
            .execute();

        assert!(result.error.is_none());
        assert!(result.data.is_empty());
        let tours = db.snapshot().tours;
        assert!(tours.iter().any(|t| t.id == first.id));
        assert!(tours.iter().all(|t| t.id != later.id));
    }

    #[test]
    fn test_write_invalid_update_persists_nothing() {
        let (db, store) = memory_db();
        let tour = tour_by_title(&db, "Iceland Northern Lights Chase");
        let booking = insert_booking(&db, "demo-user", &tour, 2);
        let before = store.snapshot();

        let zero = db
            .from::<Booking>()
            .update(patch(json!({ "number_of_people": 0 })))
            .eq("id", booking.id.as_str())
            .execute();
        let bogus = db
            .from::<Booking>()
            .update(patch(json!({ "status": "teleported" })))
            .execute();

        assert_eq!(zero.error, Some(ErrorSlot::update_failed()));
        assert_eq!(bogus.error, Some(ErrorSlot::update_failed()));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_write_delete_returns_removed_rows_verbatim() {
        let (db, _) = memory_db();
        let bali = tour_by_title(&db, "Bali Spiritual Journey");
        let kenya = tour_by_title(&db, "African Safari Adventure");
        let wishes = db
            .from::<Wishlist>()
            .insert_json(vec![
                json!({ "user_id": "demo-user", "tour_id": bali.id }),
                json!({ "user_id": "demo-user", "tour_id": kenya.id }),
                // Not deduplicated: uniqueness is the caller's concern.
                json!({ "user_id": "demo-user", "tour_id": kenya.id }),
            ])
            .data;
        assert_eq!(wishes.len(), 3);

        let removed = db
            .from::<Wishlist>()
            .delete()
            .eq("user_id", "demo-user")
            .eq("tour_id", kenya.id.as_str())
            .execute();

        assert_eq!(removed.data, wishes[1..].to_vec());
        let remaining = db.from::<Wishlist>().execute().into_records();
        assert_eq!(remaining, vec![wishes[0].clone()]);
    }

    #[test]
    fn test_write_delete_by_range_predicate() {
        let (db, _) = memory_db();
        let removed = db.from::<Tour>().delete().lte("price", 70000).execute();
        let expected = SAMPLE_TOURS.iter().filter(|t| t.price <= 70000).count();
        assert_eq!(removed.data.len(), expected);
        assert!(removed.data.iter().all(|t| t.price <= 70000));
    }

    // ===============================
    // 4. PERSISTENCE, FFI, CONFIG, AUTH
    // ===============================

    #[test]
    fn test_persistence_failure_is_swallowed() {
        let db = LocalDb::open(FailingBlobStore);
        let tour = tour_by_title(&db, "Swiss Alps Luxury Retreat");

        let booking = insert_booking(&db, "demo-admin", &tour, 1);

        let found = db.from::<Booking>().eq("id", booking.id.as_str()).single();
        assert!(found.error.is_none());
        assert_eq!(found.data.map(|r| r.record), Some(booking));
        db.reset();
        assert_eq!(db.from::<Booking>().execute().count, 0);
    }

    #[test]
    fn test_persistence_reset_reseeds() {
        let (db, store) = memory_db();
        let tour = tour_by_title(&db, "Tokyo Cultural Immersion");
        insert_booking(&db, "demo-user", &tour, 2);
        db.from::<Tour>().delete().eq("category", "Cultural").execute();

        db.reset();

        assert_eq!(db.from::<Booking>().execute().count, 0);
        assert_eq!(db.from::<Tour>().execute().count, SAMPLE_TOURS.len());
        let persisted: Database = serde_json::from_str(&store.snapshot().unwrap()).unwrap();
        assert!(persisted.bookings.is_empty());
        assert!(db.is_mock());
    }

    #[test]
    fn test_persistence_lmdb_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round_trip");

        let booking = {
            let db = LocalDb::init_at(&path, "test_key").unwrap();
            let tour = tour_by_title(&db, "Patagonia Glacier Expedition");
            insert_booking(&db, "demo-user", &tour, 2)
        };
        info!("Reopening LMDB store at {}", path.display());

        let db = LocalDb::init_at(&path, "test_key").unwrap();
        let found = db.from::<Booking>().eq("id", booking.id.as_str()).single();
        assert_eq!(found.data.map(|r| r.record), Some(booking));

        db.reset();
        drop(db);
        let db = LocalDb::init_at(&path, "test_key").unwrap();
        assert_eq!(db.from::<Booking>().execute().count, 0);
    }

    #[test]
    fn test_persistence_lmdb_keys_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("isolated");

        {
            let db = LocalDb::init_at(&path, "first").unwrap();
            db.from::<Tour>().delete().eq("difficulty", "easy").execute();
        }
        let db = LocalDb::init_at(&path, "second").unwrap();
        assert_eq!(db.from::<Tour>().execute().count, SAMPLE_TOURS.len());
    }

    #[test]
    fn test_request_select_replays_chain() {
        let (db, _) = memory_db();
        let request: QueryRequest = serde_json::from_value(json!({
            "table": "tours",
            "columns": "*",
            "filters": [{ "op": "gte", "field": "price", "value": 80000 }],
            "order": { "field": "price", "ascending": false },
            "range": { "from": 0, "to": 2 }
        }))
        .unwrap();

        let envelope = request.execute(&db).unwrap();

        let total = SAMPLE_TOURS.iter().filter(|t| t.price >= 80000).count();
        assert_eq!(envelope["count"], total);
        assert_eq!(envelope["data"].as_array().unwrap().len(), 3);
        assert_eq!(envelope["data"][0]["title"], "Swiss Alps Luxury Retreat");
        assert_eq!(envelope["error"], Value::Null);
    }

    #[test]
    fn test_request_write_actions() {
        let (db, _) = memory_db();
        let tour = tour_by_title(&db, "Ha Long Bay Cruise");

        let inserted: QueryRequest = serde_json::from_value(json!({
            "table": "bookings",
            "action": "insert",
            "rows": [booking_row("demo-user", &tour, 2)],
            "single": true
        }))
        .unwrap();
        let inserted = inserted.execute(&db).unwrap();
        let id = inserted["data"]["id"].as_str().unwrap().to_string();

        let update: QueryRequest = serde_json::from_value(json!({
            "table": "bookings",
            "action": "update",
            "filters": [{ "op": "eq", "field": "id", "value": id.clone() }],
            "patch": { "status": "confirmed" }
        }))
        .unwrap();
        let updated = update.execute(&db).unwrap();
        assert_eq!(updated["data"][0]["status"], "confirmed");

        let missing_patch: QueryRequest =
            serde_json::from_value(json!({ "table": "bookings", "action": "update" })).unwrap();
        assert!(matches!(missing_patch.execute(&db), Err(StoreError::Validation(_))));

        let delete: QueryRequest = serde_json::from_value(json!({
            "table": "bookings",
            "action": "delete",
            "filters": [{ "op": "eq", "field": "id", "value": id }]
        }))
        .unwrap();
        assert_eq!(delete.execute(&db).unwrap()["data"].as_array().unwrap().len(), 1);
        assert_eq!(db.from::<Booking>().execute().count, 0);
    }

    #[test]
    fn test_request_unknown_table_is_rejected() {
        let (db, _) = memory_db();
        let request: QueryRequest = serde_json::from_value(json!({ "table": "payments" })).unwrap();
        assert!(matches!(request.execute(&db), Err(StoreError::UnknownTable(t)) if t == "payments"));
    }

    #[test]
    fn test_app_response_display() {
        let response = AppResponse::from(StoreError::UnknownTable("payments".into()));
        assert_eq!(response.to_string(), "Not found: Table 'payments' not found");

        let response = AppResponse::from(StoreError::Validation("update request needs a patch".into()));
        assert_eq!(response.to_string(), "Validation error: update request needs a patch");
    }

    #[test]
    fn test_ffi_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("ffi_store").to_str().unwrap()).unwrap();
        let client = create_client(path.as_ptr());
        assert!(!client.is_null());

        let request = CString::new(
            r#"{"table":"tours","or":"title.ilike.%trek%,location.ilike.%trek%","single":true}"#,
        )
        .unwrap();
        let response = ffi_call(execute_request(client, request.as_ptr()));

        let payload = match response {
            AppResponse::Ok(payload) => payload,
            other => panic!("unexpected response: {other}"),
        };
        let envelope: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(envelope["data"]["title"], "Himalayan Adventure Trek");

        assert!(matches!(ffi_call(reset_store(client)), AppResponse::Ok(_)));
        close_client(client);
    }

    #[test]
    fn test_ffi_rejects_bad_input() {
        let null_client = ffi_call(execute_request(std::ptr::null_mut(), std::ptr::null()));
        assert!(matches!(null_client, AppResponse::BadRequest(_)));

        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("ffi_bad").to_str().unwrap()).unwrap();
        let client = create_client(path.as_ptr());

        let garbage = CString::new("not a request").unwrap();
        let response = ffi_call(execute_request(client, garbage.as_ptr()));
        assert!(matches!(response, AppResponse::SerializationError(_)));

        let unknown = CString::new(r#"{"table":"payments"}"#).unwrap();
        let response = ffi_call(execute_request(client, unknown.as_ptr()));
        assert!(matches!(response, AppResponse::NotFound(_)));

        assert!(create_client(std::ptr::null()).is_null());
        close_client(client);
        close_client(std::ptr::null_mut());
    }

    #[test]
    fn test_config_backend_mode() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            BackendConfig::from_lookup(move |name| {
                pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
            })
        };

        assert_eq!(env(&[]).mode(), BackendMode::Emulated);
        assert_eq!(
            env(&[(ENV_URL, "https://abc.example.co"), (ENV_ANON_KEY, "key")]).mode(),
            BackendMode::Remote
        );
        assert_eq!(
            env(&[(ENV_URL, "http://LOCALHOST:54321"), (ENV_ANON_KEY, "key")]).mode(),
            BackendMode::Emulated
        );
        assert_eq!(
            env(&[(ENV_URL, "https://abc.example.co"), (ENV_ANON_KEY, "  ")]).mode(),
            BackendMode::Emulated
        );

        let custom = env(&[(ENV_STORAGE_KEY, "custom_key")]);
        assert_eq!(custom.storage_key, "custom_key");
        assert_eq!(custom.storage_path, BackendConfig::default().storage_path);
    }

    #[test]
    fn test_auth_demo_sign_in() {
        let (db, _) = memory_db();

        let admin = demo_sign_in(&db, DEMO_ADMIN.email, DEMO_ADMIN.password).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(is_demo_user(&admin.id));

        assert_eq!(
            demo_sign_in(&db, DEMO_ADMIN.email, "wrong"),
            Err(AuthError::NotConfigured)
        );
        assert_eq!(
            demo_sign_in(&db, "someone@else.com", "pw"),
            Err(AuthError::NotConfigured)
        );

        db.from::<User>()
            .update(patch(json!({ "full_name": "Renamed" })))
            .eq("id", DEMO_USER.user_id)
            .execute();
        let renamed = demo_sign_in(&db, DEMO_USER.email, DEMO_USER.password).unwrap();
        assert_eq!(renamed.full_name, "Renamed");

        db.from::<User>().delete().eq("id", DEMO_USER.user_id).execute();
        let fallback = demo_sign_in(&db, DEMO_USER.email, DEMO_USER.password).unwrap();
        assert_eq!(fallback.full_name, "Demo User");
        assert!(!is_demo_user("5f0c3c1e-real-user"));
    }

    // ===============================
    // FILTER INTERNALS
    // ===============================

    #[test]
    fn test_filter_or_clause_parsing() {
        let clauses = parse_or_expression(" title.ilike.%St. Moritz% , category.eq.Beach ,, x ");
        assert_eq!(clauses.len(), 3);
        assert_eq!(clauses[0], OrClause::ilike("title", "st. moritz"));
        assert_eq!(clauses[1].op, ClauseOp::Eq("beach".into()));
        assert!(matches!(clauses[2].op, ClauseOp::Unsupported(_)));
        assert!(!clauses[2].matches(&json!({ "x": "anything" })));
    }

    #[test]
    fn test_filter_value_comparison() {
        use std::cmp::Ordering;

        assert_eq!(compare_values(&json!(5), &json!(5.0)), Some(Ordering::Equal));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("5"), &json!(5)), None);
        assert_eq!(sort_cmp(Some(&json!(9)), Some(&json!(10))), Ordering::Less);
        assert_eq!(sort_cmp(Some(&json!("9")), Some(&json!("10"))), Ordering::Greater);
        assert_eq!(
            sort_cmp(
                Some(&json!("2025-01-01T00:00:05Z")),
                Some(&json!("2025-01-01T00:00:05.123Z"))
            ),
            Ordering::Less
        );
        assert_eq!(stringify(Some(&json!(["a", 1]))), "a,1");
        assert_eq!(stringify(None), "");
    }
}
