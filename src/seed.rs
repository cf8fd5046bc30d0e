//! Seeding, catalog coverage and deduplication.
//!
//! The emulator is reopened on every page load with no server to coordinate
//! with, so every routine here is idempotent: running it on an already
//! prepared [`Database`] changes nothing and reports `false`. Callers persist
//! only when a routine reports a change.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::info;
use uuid::Uuid;

use crate::local_db_model::{Database, Difficulty, Role, Table, Tour, User};

pub const DEMO_ADMIN_ID: &str = "demo-admin";
pub const DEMO_USER_ID: &str = "demo-user";
pub const DEMO_ADMIN_EMAIL: &str = "admin@wanderlust.com";
pub const DEMO_USER_EMAIL: &str = "user@example.com";

/// A built-in catalog tour, before the store gives it an identity.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub title: &'static str,
    pub description: &'static str,
    pub price: i64,
    pub duration: u32,
    pub location: &'static str,
    pub category: &'static str,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub featured: bool,
    pub images: &'static [&'static str],
    pub available_dates: &'static [&'static str],
}

impl CatalogEntry {
    pub fn to_tour(&self, id: String, now: DateTime<Utc>) -> Tour {
        Tour {
            id,
            created_at: now,
            updated_at: now,
            title: self.title.to_string(),
            description: self.description.to_string(),
            price: self.price,
            duration: self.duration,
            location: self.location.to_string(),
            category: self.category.to_string(),
            images: self.images.iter().map(|s| s.to_string()).collect(),
            featured: self.featured,
            max_group_size: self.max_group_size,
            difficulty: self.difficulty,
            available_dates: self.available_dates.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub const SAMPLE_TOURS: [CatalogEntry; 12] = [
    CatalogEntry {
        title: "Himalayan Adventure Trek",
        description: "Ten days through pristine mountain landscapes, ancient monasteries and high-altitude sunrise viewpoints, with time among the mountain communities.",
        price: 108500,
        duration: 10,
        location: "Nepal Himalayas",
        category: "Adventure",
        max_group_size: 12,
        difficulty: Difficulty::Challenging,
        featured: true,
        images: &[
            "https://images.pexels.com/photos/1591373/pexels-photo-1591373.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/1366919/pexels-photo-1366919.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/1366957/pexels-photo-1366957.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-03-15", "2025-04-12", "2025-05-10", "2025-06-07"],
    },
    CatalogEntry {
        title: "Santorini Sunset Experience",
        description: "Five days of white-washed villages, vineyard tastings, clear water and the island's famous sunsets.",
        price: 75000,
        duration: 5,
        location: "Santorini, Greece",
        category: "Beach",
        max_group_size: 16,
        difficulty: Difficulty::Easy,
        featured: true,
        images: &[
            "https://images.pexels.com/photos/2325446/pexels-photo-2325446.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/1285625/pexels-photo-1285625.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-04-20", "2025-05-18", "2025-06-15", "2025-07-13"],
    },
    CatalogEntry {
        title: "African Safari Adventure",
        description: "A seven-day safari across Kenya's national parks following the Great Migration, with safari lodges and expert guides.",
        price: 184000,
        duration: 7,
        location: "Kenya",
        category: "Wildlife",
        max_group_size: 8,
        difficulty: Difficulty::Moderate,
        featured: true,
        images: &[
            "https://images.pexels.com/photos/1134166/pexels-photo-1134166.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/631317/pexels-photo-631317.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-03-22", "2025-04-19", "2025-05-24", "2025-06-21"],
    },
    CatalogEntry {
        title: "Tokyo Cultural Immersion",
        description: "Six days of tea ceremonies, temples, markets and Japanese cuisine in the heart of Tokyo.",
        price: 134000,
        duration: 6,
        location: "Tokyo, Japan",
        category: "Cultural",
        max_group_size: 14,
        difficulty: Difficulty::Easy,
        featured: false,
        images: &[
            "https://images.pexels.com/photos/2614818/pexels-photo-2614818.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/2187605/pexels-photo-2187605.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-03-10", "2025-04-14", "2025-05-12", "2025-06-09"],
    },
    CatalogEntry {
        title: "Swiss Alps Luxury Retreat",
        description: "Eight days of skiing, spa treatments and gourmet dining with luxury alpine accommodation.",
        price: 292000,
        duration: 8,
        location: "Swiss Alps, Switzerland",
        category: "Mountain",
        max_group_size: 10,
        difficulty: Difficulty::Moderate,
        featured: true,
        images: &[
            "https://images.pexels.com/photos/1054218/pexels-photo-1054218.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/1578662/pexels-photo-1578662.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-02-15", "2025-03-01", "2025-12-15", "2025-12-22"],
    },
    CatalogEntry {
        title: "Bali Spiritual Journey",
        description: "Nine days of meditation, yoga, traditional healing and sacred temples across Bali.",
        price: 99900,
        duration: 9,
        location: "Bali, Indonesia",
        category: "Cultural",
        max_group_size: 12,
        difficulty: Difficulty::Easy,
        featured: false,
        images: &[
            "https://images.pexels.com/photos/2166553/pexels-photo-2166553.jpeg?auto=compress&cs=tinysrgb&w=800",
            "https://images.pexels.com/photos/2161467/pexels-photo-2161467.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-03-05", "2025-04-02", "2025-05-07", "2025-06-04"],
    },
    CatalogEntry {
        title: "Patagonia Glacier Expedition",
        description: "Twelve days of glacier hikes, granite spires and wind-swept steppe between El Chalten and Torres del Paine.",
        price: 245000,
        duration: 12,
        location: "Patagonia, Argentina",
        category: "Adventure",
        max_group_size: 10,
        difficulty: Difficulty::Challenging,
        featured: false,
        images: &[
            "https://images.pexels.com/photos/2098427/pexels-photo-2098427.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-01-10", "2025-02-07", "2025-11-14", "2025-12-05"],
    },
    CatalogEntry {
        title: "Iceland Northern Lights Chase",
        description: "Four winter nights hunting the aurora, with geothermal lagoons and black-sand beaches by day.",
        price: 89000,
        duration: 4,
        location: "Reykjavik, Iceland",
        category: "Nature",
        max_group_size: 14,
        difficulty: Difficulty::Easy,
        featured: false,
        images: &[
            "https://images.pexels.com/photos/1933239/pexels-photo-1933239.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-01-18", "2025-02-15", "2025-10-25", "2025-11-22"],
    },
    CatalogEntry {
        title: "Machu Picchu Inca Trail",
        description: "A seven-day trek along the classic Inca Trail through cloud forest to the Sun Gate at dawn.",
        price: 142000,
        duration: 7,
        location: "Cusco, Peru",
        category: "Adventure",
        max_group_size: 12,
        difficulty: Difficulty::Challenging,
        featured: true,
        images: &[
            "https://images.pexels.com/photos/2929906/pexels-photo-2929906.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-04-05", "2025-05-03", "2025-06-14", "2025-09-06"],
    },
    CatalogEntry {
        title: "Sahara Desert Caravan",
        description: "Six days from Marrakech over the Atlas Mountains to a camel caravan and a night under desert stars.",
        price: 68000,
        duration: 6,
        location: "Merzouga, Morocco",
        category: "Cultural",
        max_group_size: 16,
        difficulty: Difficulty::Moderate,
        featured: false,
        images: &[
            "https://images.pexels.com/photos/3889843/pexels-photo-3889843.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-03-08", "2025-04-05", "2025-10-11", "2025-11-08"],
    },
    CatalogEntry {
        title: "Ha Long Bay Cruise",
        description: "Three days aboard a junk among limestone karsts, with kayaking and floating villages.",
        price: 54000,
        duration: 3,
        location: "Ha Long Bay, Vietnam",
        category: "Beach",
        max_group_size: 20,
        difficulty: Difficulty::Easy,
        featured: false,
        images: &[
            "https://images.pexels.com/photos/2132180/pexels-photo-2132180.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-03-20", "2025-04-17", "2025-05-15", "2025-10-16"],
    },
    CatalogEntry {
        title: "New Zealand Fjord Explorer",
        description: "Eleven days from Queenstown to Milford Sound with fjord cruises, alpine walks and glowworm caves.",
        price: 215000,
        duration: 11,
        location: "Fiordland, New Zealand",
        category: "Nature",
        max_group_size: 12,
        difficulty: Difficulty::Moderate,
        featured: true,
        images: &[
            "https://images.pexels.com/photos/1441122/pexels-photo-1441122.jpeg?auto=compress&cs=tinysrgb&w=800",
        ],
        available_dates: &["2025-01-12", "2025-02-09", "2025-03-09", "2025-11-16"],
    },
];

/// A random identifier `is_taken` rejects.
pub fn fresh_id(is_taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if !is_taken(&id) {
            return id;
        }
    }
}

pub fn catalog_tours(now: DateTime<Utc>) -> Vec<Tour> {
    SAMPLE_TOURS
        .iter()
        .map(|entry| entry.to_tour(Uuid::new_v4().to_string(), now))
        .collect()
}

pub fn demo_users(now: DateTime<Utc>) -> Vec<User> {
    vec![
        User {
            id: DEMO_ADMIN_ID.to_string(),
            created_at: now,
            updated_at: Some(now),
            email: DEMO_ADMIN_EMAIL.to_string(),
            full_name: "Admin".to_string(),
            role: Role::Admin,
            phone: String::new(),
            address: String::new(),
            avatar_url: None,
        },
        User {
            id: DEMO_USER_ID.to_string(),
            created_at: now,
            updated_at: Some(now),
            email: DEMO_USER_EMAIL.to_string(),
            full_name: "Demo User".to_string(),
            role: Role::User,
            phone: String::new(),
            address: String::new(),
            avatar_url: None,
        },
    ]
}

/// The state of a store that has never been written.
pub fn fresh_database(now: DateTime<Utc>) -> Database {
    Database {
        tours: catalog_tours(now),
        users: demo_users(now),
        ..Database::default()
    }
}

/// Populates an empty tours or users collection. Other tables start empty by
/// design and are left alone.
pub fn seed_if_empty(db: &mut Database, table: Table, now: DateTime<Utc>) -> bool {
    match table {
        Table::Tours if db.tours.is_empty() => {
            db.tours = catalog_tours(now);
            info!("Seeded {} catalog tours", db.tours.len());
            true
        }
        Table::Users if db.users.is_empty() => {
            db.users = demo_users(now);
            info!("Seeded demo accounts");
            true
        }
        _ => false,
    }
}

/// Appends catalog tours whose `(title, location)` is missing, which happens
/// when the blob was seeded from an older, smaller catalog.
pub fn ensure_catalog_coverage(db: &mut Database, now: DateTime<Utc>) -> bool {
    let present: HashSet<(&str, &str)> = db.tours.iter().map(Tour::catalog_key).collect();
    let missing: Vec<&CatalogEntry> = SAMPLE_TOURS
        .iter()
        .filter(|entry| !present.contains(&(entry.title, entry.location)))
        .collect();

    if missing.is_empty() {
        return false;
    }

    let mut added = Vec::with_capacity(missing.len());
    for entry in missing {
        let id = fresh_id(|id| db.tours.iter().chain(&added).any(|t| t.id == id));
        added.push(entry.to_tour(id, now));
    }
    info!("Added {} catalog tours missing from the store", added.len());
    db.tours.extend(added);
    true
}

/// Collapses tours sharing a dedup key, keeping the first occurrence.
pub fn deduplicate(db: &mut Database) -> bool {
    let before = db.tours.len();
    let mut seen = HashSet::new();
    let kept: Vec<Tour> = db
        .tours
        .iter()
        .filter(|tour| {
            let (title, location, duration, price) = tour.dedup_key();
            seen.insert((title.to_string(), location.to_string(), duration, price))
        })
        .cloned()
        .collect();

    if kept.len() == before {
        return false;
    }
    info!("Collapsed {} duplicate tours", before - kept.len());
    db.tours = kept;
    true
}

/// Everything a read of `table` does before filtering.
pub fn prepare(db: &mut Database, table: Table, now: DateTime<Utc>) -> bool {
    let mut changed = seed_if_empty(db, table, now);
    if table == Table::Tours {
        changed |= ensure_catalog_coverage(db, now);
        changed |= deduplicate(db);
    }
    changed
}
