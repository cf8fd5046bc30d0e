//! Demo sign-in.
//!
//! Without a hosted identity provider the storefront still accepts two fixed
//! credential pairs, one per role, resolving them to the demo accounts the
//! store seeds. Everything else is refused.

use log::info;

use crate::local_db_model::{Role, User};
use crate::local_db_state::LocalDb;
use crate::seed::{self, DEMO_ADMIN_EMAIL, DEMO_ADMIN_ID, DEMO_USER_EMAIL, DEMO_USER_ID};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("backend not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoCredentials {
    pub user_id: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub role: Role,
}

pub const DEMO_ADMIN: DemoCredentials = DemoCredentials {
    user_id: DEMO_ADMIN_ID,
    email: DEMO_ADMIN_EMAIL,
    password: "admin123",
    role: Role::Admin,
};

pub const DEMO_USER: DemoCredentials = DemoCredentials {
    user_id: DEMO_USER_ID,
    email: DEMO_USER_EMAIL,
    password: "user123",
    role: Role::User,
};

pub fn is_demo_user(user_id: &str) -> bool {
    user_id.starts_with("demo-")
}

/// Resolves a demo credential pair to its user profile.
///
/// The stored record wins, so profile edits show up; if it was deleted, the
/// seeded profile is returned instead.
pub fn demo_sign_in(db: &LocalDb, email: &str, password: &str) -> Result<User, AuthError> {
    let credentials = [DEMO_ADMIN, DEMO_USER]
        .into_iter()
        .find(|c| c.email == email && c.password == password)
        .ok_or(AuthError::NotConfigured)?;

    let stored = db
        .from::<User>()
        .select("*")
        .eq("id", credentials.user_id)
        .maybe_single()
        .data
        .map(|row| row.record);

    let profile = match stored {
        Some(user) => user,
        None => seed::demo_users(chrono::Utc::now())
            .into_iter()
            .find(|u| u.id == credentials.user_id)
            .ok_or(AuthError::NotConfigured)?,
    };

    info!("Demo sign-in as {} ({:?})", profile.email, credentials.role);
    Ok(profile)
}
