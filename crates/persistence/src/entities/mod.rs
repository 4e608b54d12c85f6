//! The application's persisted entities.
//!
//! Each entity's serde form is its storage form: field names are column
//! names, and relation fields are only populated by preloading.
//!
//! Password hashing, token signing and key material generation are the
//! business layer's concern; these types only carry the stored values.

mod account;
mod credential;
mod key;
mod session;
mod template;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::TableSchema;

pub use account::Account;
pub use credential::{Credential, Platform, PlatformType};
pub use key::Key;
pub use session::{Device, Session};
pub use template::Template;

/// Every entity table, parents before children.
pub static ALL_SCHEMAS: &[&TableSchema] = &[
    &account::SCHEMA,
    &key::SCHEMA,
    &template::SCHEMA,
    &credential::SCHEMA,
    &session::SCHEMA,
];

/// Assigns a v4 id and the creation time when they are unset.
fn assign_identity(id: &mut String, created_at: &mut DateTime<Utc>) {
    if id.is_empty() {
        *id = Uuid::new_v4().to_string();
    }
    if *created_at == DateTime::<Utc>::UNIX_EPOCH {
        *created_at = Utc::now();
    }
}

/// Sets `ts` to now when it holds the zero timestamp.
fn touch_if_unset(ts: &mut DateTime<Utc>) {
    if *ts == DateTime::<Utc>::UNIX_EPOCH {
        *ts = Utc::now();
    }
}
