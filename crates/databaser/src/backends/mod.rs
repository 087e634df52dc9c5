//! Database drivers
//!
//! Two driver families share the [`Driver`] / [`DatabaseConnection`] traits:
//! [`PdoDriver`] (native sqlx pools for mysql, pgsql and sqlite) and
//! [`MysqliDriver`] (sqlx MySQL).

pub mod core;
mod decode;
pub mod mysqli;
pub mod pdo;
mod session;

pub use core::*;
pub use mysqli::{MysqliConnection, MysqliDriver};
pub use pdo::{numbered_placeholders, PdoConnection, PdoDriver};

use std::sync::Arc;

/// Driver instance for `kind`
pub fn driver_for(kind: DriverKind) -> Arc<dyn Driver> {
    match kind {
        DriverKind::Pdo => Arc::new(PdoDriver::new()),
        DriverKind::Mysqli => Arc::new(MysqliDriver::new()),
    }
}
