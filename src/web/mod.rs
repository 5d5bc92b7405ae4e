//! Control plane over HTTP
//!
//! ## Responsibilities
//!
//! - Start/stop/status of the recorder (flag toggles only)
//! - Read-only queries over stored captures
//! - Serving stored image files

mod routes;

pub use routes::create_router;

use uuid::Uuid;

use crate::capture::ControlFlags;
use crate::db::Database;

/// Shared by every handler. Handlers never touch the recording task itself.
#[derive(Clone)]
pub struct AppState {
    pub flags: ControlFlags,
    pub db: Database,
    /// Generated once per process so clients can tell when it restarted.
    pub instance_id: Uuid,
}

impl AppState {
    pub fn new(flags: ControlFlags, db: Database) -> Self {
        Self {
            flags,
            db,
            instance_id: Uuid::new_v4(),
        }
    }
}
