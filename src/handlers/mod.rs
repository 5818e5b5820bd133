//! HTTP handlers
//!
//! - internal: metadata, health and metrics at the root path
//! - records: read-only queries under `/{app.name}`

pub mod html;
pub mod internal;
pub mod records;

use std::sync::Arc;

use crate::config::Config;
use crate::store::RecordStore;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RecordStore>,
}
