//! Shared state for the HTTP API.

use crate::crawler::CrawlManager;
use crate::search::SearchEngine;
use crate::storage::Database;

/// State shared across all API handlers.
pub struct ApiState {
    pub db: Database,
    pub manager: CrawlManager,
    pub engine: SearchEngine,
}

impl ApiState {
    pub fn new(db: Database, manager: CrawlManager, engine: SearchEngine) -> Self {
        Self {
            db,
            manager,
            engine,
        }
    }
}
