/// COMETA: fiber-optic construction management API
///
/// Projects, crews, work entries, materials, equipment, vehicles, documents
/// and notifications over a Postgres database, served with Axum.

// Core configuration and setup
pub mod config;

// Error type shared by every handler
pub mod error;

// Postgres pool, schema bootstrap and pagination helpers
pub mod db;

// JWT issuing, role permissions and the request extractor
pub mod auth;

// Supabase storage client for signed URLs and object removal
pub mod storage;

// Per-resource queries
pub mod store;

// HTTP API layer - one module per resource
pub mod api;

// Date-driven reminders and their cron job
pub mod scheduler;

// Server setup and initialization
pub mod server;

pub use api::AppState;
pub use config::Config;
pub use server::{build_router, start_server};
