/// HTTP API layer
///
/// One module per resource. Each exposes a `create_*_routes()` builder that
/// the server merges into a single router sharing `AppState`.

use crate::{config::Config, db::Database, error::ApiError, storage::StorageClient};
use axum::Router;
use std::sync::Arc;

pub mod auth;
pub mod crews;
pub mod dashboard;
pub mod documents;
pub mod equipment;
pub mod equipment_documents;
pub mod geospatial;
pub mod maintenance;
pub mod materials;
pub mod notifications;
pub mod projects;
pub mod readiness;
pub mod reservations;
pub mod suppliers;
pub mod users;
pub mod vehicles;
pub mod work_entries;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Immutable runtime configuration
    pub config: Arc<Config>,
    /// Postgres pool
    pub db: Database,
    /// Supabase storage client for signed URLs and object removal
    pub storage: StorageClient,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        let storage = StorageClient::new(&config.storage);
        Self {
            config: Arc::new(config),
            db,
            storage,
        }
    }
}

/// Every resource route, without state
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::create_auth_routes())
        .merge(users::create_user_routes())
        .merge(projects::create_project_routes())
        .merge(readiness::create_readiness_routes())
        .merge(crews::create_crew_routes())
        .merge(work_entries::create_work_entry_routes())
        .merge(materials::create_material_routes())
        .merge(equipment::create_equipment_routes())
        .merge(reservations::create_reservation_routes())
        .merge(maintenance::create_maintenance_routes())
        .merge(equipment_documents::create_equipment_document_routes())
        .merge(suppliers::create_supplier_routes())
        .merge(vehicles::create_vehicle_routes())
        .merge(documents::create_document_routes())
        .merge(notifications::create_notification_routes())
        .merge(dashboard::create_dashboard_routes())
        .merge(geospatial::create_geospatial_routes())
}

/// Trimmed, non-empty text field or a 400 naming it
pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_rejects_blank_values() {
        assert_eq!(required(Some("  Glasfaser Nord "), "name").unwrap(), "Glasfaser Nord");
        assert!(required(Some("   "), "name").is_err());
        assert_eq!(
            required(None, "name").unwrap_err().to_string(),
            "name is required"
        );
    }
}
