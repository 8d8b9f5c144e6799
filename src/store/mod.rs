//! Per-resource data access
//!
//! Each store wraps a clone of the pool and exposes the queries one resource
//! needs. Stores return `anyhow::Result`; handlers turn failures into
//! `ApiError` so missing rows and constraint violations keep their status.

pub mod crews;
pub mod dashboard;
pub mod documents;
pub mod equipment;
pub mod equipment_documents;
pub mod geospatial;
pub mod maintenance;
pub mod materials;
pub mod notifications;
pub mod project_contacts;
pub mod projects;
pub mod readiness;
pub mod reservations;
pub mod suppliers;
pub mod users;
pub mod vehicles;
pub mod work_entries;

pub use crews::CrewStore;
pub use dashboard::DashboardStore;
pub use documents::DocumentStore;
pub use equipment::EquipmentStore;
pub use equipment_documents::EquipmentDocumentStore;
pub use geospatial::GeoStore;
pub use maintenance::MaintenanceStore;
pub use materials::MaterialStore;
pub use notifications::NotificationStore;
pub use project_contacts::ProjectContactStore;
pub use projects::ProjectStore;
pub use readiness::ReadinessStore;
pub use reservations::ReservationStore;
pub use suppliers::SupplierStore;
pub use users::UserStore;
pub use vehicles::VehicleStore;
pub use work_entries::WorkEntryStore;
