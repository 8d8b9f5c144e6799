//! GeoJSON features attached to projects and their entities

use crate::db::{Database, Page};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_PER_PAGE: i64 = 50;

pub const GEOMETRY_TYPES: [&str; 6] = [
    "Point",
    "LineString",
    "Polygon",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GeoFeature {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Value,
    pub properties: Value,
    pub project_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeoFilter {
    pub project_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub geometry_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewGeoFeature {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub geometry: Option<Value>,
    pub properties: Option<Value>,
    pub project_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

/// Validated create request
#[derive(Debug, Clone, PartialEq)]
pub struct ValidGeoFeature {
    pub kind: String,
    pub geometry: Value,
    pub entity_type: String,
    pub entity_id: String,
}

impl NewGeoFeature {
    pub fn validate(&self) -> Result<ValidGeoFeature, String> {
        let (Some(kind), Some(geometry), Some(entity_type), Some(entity_id)) = (
            self.kind.as_deref(),
            self.geometry.as_ref(),
            self.entity_type.as_deref(),
            self.entity_id.as_deref(),
        ) else {
            return Err("type, geometry, entity_type and entity_id are required".to_string());
        };

        let geometry_type = geometry.get("type").and_then(Value::as_str);
        match geometry_type {
            Some(t) if GEOMETRY_TYPES.contains(&t) => {}
            _ => return Err("geometry must be a GeoJSON geometry with a valid type".to_string()),
        }
        if geometry.get("coordinates").map_or(true, Value::is_null) {
            return Err("geometry.coordinates is required".to_string());
        }

        Ok(ValidGeoFeature {
            kind: kind.to_string(),
            geometry: geometry.clone(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GeoStore {
    pool: PgPool,
}

impl GeoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &GeoFilter) {
        builder.push(" WHERE 1=1");
        if let Some(project_id) = filter.project_id {
            builder.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(entity_type) = &filter.entity_type {
            builder.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = &filter.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        if let Some(geometry_type) = &filter.geometry_type {
            builder
                .push(" AND geometry->>'type' = ")
                .push_bind(geometry_type.clone());
        }
    }

    pub async fn list(&self, filter: &GeoFilter, page: Page) -> Result<(Vec<GeoFeature>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM geospatial_features");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT * FROM geospatial_features");
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let features = select.build_query_as::<GeoFeature>().fetch_all(&self.pool).await?;

        Ok((features, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<GeoFeature> {
        let feature = sqlx::query_as::<_, GeoFeature>("SELECT * FROM geospatial_features WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(feature)
    }

    pub async fn create(
        &self,
        valid: ValidGeoFeature,
        properties: Option<Value>,
        project_id: Option<Uuid>,
        created_by: &str,
    ) -> Result<GeoFeature> {
        let feature = sqlx::query_as::<_, GeoFeature>(
            "INSERT INTO geospatial_features (type, geometry, properties, project_id, entity_type, entity_id, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(valid.kind)
        .bind(valid.geometry)
        .bind(properties.unwrap_or_else(|| Value::Object(Default::default())))
        .bind(project_id)
        .bind(valid.entity_type)
        .bind(valid.entity_id)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(feature)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>("DELETE FROM geospatial_features WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(geometry: Value) -> NewGeoFeature {
        NewGeoFeature {
            kind: Some("Feature".into()),
            geometry: Some(geometry),
            properties: None,
            project_id: None,
            entity_type: Some("cabinet".into()),
            entity_id: Some("NVT-0042".into()),
        }
    }

    #[test]
    fn point_geometry_validates() {
        let valid = body(json!({ "type": "Point", "coordinates": [13.4, 52.5] }))
            .validate()
            .unwrap();
        assert_eq!(valid.entity_id, "NVT-0042");
    }

    #[test]
    fn unknown_geometry_type_is_rejected() {
        assert!(body(json!({ "type": "Circle", "coordinates": [0, 0] })).validate().is_err());
    }

    #[test]
    fn coordinates_are_required() {
        assert!(body(json!({ "type": "LineString" })).validate().is_err());
    }

    #[test]
    fn missing_entity_is_rejected() {
        let mut b = body(json!({ "type": "Point", "coordinates": [0, 0] }));
        b.entity_type = None;
        assert!(b.validate().unwrap_err().contains("required"));
    }
}
