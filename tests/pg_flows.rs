//! Flows against a real Postgres
//!
//! Each test boots an embedded cluster with `postgresql_embedded`, creates a
//! fresh database, runs the schema bootstrap through `Database::connect` and
//! then drives the router. When the cluster cannot be started (no binaries,
//! running as root) the test fails unless `SKIP_TEST_CLUSTER=1` is set.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use cometa::{
    auth::issue_tokens,
    build_router,
    config::Config,
    db::Database,
    error::ApiError,
    store::{equipment::NewAssignment, EquipmentStore},
    AppState,
};
use http_body_util::BodyExt;
use postgresql_embedded::PostgreSQL;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "pg-flow-secret";

struct Cluster {
    // stops the server on drop
    _postgres: PostgreSQL,
    state: AppState,
}

fn skip_or_panic(reason: impl std::fmt::Display) -> Option<Cluster> {
    if std::env::var("SKIP_TEST_CLUSTER").is_ok_and(|v| v == "1") {
        eprintln!("SKIP-TEST-CLUSTER: {reason}");
        None
    } else {
        panic!("Test cluster setup failed: {reason}. Set SKIP_TEST_CLUSTER=1 to skip.");
    }
}

async fn cluster() -> Option<Cluster> {
    let mut postgres = PostgreSQL::default();
    if let Err(e) = postgres.setup().await {
        return skip_or_panic(e);
    }
    if let Err(e) = postgres.start().await {
        return skip_or_panic(e);
    }
    let name = format!("cometa_{}", Uuid::new_v4().simple());
    if let Err(e) = postgres.create_database(&name).await {
        return skip_or_panic(e);
    }

    let mut config = Config::default();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.database.url = postgres.settings().url(&name);
    config.database.max_connections = 4;
    config.database.init_schema = true;
    config.scheduler.enabled = false;

    let db = Database::connect(&config.database)
        .await
        .expect("schema bootstrap against embedded postgres");
    Some(Cluster {
        _postgres: postgres,
        state: AppState::new(config, db),
    })
}

impl Cluster {
    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    fn pool(&self) -> &PgPool {
        self.state.db.pool()
    }

    /// Insert an admin row and return its id with a bearer token
    async fn admin(&self) -> (Uuid, String) {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (email, first_name, last_name, role) \
             VALUES ($1, 'Anna', 'Becker', 'admin') RETURNING id",
        )
        .bind(format!("{}@cometa.test", Uuid::new_v4().simple()))
        .fetch_one(self.pool())
        .await
        .unwrap();
        let token = issue_tokens(JWT_SECRET, id, None, "admin", false)
            .unwrap()
            .access_token;
        (id, token)
    }

    async fn send(&self, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn project(&self, token: &str) -> Uuid {
        let (status, body) = self
            .send("POST", "/api/projects", token, Some(json!({ "name": "Glasfaser Nordring" })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    async fn material(&self, token: &str, stock: f64) -> Uuid {
        let (status, body) = self
            .send(
                "POST",
                "/api/materials",
                token,
                Some(json!({
                    "name": "Speedpipe 12x1",
                    "unit": "m",
                    "unit_price_eur": 0.8,
                    "current_stock": stock,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    async fn stock_of(&self, material_id: Uuid) -> f64 {
        sqlx::query_scalar("SELECT current_stock FROM materials WHERE id = $1")
            .bind(material_id)
            .fetch_one(self.pool())
            .await
            .unwrap()
    }

    async fn transactions_of(&self, material_id: Uuid) -> Vec<(String, f64)> {
        sqlx::query_as(
            "SELECT transaction_type, quantity FROM material_transactions \
             WHERE material_id = $1 ORDER BY created_at",
        )
        .bind(material_id)
        .fetch_all(self.pool())
        .await
        .unwrap()
    }

    async fn equipment(&self, token: &str) -> Uuid {
        let (status, body) = self
            .send(
                "POST",
                "/api/equipment",
                token,
                Some(json!({ "name": "Minibagger KX019", "type": "machine" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }
}

#[tokio::test]
async fn created_project_reads_back() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;

    let project_id = cluster.project(&token).await;

    let (status, body) = cluster
        .send("GET", &format!("/api/projects/{}", project_id), &token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Glasfaser Nordring");
    assert_eq!(body["status"], "draft");
}

#[tokio::test]
async fn stock_adjustment_logs_a_transaction_and_stops_at_zero() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;
    let material_id = cluster.material(&token, 10.0).await;

    let (status, body) = cluster
        .send(
            "POST",
            &format!("/api/materials/{}/adjust", material_id),
            &token,
            Some(json!({ "quantity": -25.0, "reason": "Inventur" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["adjustment"]["previous_stock"], 10.0);
    assert_eq!(body["adjustment"]["new_stock"], 0.0);

    assert_eq!(cluster.stock_of(material_id).await, 0.0);
    let logged = cluster.transactions_of(material_id).await;
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].1, 25.0);
}

#[tokio::test]
async fn delivered_order_books_stock_once() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;
    let material_id = cluster.material(&token, 5.0).await;

    let (status, order) = cluster
        .send(
            "POST",
            "/api/materials/orders",
            &token,
            Some(json!({ "material_id": material_id, "quantity": 40.0, "unit_price": 0.8 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let uri = format!("/api/materials/orders/{}", order["id"].as_str().unwrap());

    for _ in 0..2 {
        let (status, body) = cluster
            .send("PUT", &uri, &token, Some(json!({ "status": "delivered" })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "delivered");
    }

    assert_eq!(cluster.stock_of(material_id).await, 45.0);
    let receipts: Vec<_> = cluster
        .transactions_of(material_id)
        .await
        .into_iter()
        .filter(|(kind, _)| kind == "receipt")
        .collect();
    assert_eq!(receipts, vec![("receipt".to_string(), 40.0)]);
}

#[tokio::test]
async fn patching_a_notification_sets_read_at() {
    let Some(cluster) = cluster().await else { return };
    let (user_id, token) = cluster.admin().await;

    let (status, created) = cluster
        .send(
            "POST",
            "/api/notifications",
            &token,
            Some(json!({
                "user_id": user_id,
                "title": "Lieferung eingetroffen",
                "message": "Speedpipe liegt im Lager",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let (status, body) = cluster
        .send("PATCH", &format!("/api/notifications/{}", id), &token, Some(json!({ "read": true })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (is_read, read_at): (bool, Option<chrono::DateTime<chrono::Utc>>) =
        sqlx::query_as("SELECT is_read, read_at FROM in_app_notifications WHERE id = $1")
            .bind(id)
            .fetch_one(cluster.pool())
            .await
            .unwrap();
    assert!(is_read);
    assert!(read_at.is_some());
}

#[tokio::test]
async fn readiness_seeds_checklist_and_caches_the_score() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;
    let project_id = cluster.project(&token).await;

    let (status, items) = cluster
        .send("GET", &format!("/api/project-readiness/{}/checklist", project_id), &token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let seeded = items.as_array().unwrap().len();
    assert!(seeded > 0);

    // a second read does not seed again
    let (_, again) = cluster
        .send("GET", &format!("/api/project-readiness/{}/checklist", project_id), &token, None)
        .await;
    assert_eq!(again.as_array().unwrap().len(), seeded);

    let first_item = items[0]["id"].as_str().unwrap();
    let (status, _) = cluster
        .send(
            "PUT",
            &format!("/api/project-readiness/{}/checklist/{}", project_id, first_item),
            &token,
            Some(json!({ "completed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = cluster
        .send("GET", &format!("/api/project-readiness/{}", project_id), &token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed_checks"], 1);

    let cached: f64 = sqlx::query_scalar(
        "SELECT overall_readiness FROM project_readiness_cache WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_one(cluster.pool())
    .await
    .unwrap();
    assert_eq!(json!(cached), body["overall_readiness"]);
}

#[tokio::test]
async fn activation_waits_for_a_ready_checklist() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;
    let project_id = cluster.project(&token).await;
    cluster
        .send("GET", &format!("/api/project-readiness/{}/checklist", project_id), &token, None)
        .await;

    let request = json!({
        "project_id": project_id,
        "activation_date": "2024-06-03",
        "responsible_manager": "Anna Becker",
    });
    let (status, body) = cluster
        .send("POST", "/api/project-activation", &token, Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["required_readiness"], 90.0);

    sqlx::query("UPDATE project_checklist_items SET completed = TRUE WHERE project_id = $1")
        .bind(project_id)
        .execute(cluster.pool())
        .await
        .unwrap();

    let (status, body) = cluster
        .send("POST", "/api/project-activation", &token, Some(request))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["previous_status"], "draft");
    assert_eq!(body["new_status"], "active");

    let status: String = sqlx::query_scalar("SELECT status FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_one(cluster.pool())
        .await
        .unwrap();
    assert_eq!(status, "active");
}

#[tokio::test]
async fn second_active_assignment_is_a_conflict() {
    let Some(cluster) = cluster().await else { return };
    let (user_id, token) = cluster.admin().await;
    let equipment_id = cluster.equipment(&token).await;

    let assignment = json!({ "equipment_id": equipment_id, "user_id": user_id });
    let (status, body) = cluster
        .send("POST", "/api/equipment/assignments", &token, Some(assignment.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (status, _) = cluster
        .send("POST", "/api/equipment/assignments", &token, Some(assignment))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // past the pre-check, the index itself refuses the row
    let raw = NewAssignment {
        equipment_id: Some(equipment_id),
        project_id: None,
        crew_id: None,
        user_id: Some(user_id),
        from_ts: None,
        to_ts: None,
        is_permanent: None,
        rental_cost_per_day: None,
        notes: None,
    };
    let err = EquipmentStore::new(&cluster.state.db)
        .assign(equipment_id, &raw)
        .await
        .unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::Conflict(_)));
}

#[tokio::test]
async fn consumption_draws_down_allocation_and_stock() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;
    let project_id = cluster.project(&token).await;
    let material_id = cluster.material(&token, 100.0).await;

    let (status, allocation) = cluster
        .send(
            "POST",
            "/api/materials/allocations",
            &token,
            Some(json!({
                "project_id": project_id,
                "material_id": material_id,
                "quantity_allocated": 30.0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{allocation}");
    let allocation_id = allocation["id"].as_str().unwrap();

    let (status, body) = cluster
        .send(
            "POST",
            "/api/materials/consume",
            &token,
            Some(json!({ "allocation_id": allocation_id, "consumed_qty": 12.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["material"]["new_stock"], 88.0);
    assert_eq!(cluster.stock_of(material_id).await, 88.0);
    assert!(cluster
        .transactions_of(material_id)
        .await
        .contains(&("issue".to_string(), 12.0)));

    let (status, body) = cluster
        .send(
            "POST",
            "/api/materials/consume",
            &token,
            Some(json!({ "allocation_id": allocation_id, "consumed_qty": 20.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(cluster.stock_of(material_id).await, 88.0);
}

#[tokio::test]
async fn overlapping_reservation_is_refused() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;
    let equipment_id = cluster.equipment(&token).await;

    let (status, body) = cluster
        .send(
            "POST",
            "/api/equipment/reservations",
            &token,
            Some(json!({
                "equipment_id": equipment_id,
                "reserved_from": "2024-06-03T07:00:00Z",
                "reserved_until": "2024-06-05T17:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = cluster
        .send(
            "POST",
            "/api/equipment/reservations",
            &token,
            Some(json!({
                "equipment_id": equipment_id,
                "reserved_from": "2024-06-04T07:00:00Z",
                "reserved_until": "2024-06-06T17:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Reservation conflict");

    // back to back is fine
    let (status, _) = cluster
        .send(
            "POST",
            "/api/equipment/reservations",
            &token,
            Some(json!({
                "equipment_id": equipment_id,
                "reserved_from": "2024-06-05T17:00:00Z",
                "reserved_until": "2024-06-07T17:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn supplier_material_links_are_unique() {
    let Some(cluster) = cluster().await else { return };
    let (_, token) = cluster.admin().await;

    let (status, supplier) = cluster
        .send(
            "POST",
            "/api/suppliers",
            &token,
            Some(json!({ "name": "Kabelwerk Süd GmbH", "email": "einkauf@kabelwerk.de", "rating": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{supplier}");
    assert_eq!(supplier["org_name"], "Kabelwerk Süd GmbH");
    let uri = format!("/api/suppliers/{}/materials", supplier["id"].as_str().unwrap());

    let entry = json!({ "material_name": "Mikrorohr 10x1", "unit": "m", "unit_price": 0.45 });
    let (status, created) = cluster.send("POST", &uri, &token, Some(entry)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["material_name"], "Mikrorohr 10x1");

    let again = json!({ "material_id": created["material_id"], "unit_price": 0.5 });
    let (status, body) = cluster.send("POST", &uri, &token, Some(again)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "This material is already associated with this supplier");
}
