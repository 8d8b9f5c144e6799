//! Material catalogue, stock movements, project allocations and supplier orders

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const ORDER_STATUSES: [&str; 5] = ["pending", "ordered", "confirmed", "delivered", "cancelled"];

pub const ALLOCATION_STATUSES: [&str; 5] =
    ["allocated", "partially_used", "fully_used", "returned", "lost"];

/// Stock still held by allocations that are not finished
const RESERVED_QTY: &str = "COALESCE((SELECT SUM(a.quantity_allocated - a.quantity_used) \
     FROM material_allocations a \
     WHERE a.material_id = m.id AND a.status IN ('allocated', 'partially_used')), 0) AS reserved_qty";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Material {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub unit_price_eur: f64,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub current_stock: f64,
    pub min_stock_threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MaterialStock {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub material: Material,
    pub reserved_qty: f64,
}

impl MaterialStock {
    pub fn to_json(&self) -> Value {
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "available_qty".into(),
                json!((self.material.current_stock - self.reserved_qty).max(0.0)),
            );
            map.insert(
                "is_low_stock".into(),
                json!(self.material.current_stock <= self.material.min_stock_threshold),
            );
        }
        value
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MaterialFilter {
    pub category: Option<String>,
    pub unit: Option<String>,
    pub supplier_name: Option<String>,
    pub search: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NewMaterial {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub unit_price_eur: Option<f64>,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub current_stock: Option<f64>,
    pub min_stock_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaterialUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub unit_price_eur: Option<f64>,
    pub supplier_name: Option<String>,
    pub description: Option<String>,
    pub min_stock_threshold: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub quantity: Option<f64>,
    pub reason: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

/// Outcome of applying a signed quantity to the stock level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdjustmentResult {
    pub previous_stock: f64,
    pub adjustment: f64,
    pub new_stock: f64,
}

impl AdjustmentResult {
    /// Stock never drops below zero
    pub fn apply(previous_stock: f64, adjustment: f64) -> Self {
        Self {
            previous_stock,
            adjustment,
            new_stock: (previous_stock + adjustment).max(0.0),
        }
    }

    pub fn transaction_type(&self) -> &'static str {
        if self.adjustment > 0.0 {
            "adjustment_in"
        } else {
            "adjustment_out"
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MaterialTransaction {
    pub id: Uuid,
    pub material_id: Uuid,
    pub transaction_type: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub material_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionFilter {
    pub material_id: Option<Uuid>,
    pub transaction_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Allocation {
    pub id: Uuid,
    pub project_id: Uuid,
    pub material_id: Uuid,
    pub quantity_allocated: f64,
    pub quantity_used: f64,
    pub allocated_date: NaiveDate,
    pub allocated_by: Option<Uuid>,
    pub status: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_name: Option<String>,
    pub material_name: Option<String>,
    pub unit: Option<String>,
    pub unit_price_eur: Option<f64>,
}

impl Allocation {
    pub fn total_value(&self) -> f64 {
        self.quantity_allocated * self.unit_price_eur.unwrap_or(0.0)
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "quantity_remaining".into(),
                json!(self.quantity_allocated - self.quantity_used),
            );
            map.insert("total_value".into(), json!(self.total_value()));
        }
        value
    }
}

/// Aggregate over a listed page of allocations
pub fn allocation_summary(total: i64, allocations: &[Allocation]) -> Value {
    let total_value: f64 = allocations.iter().map(Allocation::total_value).sum();
    let allocated: f64 = allocations.iter().map(|a| a.quantity_allocated).sum();
    let used: f64 = allocations.iter().map(|a| a.quantity_used).sum();
    let utilization_rate = if allocated > 0.0 {
        (used / allocated * 10000.0).round() / 100.0
    } else {
        0.0
    };

    let status_counts: serde_json::Map<String, Value> = ALLOCATION_STATUSES
        .iter()
        .map(|status| {
            let n = allocations.iter().filter(|a| a.status == *status).count();
            (status.to_string(), json!(n))
        })
        .collect();

    json!({
        "total_allocations": total,
        "total_value": total_value,
        "total_quantity_allocated": allocated,
        "total_quantity_used": used,
        "utilization_rate": utilization_rate,
        "status_counts": status_counts,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AllocationFilter {
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewAllocation {
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub quantity_allocated: Option<f64>,
    pub allocated_by: Option<Uuid>,
    pub allocated_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllocationUpdate {
    pub quantity_used: Option<f64>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Status implied by how much of an allocation is used
pub fn usage_status(used: f64, allocated: f64) -> &'static str {
    if used <= 0.0 {
        "allocated"
    } else if used >= allocated {
        "fully_used"
    } else {
        "partially_used"
    }
}

impl AllocationUpdate {
    /// New `(quantity_used, status)` for an allocation, or why the update is invalid
    ///
    /// A new quantity without an explicit status re-derives the status.
    pub fn resolve(&self, current: &Allocation) -> Result<(f64, String), String> {
        let used = self.quantity_used.unwrap_or(current.quantity_used);
        if !used.is_finite() || used < 0.0 {
            return Err("quantity_used must be zero or greater".to_string());
        }
        if used > current.quantity_allocated {
            return Err(format!(
                "quantity_used cannot exceed allocated quantity ({})",
                current.quantity_allocated
            ));
        }
        let status = match (&self.status, self.quantity_used) {
            (Some(status), _) => status.clone(),
            (None, Some(_)) => usage_status(used, current.quantity_allocated).to_string(),
            (None, None) => current.status.clone(),
        };
        Ok((used, status))
    }
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub allocation_id: Option<Uuid>,
    pub consumed_qty: Option<f64>,
    pub work_entry_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Quantities after drawing `qty` from an allocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsumptionPlan {
    pub quantity_used: f64,
    pub quantity_remaining: f64,
    pub status: &'static str,
}

impl ConsumptionPlan {
    /// `Err(remaining)` when the allocation cannot cover `qty`
    pub fn new(allocated: f64, used: f64, qty: f64) -> Result<Self, f64> {
        let remaining = allocated - used;
        if qty > remaining {
            return Err(remaining);
        }
        let quantity_used = used + qty;
        let quantity_remaining = allocated - quantity_used;
        let status = if quantity_remaining <= 0.0 {
            "fully_used"
        } else {
            "partially_used"
        };
        Ok(Self {
            quantity_used,
            quantity_remaining,
            status,
        })
    }
}

/// Everything a consumption touched
#[derive(Debug, Clone, Serialize)]
pub struct Consumption {
    pub allocation: Allocation,
    pub transaction: MaterialTransaction,
    pub material: Material,
    pub previous_stock: f64,
    pub quantity: f64,
    pub work_entry_id: Option<Uuid>,
}

impl Consumption {
    pub fn to_json(&self) -> Value {
        json!({
            "allocation": self.allocation.to_json(),
            "transaction": self.transaction,
            "material": {
                "id": self.material.id,
                "name": self.material.name,
                "previous_stock": self.previous_stock,
                "new_stock": self.material.current_stock,
            },
            "consumption": {
                "quantity": self.quantity,
                "unit": self.material.unit,
                "value": self.quantity * self.material.unit_price_eur,
                "work_entry_id": self.work_entry_id,
            },
        })
    }
}

#[derive(Debug)]
pub enum ConsumeOutcome {
    Consumed(Box<Consumption>),
    /// Requested more than the allocation still holds
    Insufficient { remaining: f64, unit: String },
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MaterialOrder {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub material_id: Uuid,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    pub status: String,
    pub supplier: Option<String>,
    pub order_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub material_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewOrder {
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub status: Option<String>,
    pub supplier: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderUpdate {
    pub status: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

const ALLOCATION_SELECT: &str = "SELECT a.*, p.name AS project_name, m.name AS material_name, \
        m.unit, m.unit_price_eur \
     FROM material_allocations a \
     LEFT JOIN projects p ON p.id = a.project_id \
     LEFT JOIN materials m ON m.id = a.material_id";

#[derive(Debug, Clone)]
pub struct MaterialStore {
    pool: PgPool,
}

impl MaterialStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &MaterialFilter) {
        builder.push(" WHERE 1=1");
        if !filter.include_inactive.unwrap_or(false) {
            builder.push(" AND m.is_active");
        }
        if let Some(category) = &filter.category {
            builder.push(" AND m.category = ").push_bind(category.clone());
        }
        if let Some(unit) = &filter.unit {
            builder.push(" AND m.unit = ").push_bind(unit.clone());
        }
        if let Some(supplier) = &filter.supplier_name {
            builder
                .push(" AND m.supplier_name ILIKE ")
                .push_bind(format!("%{}%", supplier));
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (m.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR m.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &MaterialFilter, page: Page) -> Result<(Vec<MaterialStock>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM materials m");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT m.*, {} FROM materials m", RESERVED_QTY));
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY m.name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let materials = select.build_query_as::<MaterialStock>().fetch_all(&self.pool).await?;

        Ok((materials, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<MaterialStock> {
        let material = sqlx::query_as::<_, MaterialStock>(&format!(
            "SELECT m.*, {} FROM materials m WHERE m.id = $1",
            RESERVED_QTY
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(material)
    }

    pub async fn create(&self, name: &str, material: &NewMaterial) -> Result<Material> {
        let created = sqlx::query_as::<_, Material>(
            "INSERT INTO materials (name, category, unit, unit_price_eur, supplier_name, description, \
                current_stock, min_stock_threshold) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(name)
        .bind(&material.category)
        .bind(material.unit.as_deref().unwrap_or("pcs"))
        .bind(material.unit_price_eur.unwrap_or(0.0))
        .bind(&material.supplier_name)
        .bind(&material.description)
        .bind(material.current_stock.unwrap_or(0.0))
        .bind(material.min_stock_threshold.unwrap_or(0.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, update: MaterialUpdate) -> Result<Option<Material>> {
        let mut changes = Changes::new("materials");
        changes
            .set("name", update.name)
            .set("category", update.category)
            .set("unit", update.unit)
            .set("unit_price_eur", update.unit_price_eur)
            .set("supplier_name", update.supplier_name)
            .set("description", update.description)
            .set("min_stock_threshold", update.min_stock_threshold)
            .set("is_active", update.is_active);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let material = query.build_query_as::<Material>().fetch_one(&self.pool).await?;
        Ok(Some(material))
    }

    /// Soft delete keeps the transaction history intact
    pub async fn deactivate(&self, id: Uuid) -> Result<Material> {
        let material = sqlx::query_as::<_, Material>(
            "UPDATE materials SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(material)
    }

    /// Apply a signed quantity and log the movement in one transaction
    pub async fn adjust_stock(
        &self,
        id: Uuid,
        quantity: f64,
        reason: &str,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
    ) -> Result<(Material, AdjustmentResult)> {
        let mut tx = self.pool.begin().await?;

        let (current_stock, unit_price): (f64, f64) = sqlx::query_as(
            "SELECT current_stock, unit_price_eur FROM materials WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let result = AdjustmentResult::apply(current_stock, quantity);

        let material = sqlx::query_as::<_, Material>(
            "UPDATE materials SET current_stock = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(result.new_stock)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO material_transactions \
                (material_id, transaction_type, quantity, unit_price, total_price, reference_type, reference_id, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(result.transaction_type())
        .bind(quantity.abs())
        .bind(unit_price)
        .bind(quantity.abs() * unit_price)
        .bind(reference_type.unwrap_or("manual_adjustment"))
        .bind(reference_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((material, result))
    }

    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
        page: Page,
    ) -> Result<(Vec<MaterialTransaction>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
            builder.push(" WHERE 1=1");
            if let Some(material_id) = filter.material_id {
                builder.push(" AND t.material_id = ").push_bind(material_id);
            }
            if let Some(kind) = &filter.transaction_type {
                builder.push(" AND t.transaction_type = ").push_bind(kind.clone());
            }
        }

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM material_transactions t");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(
            "SELECT t.*, m.name AS material_name FROM material_transactions t \
             LEFT JOIN materials m ON m.id = t.material_id",
        );
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY t.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<MaterialTransaction>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    pub async fn allocations(
        &self,
        filter: &AllocationFilter,
        page: Page,
    ) -> Result<(Vec<Allocation>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &AllocationFilter) {
            builder.push(" WHERE 1=1");
            if let Some(project_id) = filter.project_id {
                builder.push(" AND a.project_id = ").push_bind(project_id);
            }
            if let Some(material_id) = filter.material_id {
                builder.push(" AND a.material_id = ").push_bind(material_id);
            }
            if let Some(status) = &filter.status {
                builder.push(" AND a.status = ").push_bind(status.clone());
            }
        }

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM material_allocations a");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(ALLOCATION_SELECT);
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY a.allocated_date DESC, a.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build_query_as::<Allocation>().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    pub async fn create_allocation(
        &self,
        project_id: Uuid,
        material_id: Uuid,
        quantity: f64,
        allocation: &NewAllocation,
        caller: Uuid,
    ) -> Result<Allocation> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO material_allocations \
                (project_id, material_id, quantity_allocated, allocated_date, allocated_by, status, notes) \
             VALUES ($1, $2, $3, COALESCE($4, CURRENT_DATE), $5, $6, $7) RETURNING id",
        )
        .bind(project_id)
        .bind(material_id)
        .bind(quantity)
        .bind(allocation.allocated_date)
        .bind(allocation.allocated_by.unwrap_or(caller))
        .bind(allocation.status.as_deref().unwrap_or("allocated"))
        .bind(allocation.notes.as_deref().unwrap_or(""))
        .fetch_one(&self.pool)
        .await?;

        let created = sqlx::query_as::<_, Allocation>(&format!("{} WHERE a.id = $1", ALLOCATION_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    pub async fn allocation(&self, id: Uuid) -> Result<Allocation> {
        let allocation = sqlx::query_as::<_, Allocation>(&format!("{} WHERE a.id = $1", ALLOCATION_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(allocation)
    }

    pub async fn update_allocation(
        &self,
        id: Uuid,
        quantity_used: f64,
        status: &str,
        notes: Option<&str>,
    ) -> Result<Allocation> {
        sqlx::query_scalar::<_, Uuid>(
            "UPDATE material_allocations \
             SET quantity_used = $2, status = $3, notes = COALESCE($4, notes), updated_at = NOW() \
             WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .bind(quantity_used)
        .bind(status)
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;
        self.allocation(id).await
    }

    /// Delete an allocation; any unused quantity is logged as returned
    ///
    /// Returns the deleted row and the quantity handed back.
    pub async fn delete_allocation(&self, id: Uuid) -> Result<(Allocation, f64)> {
        let mut tx = self.pool.begin().await?;

        let allocation = sqlx::query_as::<_, Allocation>(&format!(
            "{} WHERE a.id = $1 FOR UPDATE OF a",
            ALLOCATION_SELECT
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let remaining = (allocation.quantity_allocated - allocation.quantity_used).max(0.0);
        if remaining > 0.0 {
            let unit_price = allocation.unit_price_eur.unwrap_or(0.0);
            sqlx::query(
                "INSERT INTO material_transactions \
                    (material_id, transaction_type, quantity, unit_price, total_price, reference_type, reference_id, notes) \
                 VALUES ($1, 'return', $2, $3, $4, 'allocation_deletion', $5, $6)",
            )
            .bind(allocation.material_id)
            .bind(remaining)
            .bind(unit_price)
            .bind(remaining * unit_price)
            .bind(id.to_string())
            .bind(format!(
                "Returned from deleted allocation ({})",
                allocation.project_name.as_deref().unwrap_or("unknown project")
            ))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM material_allocations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((allocation, remaining))
    }

    /// Draw from an allocation: usage, stock and the issue transaction move together
    pub async fn consume(
        &self,
        allocation_id: Uuid,
        qty: f64,
        work_entry_id: Option<Uuid>,
        notes: Option<&str>,
    ) -> Result<ConsumeOutcome> {
        let mut tx = self.pool.begin().await?;

        let allocation = sqlx::query_as::<_, Allocation>(&format!(
            "{} WHERE a.id = $1 FOR UPDATE OF a",
            ALLOCATION_SELECT
        ))
        .bind(allocation_id)
        .fetch_one(&mut *tx)
        .await?;

        let plan = match ConsumptionPlan::new(allocation.quantity_allocated, allocation.quantity_used, qty) {
            Ok(plan) => plan,
            Err(remaining) => {
                return Ok(ConsumeOutcome::Insufficient {
                    remaining,
                    unit: allocation.unit.unwrap_or_default(),
                })
            }
        };

        sqlx::query(
            "UPDATE material_allocations SET quantity_used = $2, status = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(allocation_id)
        .bind(plan.quantity_used)
        .bind(plan.status)
        .execute(&mut *tx)
        .await?;

        let previous_stock: f64 =
            sqlx::query_scalar("SELECT current_stock FROM materials WHERE id = $1 FOR UPDATE")
                .bind(allocation.material_id)
                .fetch_one(&mut *tx)
                .await?;
        let stock = AdjustmentResult::apply(previous_stock, -qty);

        let material = sqlx::query_as::<_, Material>(
            "UPDATE materials SET current_stock = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(allocation.material_id)
        .bind(stock.new_stock)
        .fetch_one(&mut *tx)
        .await?;

        let (reference_type, reference_id) = match work_entry_id {
            Some(entry) => ("work_entry", entry.to_string()),
            None => ("allocation", allocation_id.to_string()),
        };
        let unit_price = material.unit_price_eur;
        let transaction = sqlx::query_as::<_, MaterialTransaction>(
            "INSERT INTO material_transactions \
                (material_id, transaction_type, quantity, unit_price, total_price, reference_type, reference_id, notes) \
             VALUES ($1, 'issue', $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(material.id)
        .bind(qty)
        .bind(unit_price)
        .bind(qty * unit_price)
        .bind(reference_type)
        .bind(reference_id)
        .bind(notes.map(str::to_string).unwrap_or_else(|| {
            format!("Consumed for project {}", allocation.project_name.as_deref().unwrap_or(""))
        }))
        .fetch_one(&mut *tx)
        .await?;

        let allocation = sqlx::query_as::<_, Allocation>(&format!("{} WHERE a.id = $1", ALLOCATION_SELECT))
            .bind(allocation_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ConsumeOutcome::Consumed(Box::new(Consumption {
            allocation,
            transaction,
            material,
            previous_stock,
            quantity: qty,
            work_entry_id,
        })))
    }

    pub async fn orders(&self, filter: &OrderFilter, page: Page) -> Result<(Vec<MaterialOrder>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
            builder.push(" WHERE 1=1");
            if let Some(project_id) = filter.project_id {
                builder.push(" AND o.project_id = ").push_bind(project_id);
            }
            if let Some(material_id) = filter.material_id {
                builder.push(" AND o.material_id = ").push_bind(material_id);
            }
            if let Some(status) = &filter.status {
                builder.push(" AND o.status = ").push_bind(status.clone());
            }
        }

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM material_orders o");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(
            "SELECT o.*, m.name AS material_name FROM material_orders o \
             LEFT JOIN materials m ON m.id = o.material_id",
        );
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY o.order_date DESC, o.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build_query_as::<MaterialOrder>().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    pub async fn create_order(&self, material_id: Uuid, quantity: f64, order: &NewOrder) -> Result<MaterialOrder> {
        let unit_price = order.unit_price.unwrap_or(0.0);
        let created = sqlx::query_as::<_, MaterialOrder>(
            "INSERT INTO material_orders (project_id, material_id, quantity, unit_price, total_price, \
                status, supplier, order_date, expected_delivery_date, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, CURRENT_DATE), $9, $10) RETURNING *",
        )
        .bind(order.project_id)
        .bind(material_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(quantity * unit_price)
        .bind(order.status.as_deref().unwrap_or("pending"))
        .bind(&order.supplier)
        .bind(order.order_date)
        .bind(order.expected_delivery_date)
        .bind(&order.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Update an order; the first move to `delivered` books the quantity into stock
    pub async fn update_order(&self, id: Uuid, update: OrderUpdate) -> Result<Option<MaterialOrder>> {
        let mut tx = self.pool.begin().await?;

        let (previous_status, material_id, quantity, unit_price): (String, Uuid, f64, f64) =
            sqlx::query_as(
                "SELECT status, material_id, quantity, unit_price FROM material_orders \
                 WHERE id = $1 FOR UPDATE",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let delivering =
            update.status.as_deref() == Some("delivered") && previous_status != "delivered";
        let delivery_date = match (update.actual_delivery_date, delivering) {
            (Some(date), _) => Some(date),
            (None, true) => Some(Utc::now().date_naive()),
            (None, false) => None,
        };

        let mut changes = Changes::new("material_orders");
        changes
            .set("status", update.status)
            .set("expected_delivery_date", update.expected_delivery_date)
            .set("actual_delivery_date", delivery_date)
            .set("notes", update.notes);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "*");
        let order = query.build_query_as::<MaterialOrder>().fetch_one(&mut *tx).await?;

        if delivering {
            sqlx::query(
                "UPDATE materials SET current_stock = current_stock + $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(material_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO material_transactions \
                    (material_id, transaction_type, quantity, unit_price, total_price, reference_type, reference_id, notes) \
                 VALUES ($1, 'receipt', $2, $3, $4, 'material_order', $5, 'Order delivered')",
            )
            .bind(material_id)
            .bind(quantity)
            .bind(unit_price)
            .bind(quantity * unit_price)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

            tracing::info!("📦 Order {} delivered, stock of {} +{}", id, material_id, quantity);
        }

        tx.commit().await?;
        Ok(Some(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocation(status: &str, allocated: f64, used: f64, price: f64) -> Allocation {
        Allocation {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            quantity_allocated: allocated,
            quantity_used: used,
            allocated_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            allocated_by: None,
            status: status.into(),
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            project_name: None,
            material_name: Some("Speedpipe 12x2".into()),
            unit: Some("m".into()),
            unit_price_eur: Some(price),
        }
    }

    #[test]
    fn positive_adjustment_adds_stock() {
        let result = AdjustmentResult::apply(10.0, 5.0);
        assert_eq!(result.new_stock, 15.0);
        assert_eq!(result.transaction_type(), "adjustment_in");
    }

    #[test]
    fn stock_is_clamped_at_zero() {
        let result = AdjustmentResult::apply(3.0, -10.0);
        assert_eq!(result.new_stock, 0.0);
        assert_eq!(result.previous_stock, 3.0);
        assert_eq!(result.transaction_type(), "adjustment_out");
    }

    #[test]
    fn allocation_summary_totals_value_and_utilization() {
        let rows = vec![
            allocation("allocated", 100.0, 0.0, 2.0),
            allocation("partially_used", 50.0, 25.0, 4.0),
            allocation("fully_used", 50.0, 50.0, 1.0),
        ];
        let summary = allocation_summary(3, &rows);
        assert_eq!(summary["total_value"], 450.0);
        assert_eq!(summary["total_quantity_allocated"], 200.0);
        assert_eq!(summary["utilization_rate"], 37.5);
        assert_eq!(summary["status_counts"]["partially_used"], 1);
        assert_eq!(summary["status_counts"]["lost"], 0);
    }

    #[test]
    fn usage_decides_allocation_status() {
        assert_eq!(usage_status(0.0, 100.0), "allocated");
        assert_eq!(usage_status(40.0, 100.0), "partially_used");
        assert_eq!(usage_status(100.0, 100.0), "fully_used");
    }

    #[test]
    fn allocation_update_rederives_status_from_quantity() {
        let current = allocation("allocated", 100.0, 0.0, 2.0);
        let update = AllocationUpdate {
            quantity_used: Some(100.0),
            ..Default::default()
        };
        assert_eq!(update.resolve(&current), Ok((100.0, "fully_used".to_string())));

        let explicit = AllocationUpdate {
            quantity_used: Some(10.0),
            status: Some("lost".into()),
            notes: None,
        };
        assert_eq!(explicit.resolve(&current), Ok((10.0, "lost".to_string())));

        let notes_only = AllocationUpdate {
            notes: Some("Rest liegt im Lager".into()),
            ..Default::default()
        };
        assert_eq!(notes_only.resolve(&current), Ok((0.0, "allocated".to_string())));
    }

    #[test]
    fn allocation_update_rejects_impossible_quantities() {
        let current = allocation("allocated", 50.0, 0.0, 2.0);
        let over = AllocationUpdate {
            quantity_used: Some(50.5),
            ..Default::default()
        };
        assert!(over.resolve(&current).unwrap_err().contains("cannot exceed"));

        let negative = AllocationUpdate {
            quantity_used: Some(-1.0),
            ..Default::default()
        };
        assert!(negative.resolve(&current).is_err());
    }

    #[test]
    fn consumption_cannot_exceed_remaining() {
        assert_eq!(ConsumptionPlan::new(100.0, 80.0, 30.0), Err(20.0));

        let partial = ConsumptionPlan::new(100.0, 20.0, 30.0).unwrap();
        assert_eq!(partial.quantity_used, 50.0);
        assert_eq!(partial.quantity_remaining, 50.0);
        assert_eq!(partial.status, "partially_used");

        let last = ConsumptionPlan::new(100.0, 80.0, 20.0).unwrap();
        assert_eq!(last.quantity_remaining, 0.0);
        assert_eq!(last.status, "fully_used");
    }

    #[test]
    fn allocation_json_has_remaining_quantity() {
        let body = allocation("partially_used", 50.0, 20.0, 3.0).to_json();
        assert_eq!(body["quantity_remaining"], 30.0);
        assert_eq!(body["total_value"], 150.0);
    }
}
