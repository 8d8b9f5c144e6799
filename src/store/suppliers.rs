//! Suppliers, their contacts and the materials they sell

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub short_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub payment_terms: Option<String>,
    pub rating: Option<i32>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub materials_count: Option<i64>,
}

impl Supplier {
    /// Row plus `org_name` and `materials_count` as the dashboard expects
    pub fn to_json(&self) -> Value {
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert("org_name".into(), json!(self.name));
            map.insert("materials_count".into(), json!(self.materials_count.unwrap_or(0)));
        }
        value
    }
}

/// `local@domain.tld` without whitespace
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Checks shared by create and update
pub fn check_supplier_fields(email: Option<&str>, rating: Option<i32>) -> Result<(), String> {
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        if !is_valid_email(email) {
            return Err("Invalid email format".to_string());
        }
    }
    if let Some(rating) = rating {
        if !(1..=5).contains(&rating) {
            return Err("Rating must be between 1 and 5".to_string());
        }
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct SupplierFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub rating: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct NewSupplier {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub payment_terms: Option<String>,
    pub rating: Option<i32>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SupplierUpdate {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub payment_terms: Option<String>,
    pub rating: Option<i32>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupplierContact {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub contact_name: String,
    pub position: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_primary: bool,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewSupplierContact {
    pub contact_name: Option<String>,
    /// Older clients send `name`
    pub name: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_primary: Option<bool>,
    pub notes: Option<String>,
}

impl NewSupplierContact {
    pub fn display_name(&self) -> Option<&str> {
        self.contact_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Catalogue entry of a supplier joined with the material it points to
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupplierMaterial {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub material_id: Uuid,
    pub supplier_part_number: Option<String>,
    pub unit_price: f64,
    pub minimum_order_qty: f64,
    pub lead_time_days: Option<i32>,
    pub is_preferred: bool,
    pub last_price_update: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub material_name: Option<String>,
    pub material_category: Option<String>,
    pub material_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewSupplierMaterial {
    pub material_id: Option<Uuid>,
    /// Creates a catalogue material when no `material_id` is given
    pub material_name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub supplier_part_number: Option<String>,
    pub unit_price: Option<f64>,
    pub minimum_order_qty: Option<f64>,
    pub lead_time_days: Option<i32>,
    pub is_preferred: Option<bool>,
    pub notes: Option<String>,
}

/// Where the catalogue entry's material comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialSource<'a> {
    Existing(Uuid),
    New { name: &'a str, unit: &'a str },
}

impl NewSupplierMaterial {
    /// Validate the body; returns the material source, unit price and minimum order quantity
    pub fn validate(&self) -> Result<(MaterialSource<'_>, f64, f64), String> {
        let name = self.material_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let source = match (self.material_id, name) {
            (Some(id), _) => MaterialSource::Existing(id),
            (None, Some(name)) => {
                let unit = self
                    .unit
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .ok_or("Unit is required when creating new material")?;
                MaterialSource::New { name, unit }
            }
            (None, None) => return Err("Either material ID or material name is required".to_string()),
        };
        let unit_price = self
            .unit_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or("Unit price must be positive")?;
        let minimum_order_qty = self.minimum_order_qty.unwrap_or(1.0);
        if !(minimum_order_qty.is_finite() && minimum_order_qty > 0.0) {
            return Err("Minimum order quantity must be positive".to_string());
        }
        Ok((source, unit_price, minimum_order_qty))
    }
}

const SUPPLIER_SELECT: &str = "SELECT s.*, \
        (SELECT COUNT(*) FROM supplier_materials sm WHERE sm.supplier_id = s.id) AS materials_count \
     FROM suppliers s";

const SUPPLIER_MATERIAL_SELECT: &str = "SELECT sm.*, m.name AS material_name, \
        m.category AS material_category, m.unit AS material_unit \
     FROM supplier_materials sm \
     LEFT JOIN materials m ON m.id = sm.material_id";

#[derive(Debug, Clone)]
pub struct SupplierStore {
    pool: PgPool,
}

impl SupplierStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &SupplierFilter) {
        builder.push(" WHERE 1=1");
        if let Some(active) = filter.is_active {
            builder.push(" AND s.is_active = ").push_bind(active);
        }
        if let Some(rating) = filter.rating {
            builder.push(" AND s.rating = ").push_bind(rating);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (s.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR s.short_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR s.contact_person ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR s.email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &SupplierFilter, page: Page) -> Result<(Vec<Supplier>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM suppliers s");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(SUPPLIER_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY s.name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let suppliers = select.build_query_as::<Supplier>().fetch_all(&self.pool).await?;

        Ok((suppliers, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<Supplier> {
        let supplier = sqlx::query_as::<_, Supplier>(&format!("{} WHERE s.id = $1", SUPPLIER_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(supplier)
    }

    pub async fn create(&self, name: &str, supplier: &NewSupplier) -> Result<Supplier> {
        let created = sqlx::query_as::<_, Supplier>(
            "INSERT INTO suppliers (name, short_name, contact_person, email, phone, address, \
                tax_number, payment_terms, rating, is_active, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(name)
        .bind(&supplier.short_name)
        .bind(&supplier.contact_person)
        .bind(supplier.email.as_deref().filter(|e| !e.is_empty()))
        .bind(&supplier.phone)
        .bind(&supplier.address)
        .bind(&supplier.tax_number)
        .bind(&supplier.payment_terms)
        .bind(supplier.rating)
        .bind(supplier.is_active.unwrap_or(true))
        .bind(&supplier.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, update: SupplierUpdate) -> Result<Option<Supplier>> {
        let mut changes = Changes::new("suppliers");
        changes
            .set("name", update.name)
            .set("short_name", update.short_name)
            .set("contact_person", update.contact_person)
            .set("email", update.email)
            .set("phone", update.phone)
            .set("address", update.address)
            .set("tax_number", update.tax_number)
            .set("payment_terms", update.payment_terms)
            .set("rating", update.rating)
            .set("is_active", update.is_active)
            .set("notes", update.notes);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, "id");
        query.build_query_scalar::<Uuid>().fetch_one(&self.pool).await?;
        self.get(id).await.map(Some)
    }

    /// Hard delete; contacts and catalogue entries cascade
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>("DELETE FROM suppliers WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    pub async fn contacts(&self, supplier_id: Uuid) -> Result<Vec<SupplierContact>> {
        let contacts = sqlx::query_as::<_, SupplierContact>(
            "SELECT * FROM supplier_contacts WHERE supplier_id = $1 AND is_active \
             ORDER BY is_primary DESC, contact_name",
        )
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    /// Add a contact; a new primary contact demotes the previous one
    pub async fn add_contact(
        &self,
        supplier_id: Uuid,
        contact_name: &str,
        contact: &NewSupplierContact,
    ) -> Result<SupplierContact> {
        let mut tx = self.pool.begin().await?;
        let is_primary = contact.is_primary.unwrap_or(false);

        if is_primary {
            sqlx::query(
                "UPDATE supplier_contacts SET is_primary = FALSE, updated_at = NOW() \
                 WHERE supplier_id = $1 AND is_primary",
            )
            .bind(supplier_id)
            .execute(&mut *tx)
            .await?;
        }

        let created = sqlx::query_as::<_, SupplierContact>(
            "INSERT INTO supplier_contacts \
                (supplier_id, contact_name, position, department, phone, email, is_primary, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(supplier_id)
        .bind(contact_name)
        .bind(&contact.position)
        .bind(&contact.department)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(is_primary)
        .bind(&contact.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    pub async fn materials(&self, supplier_id: Uuid) -> Result<Vec<SupplierMaterial>> {
        let rows = sqlx::query_as::<_, SupplierMaterial>(&format!(
            "{} WHERE sm.supplier_id = $1 ORDER BY sm.created_at DESC",
            SUPPLIER_MATERIAL_SELECT
        ))
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Link a material to the supplier, creating the material first when asked to
    ///
    /// A supplier lists each material once; a second link is a unique violation.
    pub async fn add_material(
        &self,
        supplier_id: Uuid,
        source: &MaterialSource<'_>,
        unit_price: f64,
        minimum_order_qty: f64,
        entry: &NewSupplierMaterial,
    ) -> Result<SupplierMaterial> {
        let mut tx = self.pool.begin().await?;

        let material_id = match source {
            MaterialSource::Existing(id) => *id,
            MaterialSource::New { name, unit } => {
                sqlx::query_scalar::<_, Uuid>(
                    "INSERT INTO materials (name, category, unit, unit_price_eur) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .bind(*name)
                .bind(&entry.category)
                .bind(*unit)
                .bind(unit_price)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO supplier_materials (supplier_id, material_id, supplier_part_number, unit_price, \
                minimum_order_qty, lead_time_days, is_preferred, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(supplier_id)
        .bind(material_id)
        .bind(&entry.supplier_part_number)
        .bind(unit_price)
        .bind(minimum_order_qty)
        .bind(entry.lead_time_days)
        .bind(entry.is_preferred.unwrap_or(false))
        .bind(&entry.notes)
        .fetch_one(&mut *tx)
        .await?;

        let created = sqlx::query_as::<_, SupplierMaterial>(&format!(
            "{} WHERE sm.id = $1",
            SUPPLIER_MATERIAL_SELECT
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> NewSupplierMaterial {
        NewSupplierMaterial {
            material_id: None,
            material_name: None,
            category: None,
            unit: None,
            supplier_part_number: None,
            unit_price: Some(2.4),
            minimum_order_qty: None,
            lead_time_days: None,
            is_preferred: None,
            notes: None,
        }
    }

    #[test]
    fn email_needs_local_part_and_dotted_domain() {
        assert!(is_valid_email("einkauf@kabelwerk.de"));
        assert!(!is_valid_email("einkauf@kabelwerk"));
        assert!(!is_valid_email("@kabelwerk.de"));
        assert!(!is_valid_email("ein kauf@kabelwerk.de"));
        assert!(!is_valid_email("a@b@c.de"));
    }

    #[test]
    fn supplier_fields_check_email_and_rating() {
        assert!(check_supplier_fields(Some("info@tiefbau.de"), Some(5)).is_ok());
        assert!(check_supplier_fields(Some(""), None).is_ok());
        assert_eq!(
            check_supplier_fields(Some("nope"), None),
            Err("Invalid email format".to_string())
        );
        assert_eq!(
            check_supplier_fields(None, Some(6)),
            Err("Rating must be between 1 and 5".to_string())
        );
    }

    #[test]
    fn contact_name_falls_back_to_name() {
        let contact = NewSupplierContact {
            contact_name: None,
            name: Some(" Petra Lang ".into()),
            position: None,
            department: None,
            phone: None,
            email: None,
            is_primary: None,
            notes: None,
        };
        assert_eq!(contact.display_name(), Some("Petra Lang"));
    }

    #[test]
    fn catalogue_entry_needs_a_material() {
        assert_eq!(
            entry().validate().unwrap_err(),
            "Either material ID or material name is required"
        );

        let mut named = entry();
        named.material_name = Some("Mikrorohr 10x1".into());
        assert_eq!(
            named.validate().unwrap_err(),
            "Unit is required when creating new material"
        );
        named.unit = Some("m".into());
        let (source, price, min_qty) = named.validate().unwrap();
        assert_eq!(source, MaterialSource::New { name: "Mikrorohr 10x1", unit: "m" });
        assert_eq!((price, min_qty), (2.4, 1.0));
    }

    #[test]
    fn catalogue_prices_must_be_positive() {
        let mut existing = entry();
        existing.material_id = Some(Uuid::new_v4());
        existing.unit_price = Some(0.0);
        assert_eq!(existing.validate().unwrap_err(), "Unit price must be positive");

        existing.unit_price = Some(1.0);
        existing.minimum_order_qty = Some(-5.0);
        assert_eq!(
            existing.validate().unwrap_err(),
            "Minimum order quantity must be positive"
        );
    }

    #[test]
    fn supplier_json_carries_org_name() {
        let supplier = Supplier {
            id: Uuid::new_v4(),
            name: "Kabelwerk Süd GmbH".into(),
            short_name: Some("KWS".into()),
            contact_person: None,
            email: None,
            phone: None,
            address: None,
            tax_number: None,
            payment_terms: None,
            rating: Some(4),
            notes: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            materials_count: None,
        };
        let body = supplier.to_json();
        assert_eq!(body["org_name"], "Kabelwerk Süd GmbH");
        assert_eq!(body["materials_count"], 0);
    }
}
