//! Schema bootstrap
//!
//! Production runs against a managed Supabase database whose schema is owned
//! by migrations outside this service. For local development and CI the same
//! tables are created here with `IF NOT EXISTS`, together with the readiness
//! function the readiness endpoint calls.

use anyhow::Result;
use sqlx::PgPool;

const TABLES: &[&str] = &[
    r#"CREATE EXTENSION IF NOT EXISTS pgcrypto"#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        email TEXT UNIQUE,
        phone TEXT UNIQUE,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        role TEXT NOT NULL DEFAULT 'worker'
            CHECK (role IN ('admin', 'pm', 'foreman', 'crew', 'worker', 'viewer')),
        pin_code TEXT,
        skills JSONB NOT NULL DEFAULT '[]'::jsonb,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        language_preference TEXT NOT NULL DEFAULT 'de',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (email IS NOT NULL OR phone IS NOT NULL)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        customer TEXT,
        city TEXT,
        address TEXT,
        contact_24h TEXT,
        start_date DATE,
        end_date_plan DATE,
        status TEXT NOT NULL DEFAULT 'draft',
        total_length_m DOUBLE PRECISION NOT NULL DEFAULT 0,
        base_rate_per_m DOUBLE PRECISION NOT NULL DEFAULT 0,
        pm_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        language_default TEXT NOT NULL DEFAULT 'de',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_soil_types (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        soil_type_name TEXT NOT NULL,
        price_per_meter DOUBLE PRECISION NOT NULL DEFAULT 0,
        quantity_meters DOUBLE PRECISION NOT NULL DEFAULT 0,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_checklist_items (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL,
        required BOOLEAN NOT NULL DEFAULT FALSE,
        completed BOOLEAN NOT NULL DEFAULT FALSE,
        completed_date TIMESTAMPTZ,
        action_required TEXT,
        order_index INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_readiness_cache (
        project_id UUID PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
        readiness JSONB NOT NULL,
        overall_readiness DOUBLE PRECISION NOT NULL,
        calculated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crews (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'active',
        leader_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        project_id UUID REFERENCES projects(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crew_members (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        crew_id UUID NOT NULL REFERENCES crews(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role TEXT NOT NULL DEFAULT 'member',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (crew_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS work_entries (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES users(id),
        crew_id UUID REFERENCES crews(id) ON DELETE SET NULL,
        house_id UUID,
        date DATE NOT NULL,
        stage_code TEXT NOT NULL,
        meters_done_m DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (meters_done_m >= 0),
        method TEXT,
        width_m DOUBLE PRECISION,
        depth_m DOUBLE PRECISION,
        cables_count INTEGER,
        has_protection_pipe BOOLEAN,
        soil_type TEXT,
        approved BOOLEAN NOT NULL DEFAULT FALSE,
        approved_by UUID REFERENCES users(id),
        approved_at TIMESTAMPTZ,
        rejected_by UUID REFERENCES users(id),
        rejected_at TIMESTAMPTZ,
        rejection_reason TEXT,
        was_rejected_before BOOLEAN NOT NULL DEFAULT FALSE,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS materials (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        category TEXT,
        unit TEXT NOT NULL DEFAULT 'pcs',
        unit_price_eur DOUBLE PRECISION NOT NULL DEFAULT 0,
        supplier_name TEXT,
        description TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        current_stock DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
        min_stock_threshold DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS material_transactions (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        material_id UUID NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
        transaction_type TEXT NOT NULL,
        quantity DOUBLE PRECISION NOT NULL,
        unit_price DOUBLE PRECISION NOT NULL DEFAULT 0,
        total_price DOUBLE PRECISION NOT NULL DEFAULT 0,
        reference_type TEXT,
        reference_id TEXT,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS material_allocations (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        material_id UUID NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
        quantity_allocated DOUBLE PRECISION NOT NULL CHECK (quantity_allocated > 0),
        quantity_used DOUBLE PRECISION NOT NULL DEFAULT 0,
        allocated_date DATE NOT NULL DEFAULT CURRENT_DATE,
        allocated_by UUID REFERENCES users(id),
        status TEXT NOT NULL DEFAULT 'allocated',
        notes TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS material_orders (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID REFERENCES projects(id) ON DELETE SET NULL,
        material_id UUID NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
        quantity DOUBLE PRECISION NOT NULL CHECK (quantity > 0),
        unit_price DOUBLE PRECISION NOT NULL DEFAULT 0,
        total_price DOUBLE PRECISION NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        supplier TEXT,
        order_date DATE NOT NULL DEFAULT CURRENT_DATE,
        expected_delivery_date DATE,
        actual_delivery_date DATE,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        inventory_no TEXT UNIQUE,
        status TEXT NOT NULL DEFAULT 'available',
        rental_cost_per_day DOUBLE PRECISION,
        purchase_date DATE,
        warranty_until DATE,
        description TEXT,
        owned BOOLEAN NOT NULL DEFAULT TRUE,
        current_location TEXT,
        total_usage_hours DOUBLE PRECISION NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment_assignments (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        equipment_id UUID NOT NULL REFERENCES equipment(id) ON DELETE CASCADE,
        project_id UUID REFERENCES projects(id) ON DELETE SET NULL,
        crew_id UUID REFERENCES crews(id) ON DELETE SET NULL,
        user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        from_ts TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        to_ts TIMESTAMPTZ,
        is_permanent BOOLEAN NOT NULL DEFAULT FALSE,
        rental_cost_per_day DOUBLE PRECISION,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        brand TEXT NOT NULL DEFAULT '',
        model TEXT NOT NULL DEFAULT '',
        plate_number TEXT NOT NULL UNIQUE,
        type TEXT NOT NULL DEFAULT 'transporter',
        status TEXT NOT NULL DEFAULT 'available',
        rental_cost_per_day DOUBLE PRECISION NOT NULL DEFAULT 0,
        fuel_type TEXT NOT NULL DEFAULT 'diesel',
        year_manufactured INTEGER,
        description TEXT,
        tipper_type TEXT NOT NULL DEFAULT 'kein Kipper',
        max_weight_kg DOUBLE PRECISION,
        comment TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vehicle_assignments (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        vehicle_id UUID NOT NULL REFERENCES vehicles(id) ON DELETE CASCADE,
        project_id UUID REFERENCES projects(id) ON DELETE SET NULL,
        crew_id UUID REFERENCES crews(id) ON DELETE SET NULL,
        user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        from_ts TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        to_ts TIMESTAMPTZ,
        is_permanent BOOLEAN NOT NULL DEFAULT FALSE,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vehicle_documents (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        vehicle_id UUID NOT NULL REFERENCES vehicles(id) ON DELETE CASCADE,
        document_type TEXT NOT NULL,
        document_number TEXT,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_type TEXT,
        file_size BIGINT,
        issue_date DATE,
        expiry_date DATE,
        notes TEXT,
        uploaded_by UUID REFERENCES users(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
        filename TEXT NOT NULL,
        original_filename TEXT,
        file_type TEXT,
        file_size BIGINT,
        bucket_name TEXT NOT NULL DEFAULT 'project-documents',
        storage_path TEXT,
        document_type TEXT NOT NULL DEFAULT 'general',
        description TEXT,
        upload_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        uploaded_by UUID REFERENCES users(id) ON DELETE SET NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS in_app_notifications (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID REFERENCES users(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        notification_type TEXT NOT NULL DEFAULT 'info',
        priority TEXT NOT NULL DEFAULT 'normal',
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        read_at TIMESTAMPTZ,
        action_url TEXT,
        action_label TEXT,
        data JSONB NOT NULL DEFAULT '{}'::jsonb,
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_logs (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
        activity_type TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
        transaction_type TEXT NOT NULL,
        amount_eur DOUBLE PRECISION NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS geospatial_features (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        type TEXT NOT NULL,
        geometry JSONB NOT NULL,
        properties JSONB NOT NULL DEFAULT '{}'::jsonb,
        project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        created_by TEXT NOT NULL DEFAULT 'system',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_activation_log (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        activation_date DATE NOT NULL,
        activation_notes TEXT,
        responsible_manager TEXT NOT NULL,
        notify_stakeholders BOOLEAN NOT NULL DEFAULT FALSE,
        readiness_at_activation DOUBLE PRECISION NOT NULL,
        previous_status TEXT NOT NULL,
        new_status TEXT NOT NULL,
        activated_by UUID REFERENCES users(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_contacts (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        department TEXT,
        phone TEXT,
        email TEXT,
        position TEXT,
        notes TEXT,
        is_primary BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment_reservations (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        equipment_id UUID NOT NULL REFERENCES equipment(id) ON DELETE CASCADE,
        project_id UUID REFERENCES projects(id) ON DELETE SET NULL,
        reserved_by_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        reserved_from TIMESTAMPTZ NOT NULL,
        reserved_until TIMESTAMPTZ NOT NULL,
        notes TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (reserved_until > reserved_from)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment_maintenance_schedules (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        equipment_id UUID NOT NULL REFERENCES equipment(id) ON DELETE CASCADE,
        maintenance_type TEXT NOT NULL,
        interval_type TEXT NOT NULL CHECK (interval_type IN ('calendar', 'usage_hours', 'cycles')),
        interval_value INTEGER NOT NULL CHECK (interval_value > 0),
        last_performed_date DATE,
        last_performed_hours DOUBLE PRECISION,
        next_due_date DATE,
        next_due_hours DOUBLE PRECISION,
        notes TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (equipment_id, maintenance_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS equipment_documents (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        equipment_id UUID NOT NULL REFERENCES equipment(id) ON DELETE CASCADE,
        document_type TEXT NOT NULL,
        document_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size_bytes BIGINT,
        mime_type TEXT,
        issue_date DATE,
        expiry_date DATE,
        notes TEXT,
        uploaded_by_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS suppliers (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        short_name TEXT,
        contact_person TEXT,
        email TEXT,
        phone TEXT,
        address TEXT,
        tax_number TEXT,
        payment_terms TEXT,
        rating INTEGER CHECK (rating BETWEEN 1 AND 5),
        notes TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS supplier_contacts (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        supplier_id UUID NOT NULL REFERENCES suppliers(id) ON DELETE CASCADE,
        contact_name TEXT NOT NULL,
        position TEXT,
        department TEXT,
        phone TEXT,
        email TEXT,
        is_primary BOOLEAN NOT NULL DEFAULT FALSE,
        notes TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS supplier_materials (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        supplier_id UUID NOT NULL REFERENCES suppliers(id) ON DELETE CASCADE,
        material_id UUID NOT NULL REFERENCES materials(id) ON DELETE CASCADE,
        supplier_part_number TEXT,
        unit_price DOUBLE PRECISION NOT NULL CHECK (unit_price > 0),
        minimum_order_qty DOUBLE PRECISION NOT NULL DEFAULT 1 CHECK (minimum_order_qty > 0),
        lead_time_days INTEGER,
        is_preferred BOOLEAN NOT NULL DEFAULT FALSE,
        last_price_update TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (supplier_id, material_id)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_work_entries_project ON work_entries(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_work_entries_user ON work_entries(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_crew_members_crew ON crew_members(crew_id)",
    "CREATE INDEX IF NOT EXISTS idx_allocations_material ON material_allocations(material_id)",
    "CREATE INDEX IF NOT EXISTS idx_checklist_project ON project_checklist_items(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON in_app_notifications(user_id, is_read)",
    "CREATE INDEX IF NOT EXISTS idx_geofeatures_project ON geospatial_features(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_vehicle_documents_vehicle ON vehicle_documents(vehicle_id)",
    // at most one active assignment per item
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_equipment_assignments_active \
     ON equipment_assignments(equipment_id) WHERE is_active",
    "CREATE INDEX IF NOT EXISTS idx_activation_log_project ON project_activation_log(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_project_contacts_project ON project_contacts(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_reservations_equipment \
     ON equipment_reservations(equipment_id, reserved_from, reserved_until) WHERE is_active",
    "CREATE INDEX IF NOT EXISTS idx_equipment_documents_equipment ON equipment_documents(equipment_id)",
    "CREATE INDEX IF NOT EXISTS idx_supplier_contacts_supplier ON supplier_contacts(supplier_id)",
];

/// Aggregates checklist completion per project into a JSON object
const READINESS_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION calculate_project_readiness(p_project_id UUID)
RETURNS JSONB
LANGUAGE sql
STABLE
AS $$
    SELECT jsonb_build_object(
        'total_checks', COUNT(*),
        'completed_checks', COUNT(*) FILTER (WHERE completed),
        'required_checks', COUNT(*) FILTER (WHERE required),
        'required_completed', COUNT(*) FILTER (WHERE required AND completed),
        'categories', COALESCE((
            SELECT jsonb_object_agg(category, jsonb_build_object('total', total, 'completed', done))
            FROM (
                SELECT category, COUNT(*) AS total, COUNT(*) FILTER (WHERE completed) AS done
                FROM project_checklist_items
                WHERE project_id = p_project_id
                GROUP BY category
            ) per_category
        ), '{}'::jsonb)
    )
    FROM project_checklist_items
    WHERE project_id = p_project_id
$$
"#;

/// Create all tables, indexes and the readiness function
///
/// Safe to call multiple times.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }

    for statement in INDEXES {
        sqlx::query(statement).execute(pool).await?;
    }

    sqlx::query(READINESS_FUNCTION).execute(pool).await?;

    tracing::info!("✅ Schema ready ({} tables)", TABLES.len() - 1);
    Ok(())
}
