use sqlx::PgPool;

use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

/// Arbitrary key shared by every instance so only one migrates at a time.
const MIGRATION_LOCK_KEY: i64 = 0x5354_4f43_4b46_4c4f;

/// Idempotent schema statements, applied in order.
const SCHEMA: &[&str] = &[
    // users
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id              UUID         PRIMARY KEY,
        name            VARCHAR(255) NOT NULL,
        email           VARCHAR(255) NOT NULL UNIQUE,
        username        VARCHAR(100) NOT NULL UNIQUE,
        password_hash   TEXT         NOT NULL,
        role            VARCHAR(16)  NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
        created_at      TIMESTAMPTZ  NOT NULL DEFAULT now(),
        updated_at      TIMESTAMPTZ  NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at, id)",
    // products
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id              UUID         PRIMARY KEY,
        sku             VARCHAR(50)  NOT NULL UNIQUE,
        name            VARCHAR(255) NOT NULL,
        description     TEXT,
        category        VARCHAR(100),
        location        VARCHAR(100),
        price           BIGINT       NOT NULL DEFAULT 0 CHECK (price >= 0),
        cost_price      BIGINT       NOT NULL DEFAULT 0 CHECK (cost_price >= 0),
        quantity        BIGINT       NOT NULL DEFAULT 0 CHECK (quantity >= 0),
        min_stock_level BIGINT       NOT NULL DEFAULT 0 CHECK (min_stock_level >= 0),
        barcode         VARCHAR(100) UNIQUE,
        image_url       TEXT,
        created_by      UUID         REFERENCES users(id) ON DELETE SET NULL,
        created_at      TIMESTAMPTZ  NOT NULL DEFAULT now(),
        updated_at      TIMESTAMPTZ  NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_products_name ON products(name, id)",
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
    // inventory_movements
    r#"
    CREATE TABLE IF NOT EXISTS inventory_movements (
        id              UUID         PRIMARY KEY,
        product_id      UUID         NOT NULL REFERENCES products(id) ON DELETE RESTRICT,
        quantity        BIGINT       NOT NULL CHECK (quantity > 0),
        type            VARCHAR(8)   NOT NULL CHECK (type IN ('in', 'out')),
        reason          VARCHAR(16)  NOT NULL,
        reference       VARCHAR(255),
        notes           TEXT,
        performed_by    UUID         NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
        performed_at    TIMESTAMPTZ  NOT NULL DEFAULT clock_timestamp(),
        CONSTRAINT inventory_movements_reason_matches_type CHECK (
            (type = 'in' AND reason IN ('purchase', 'return', 'adjustment', 'other'))
            OR (type = 'out' AND reason IN ('sale', 'damaged', 'adjustment', 'other'))
        )
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_movements_product ON inventory_movements(product_id, performed_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_movements_performed_at ON inventory_movements(performed_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_movements_performed_by ON inventory_movements(performed_by)",
    // movements are append-only
    r#"
    CREATE OR REPLACE FUNCTION reject_movement_rewrite() RETURNS trigger AS $$
    BEGIN
        RAISE EXCEPTION 'inventory_movements is append-only';
    END;
    $$ LANGUAGE plpgsql
    "#,
    "DROP TRIGGER IF EXISTS inventory_movements_append_only ON inventory_movements",
    r#"
    CREATE TRIGGER inventory_movements_append_only
        BEFORE UPDATE OR DELETE ON inventory_movements
        FOR EACH ROW EXECUTE FUNCTION reject_movement_rewrite()
    "#,
];

/// Apply the schema. Safe to call on every start.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_migrations", e))?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("migration_lock", e))?;

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_migrations", e))?;

    tracing::info!(statements = SCHEMA.len(), "database schema up to date");
    Ok(())
}
