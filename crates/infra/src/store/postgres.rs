//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (foreign key violation) | `23503` | `Domain(Conflict)` |
//! | Database (check constraint violation) | `23514` | `Domain(Validation)` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Transient` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io / other | N/A | `Backend` |
//!
//! ## Ledger Concurrency
//!
//! `post_movement` takes a row lock on the product (`SELECT ... FOR UPDATE`)
//! before the sufficiency check and holds it until commit. Writers against the
//! same product queue on that lock; writers against different products never
//! touch each other's rows.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockflow_auth::{Role, User, UserPatch};
use stockflow_core::{DomainError, MovementId, ProductId, UserId};
use stockflow_inventory::{
    Movement, MovementDetails, MovementReason, MovementType, NewMovement, opening_balance,
    plan_posting,
};
use stockflow_products::{NewProduct, Product, ProductPatch};

use super::query::like_pattern;
use super::{
    LEDGER_WRITE_ATTEMPTS, MovementFilter, Page, Pagination, ProductFilter, ProductRepository,
    StockLedger, Store, StoreError, StoreResult, UserCredentials, UserFilter, UserRepository,
};

const USER_COLUMNS: &str = "id, name, email, username, role, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, sku, name, description, category, location, price, cost_price, \
     quantity, min_stock_level, barcode, image_url, created_by, created_at, updated_at";

const MOVEMENT_DETAIL_SELECT: &str = r#"
    SELECT
        m.id, m.product_id, m.quantity, m.type, m.reason, m.reference, m.notes,
        m.performed_by, m.performed_at,
        p.name AS product_name, p.sku AS product_sku, u.name AS performed_by_name
    FROM inventory_movements m
    JOIN products p ON p.id = m.product_id
    LEFT JOIN users u ON u.id = m.performed_by
"#;

/// Postgres-backed implementation of every repository trait.
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One attempt of the ledger transaction.
    async fn try_post_movement(
        &self,
        movement: &NewMovement,
        actor: UserId,
    ) -> StoreResult<Movement> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Early returns drop `tx`, which rolls back.
        let posted = post_in_tx(&mut tx, movement.clone(), actor).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(posted)
    }

    async fn fetch_details(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>> {
        let product_id: Option<Uuid> = filter.product_id.map(Uuid::from);
        let movement_type: Option<&str> = filter.movement_type.as_ref().map(MovementType::as_str);
        let reason: Option<&str> = filter.reason.as_ref().map(MovementReason::as_str);
        let reference: Option<String> = filter.reference.as_deref().map(like_pattern);

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM inventory_movements m
            WHERE ($1::uuid IS NULL OR m.product_id = $1)
                AND ($2::text IS NULL OR m.type = $2)
                AND ($3::text IS NULL OR m.reason = $3)
                AND ($4::text IS NULL OR m.reference ILIKE $4)
                AND ($5::timestamptz IS NULL OR m.performed_at >= $5)
                AND ($6::timestamptz IS NULL OR m.performed_at <= $6)
            "#,
        )
        .bind(product_id)
        .bind(movement_type)
        .bind(reason)
        .bind(reference.as_deref())
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_movements", e))?;
        let total: i64 = read(&count_row, "total")?;

        let sql = format!(
            r#"{MOVEMENT_DETAIL_SELECT}
            WHERE ($1::uuid IS NULL OR m.product_id = $1)
                AND ($2::text IS NULL OR m.type = $2)
                AND ($3::text IS NULL OR m.reason = $3)
                AND ($4::text IS NULL OR m.reference ILIKE $4)
                AND ($5::timestamptz IS NULL OR m.performed_at >= $5)
                AND ($6::timestamptz IS NULL OR m.performed_at <= $6)
            ORDER BY m.performed_at DESC, m.id DESC
            LIMIT $7 OFFSET $8
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(product_id)
            .bind(movement_type)
            .bind(reason)
            .bind(reference.as_deref())
            .bind(filter.from)
            .bind(filter.to)
            .bind(i64::from(pagination.limit))
            .bind(pagination.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;

        let items = rows
            .iter()
            .map(details_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, pagination))
    }
}

/// Lock the product row, check, append the movement and write the quantity.
async fn post_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    movement: NewMovement,
    actor: UserId,
) -> StoreResult<Movement> {
    let row = sqlx::query("SELECT quantity FROM products WHERE id = $1 FOR UPDATE")
        .bind(movement.product_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;
    let Some(row) = row else {
        return Err(DomainError::not_found("product").into());
    };
    let current: i64 = read(&row, "quantity")?;

    let next_quantity = plan_posting(current, &movement)?;

    let id = MovementId::new();
    let row = sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, product_id, quantity, type, reason, reference, notes, performed_by, performed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, clock_timestamp())
        RETURNING performed_at
        "#,
    )
    .bind(id.as_uuid())
    .bind(movement.product_id.as_uuid())
    .bind(movement.quantity)
    .bind(movement.movement_type.as_str())
    .bind(movement.reason.as_str())
    .bind(movement.reference.as_deref())
    .bind(movement.notes.as_deref())
    .bind(actor.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        // The product row is locked, so the only reference that can be
        // missing here is the actor.
        if is_foreign_key_violation(&e) {
            StoreError::Domain(DomainError::not_found("user"))
        } else {
            map_sqlx_error("insert_movement", e)
        }
    })?;
    let performed_at: DateTime<Utc> = read(&row, "performed_at")?;

    sqlx::query("UPDATE products SET quantity = $2, updated_at = now() WHERE id = $1")
        .bind(movement.product_id.as_uuid())
        .bind(next_quantity)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_quantity", e))?;

    Ok(movement.into_movement(id, actor, performed_at))
}

#[async_trait]
impl UserRepository for PostgresStore {
    #[instrument(skip(self, user, password_hash), fields(user_id = %user.id, operation = "create_user"), err)]
    async fn create_user(&self, user: User, password_hash: String) -> StoreResult<User> {
        user.validate()?;
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, username, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %id, operation = "get_user"), err)]
    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("user")))?;
        user_from_row(&row)
    }

    #[instrument(skip(self), fields(operation = "find_credentials"), err)]
    async fn find_credentials(&self, username: &str) -> StoreResult<Option<UserCredentials>> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_credentials", e))?;

        row.map(|row| -> StoreResult<UserCredentials> {
            Ok(UserCredentials {
                user: user_from_row(&row)?,
                password_hash: read(&row, "password_hash")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(operation = "list_users"), err)]
    async fn list_users(&self, filter: &UserFilter, pagination: Pagination) -> StoreResult<Page<User>> {
        let name = filter.name.as_deref().map(like_pattern);
        let email = filter.email.as_deref().map(like_pattern);

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM users
            WHERE ($1::text IS NULL OR name ILIKE $1)
                AND ($2::text IS NULL OR email ILIKE $2)
            "#,
        )
        .bind(name.as_deref())
        .bind(email.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_users", e))?;
        let total: i64 = read(&count_row, "total")?;

        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE ($1::text IS NULL OR name ILIKE $1)
                AND ($2::text IS NULL OR email ILIKE $2)
            ORDER BY created_at ASC, id ASC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(name.as_deref())
            .bind(email.as_deref())
            .bind(i64::from(pagination.limit))
            .bind(pagination.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;

        let items = rows.iter().map(user_from_row).collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, pagination))
    }

    #[instrument(skip(self, patch, password_hash), fields(user_id = %id, operation = "update_user"), err)]
    async fn update_user(
        &self,
        id: UserId,
        patch: &UserPatch,
        password_hash: Option<String>,
    ) -> StoreResult<User> {
        patch.validate()?;
        let sql = format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                username = COALESCE($4, username),
                password_hash = COALESCE($5, password_hash),
                role = COALESCE($6, role),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.name.as_deref().map(str::trim))
            .bind(patch.email.as_deref().map(str::trim))
            .bind(patch.username.as_deref())
            .bind(password_hash.as_deref())
            .bind(patch.role.as_ref().map(Role::as_str))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("user")))?;
        user_from_row(&row)
    }

    #[instrument(skip(self), fields(user_id = %id, operation = "delete_user"), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let referenced: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM inventory_movements WHERE performed_by = $1) AS referenced",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("check_user_references", e))
        .and_then(|row| read(&row, "referenced"))?;
        if referenced {
            return Err(DomainError::conflict("user has recorded inventory movements").into());
        }

        let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("user")))?;
        let user = user_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(user)
    }

    async fn count_users(&self) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?;
        let total: i64 = read(&row, "total")?;
        Ok(total as u64)
    }
}

#[async_trait]
impl ProductRepository for PostgresStore {
    #[instrument(skip(self, new), fields(sku = %new.sku, operation = "create_product"), err)]
    async fn create_product(&self, new: NewProduct, actor: UserId) -> StoreResult<Product> {
        new.validate()?;
        let initial_quantity = new.initial_quantity;
        let product = new.into_product(ProductId::new(), Some(actor), Utc::now());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, description, category, location, price, cost_price,
                quantity, min_stock_level, barcode, image_url, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.category.as_deref())
        .bind(product.location.as_deref())
        .bind(product.price)
        .bind(product.cost_price)
        .bind(product.min_stock_level)
        .bind(product.barcode.as_deref())
        .bind(product.image_url.as_deref())
        .bind(product.created_by.map(Uuid::from))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        if initial_quantity > 0 {
            post_in_tx(&mut tx, opening_balance(product.id, initial_quantity), actor).await?;
        }

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(product.id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reload_product", e))?;
        let created = product_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(created)
    }

    #[instrument(skip(self), fields(product_id = %id, operation = "get_product"), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("product")))?;
        product_from_row(&row)
    }

    #[instrument(skip(self), fields(operation = "get_product_by_sku"), err)]
    async fn get_product_by_sku(&self, sku: &str) -> StoreResult<Product> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1");
        let row = sqlx::query(&sql)
            .bind(sku)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product_by_sku", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("product")))?;
        product_from_row(&row)
    }

    #[instrument(skip(self), fields(operation = "list_products"), err)]
    async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<Product>> {
        let name = filter.name.as_deref().map(like_pattern);
        let category = filter.category.as_deref().map(like_pattern);
        let sku = filter.sku.as_deref().map(like_pattern);

        const WHERE: &str = r#"
            WHERE ($1::text IS NULL OR name ILIKE $1)
                AND ($2::text IS NULL OR category ILIKE $2)
                AND ($3::text IS NULL OR sku ILIKE $3)
                AND ($4::boolean IS NULL OR (quantity <= min_stock_level) = $4)
        "#;

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM products {WHERE}"))
            .bind(name.as_deref())
            .bind(category.as_deref())
            .bind(sku.as_deref())
            .bind(filter.low_stock)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?;
        let total: i64 = read(&count_row, "total")?;

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products {WHERE} ORDER BY name ASC, id ASC LIMIT $5 OFFSET $6"
        );
        let rows = sqlx::query(&sql)
            .bind(name.as_deref())
            .bind(category.as_deref())
            .bind(sku.as_deref())
            .bind(filter.low_stock)
            .bind(i64::from(pagination.limit))
            .bind(pagination.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        let items = rows.iter().map(product_from_row).collect::<StoreResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, pagination))
    }

    #[instrument(skip(self, patch), fields(product_id = %id, operation = "update_product"), err)]
    async fn update_product(&self, id: ProductId, patch: &ProductPatch) -> StoreResult<Product> {
        patch.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("product")))?;
        let mut product = product_from_row(&row)?;
        patch.apply_to(&mut product, Utc::now());

        sqlx::query(
            r#"
            UPDATE products SET
                name = $2, description = $3, category = $4, location = $5,
                price = $6, cost_price = $7, min_stock_level = $8,
                barcode = $9, image_url = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.category.as_deref())
        .bind(product.location.as_deref())
        .bind(product.price)
        .bind(product.cost_price)
        .bind(product.min_stock_level)
        .bind(product.barcode.as_deref())
        .bind(product.image_url.as_deref())
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id, operation = "delete_product"), err)]
    async fn delete_product(&self, id: ProductId) -> StoreResult<Product> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Same lock the ledger takes, so no movement can land between the
        // reference check and the delete.
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("product")))?;
        let product = product_from_row(&row)?;

        let referenced: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM inventory_movements WHERE product_id = $1) AS referenced",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("check_product_references", e))
        .and_then(|row| read(&row, "referenced"))?;
        if referenced {
            return Err(DomainError::conflict(
                "product has inventory movements and cannot be deleted",
            )
            .into());
        }

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(product)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        crate::db::health_check(&self.pool).await
    }
}

#[async_trait]
impl StockLedger for PostgresStore {
    #[instrument(
        skip(self, movement),
        fields(
            product_id = %movement.product_id,
            actor_id = %actor,
            movement_type = %movement.movement_type,
            quantity = movement.quantity,
            operation = "post_movement"
        ),
        err
    )]
    async fn post_movement(&self, movement: NewMovement, actor: UserId) -> StoreResult<Movement> {
        movement.validate()?;

        let mut attempt = 1;
        loop {
            match self.try_post_movement(&movement, actor).await {
                Err(e) if e.is_transient() && attempt < LEDGER_WRITE_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "retrying ledger write");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    #[instrument(skip(self), fields(movement_id = %id, operation = "get_movement"), err)]
    async fn get_movement(&self, id: MovementId) -> StoreResult<MovementDetails> {
        let sql = format!("{MOVEMENT_DETAIL_SELECT} WHERE m.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_movement", e))?
            .ok_or_else(|| StoreError::from(DomainError::not_found("movement")))?;
        details_from_row(&row)
    }

    #[instrument(skip(self), fields(operation = "list_movements"), err)]
    async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>> {
        self.fetch_details(filter, pagination).await
    }

    #[instrument(skip(self), fields(product_id = %product_id, operation = "movements_for_product"), err)]
    async fn movements_for_product(
        &self,
        product_id: ProductId,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>> {
        let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1) AS present")
            .bind(product_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("check_product", e))
            .and_then(|row| read(&row, "present"))?;
        if !exists {
            return Err(DomainError::not_found("product").into());
        }
        self.fetch_details(&MovementFilter::for_product(product_id), pagination)
            .await
    }
}

// Row mapping

fn read<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read column {column}: {e}")))
}

fn parse_column<T>(value: &str, column: &str) -> StoreResult<T>
where
    T: FromStr,
{
    value
        .parse()
        .map_err(|_| StoreError::Backend(format!("unexpected {column} value '{value}'")))
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let role: String = read(row, "role")?;
    Ok(User {
        id: UserId::from_uuid(read(row, "id")?),
        name: read(row, "name")?,
        email: read(row, "email")?,
        username: read(row, "username")?,
        role: parse_column(&role, "role")?,
        created_at: read(row, "created_at")?,
        updated_at: read(row, "updated_at")?,
    })
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    let created_by: Option<Uuid> = read(row, "created_by")?;
    Ok(Product {
        id: ProductId::from_uuid(read(row, "id")?),
        sku: read(row, "sku")?,
        name: read(row, "name")?,
        description: read(row, "description")?,
        category: read(row, "category")?,
        location: read(row, "location")?,
        price: read(row, "price")?,
        cost_price: read(row, "cost_price")?,
        quantity: read(row, "quantity")?,
        min_stock_level: read(row, "min_stock_level")?,
        barcode: read(row, "barcode")?,
        image_url: read(row, "image_url")?,
        created_by: created_by.map(UserId::from_uuid),
        created_at: read(row, "created_at")?,
        updated_at: read(row, "updated_at")?,
    })
}

fn details_from_row(row: &PgRow) -> StoreResult<MovementDetails> {
    let movement_type: String = read(row, "type")?;
    let reason: String = read(row, "reason")?;
    let movement = Movement {
        id: MovementId::from_uuid(read(row, "id")?),
        product_id: ProductId::from_uuid(read(row, "product_id")?),
        quantity: read(row, "quantity")?,
        movement_type: parse_column(&movement_type, "type")?,
        reason: parse_column(&reason, "reason")?,
        reference: read(row, "reference")?,
        notes: read(row, "notes")?,
        performed_by: UserId::from_uuid(read(row, "performed_by")?),
        performed_at: read(row, "performed_at")?,
    };
    Ok(MovementDetails {
        movement,
        product_name: read(row, "product_name")?,
        product_sku: read(row, "product_sku")?,
        performed_by_name: read(row, "performed_by_name")?,
    })
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => {
                    let what = db_err
                        .constraint()
                        .map(unique_subject)
                        .unwrap_or("value");
                    StoreError::Domain(DomainError::conflict(format!("{what} already exists")))
                }
                Some("23503") => StoreError::Domain(DomainError::conflict(msg)),
                Some(code) if rejects_input(code) => StoreError::Domain(DomainError::validation(msg)),
                Some("40001") | Some("40P01") => StoreError::Transient(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("connection pool timed out in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Human name for a unique constraint, by the default Postgres naming.
fn unique_subject(constraint: &str) -> &'static str {
    match constraint {
        "users_username_key" => "username",
        "users_email_key" => "email",
        "products_sku_key" => "sku",
        "products_barcode_key" => "barcode",
        _ => "value",
    }
}

/// SQLSTATEs caused by the submitted values rather than the database:
/// check violation and string data right truncation.
fn rejects_input(code: &str) -> bool {
    matches!(code, "23514" | "22001")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23503";
        }
    }
    false
}
