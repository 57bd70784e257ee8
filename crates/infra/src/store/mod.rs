//! Repository boundary for users, products and the stock ledger.
//!
//! Two implementations share these traits: [`PostgresStore`] for durable
//! deployments and [`InMemoryStore`] for tests/dev.

pub mod error;
pub mod in_memory;
pub mod postgres;
pub mod query;

use async_trait::async_trait;

use stockflow_auth::{User, UserPatch};
use stockflow_core::{MovementId, ProductId, UserId};
use stockflow_inventory::{Movement, MovementDetails, NewMovement};
use stockflow_products::{NewProduct, Product, ProductPatch};

pub use error::{StoreError, StoreResult};
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{MovementFilter, Page, Pagination, ProductFilter, UserFilter};

/// Attempts made for a ledger write before a transient failure surfaces.
pub const LEDGER_WRITE_ATTEMPTS: usize = 3;

/// A user plus the stored password hash. Only used for login.
#[derive(Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl core::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Field widths are validated; a duplicate
    /// username/email is a `Conflict`.
    async fn create_user(&self, user: User, password_hash: String) -> StoreResult<User>;

    async fn get_user(&self, id: UserId) -> StoreResult<User>;

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<UserCredentials>>;

    /// Ordered by creation time.
    async fn list_users(&self, filter: &UserFilter, pagination: Pagination) -> StoreResult<Page<User>>;

    /// Apply an already authorized patch. `password_hash` replaces the stored
    /// hash when present; the patch's plaintext password is ignored.
    async fn update_user(
        &self,
        id: UserId,
        patch: &UserPatch,
        password_hash: Option<String>,
    ) -> StoreResult<User>;

    /// Refused with `Conflict` while any movement is attributed to the user.
    async fn delete_user(&self, id: UserId) -> StoreResult<User>;

    async fn count_users(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a validated product. A positive `initial_quantity` is booked as
    /// an opening-balance movement in the same transaction.
    async fn create_product(&self, new: NewProduct, actor: UserId) -> StoreResult<Product>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Product>;

    async fn get_product_by_sku(&self, sku: &str) -> StoreResult<Product>;

    /// Ordered by name.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<Product>>;

    /// Metadata only; `quantity` is never touched here.
    async fn update_product(&self, id: ProductId, patch: &ProductPatch) -> StoreResult<Product>;

    /// Refused with `Conflict` while any movement references the product.
    async fn delete_product(&self, id: ProductId) -> StoreResult<Product>;
}

/// The append-only movement log and its quantity invariant.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Append a movement and adjust the product's quantity atomically.
    ///
    /// Concurrent postings against one product serialize; different products
    /// do not contend.
    async fn post_movement(&self, movement: NewMovement, actor: UserId) -> StoreResult<Movement>;

    async fn get_movement(&self, id: MovementId) -> StoreResult<MovementDetails>;

    /// Newest first; ties break by id, newest first.
    async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>>;

    /// `NotFound` when the product does not exist.
    async fn movements_for_product(
        &self,
        product_id: ProductId,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>>;
}

/// Everything the API needs from a backing store.
#[async_trait]
pub trait Store: UserRepository + ProductRepository + StockLedger {
    /// `Ok` when the store can serve requests.
    async fn health_check(&self) -> StoreResult<()>;
}
