//! In-memory store.
//!
//! Intended for tests/dev. Lock order, always taken left to right:
//! `products` map → product slot → `users` → `ledger`.
//! Nothing waits on the map while holding a slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockflow_auth::{User, UserPatch};
use stockflow_core::{DomainError, MovementId, ProductId, UserId};
use stockflow_inventory::{Movement, MovementDetails, NewMovement, opening_balance, plan_posting};
use stockflow_products::{NewProduct, Product, ProductPatch};

use super::{
    MovementFilter, Page, Pagination, ProductFilter, ProductRepository, StockLedger, Store,
    StoreError, StoreResult, UserCredentials, UserFilter, UserRepository,
};

#[derive(Debug)]
struct ProductSlot {
    product: Product,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    entries: Vec<Movement>,
    last_performed_at: Option<DateTime<Utc>>,
}

impl Ledger {
    /// Wall clock, clamped so timestamps never decrease in insertion order.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_performed_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_performed_at = Some(at);
        at
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    products: RwLock<HashMap<ProductId, Arc<Mutex<ProductSlot>>>>,
    users: RwLock<HashMap<UserId, UserCredentials>>,
    ledger: RwLock<Ledger>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: ProductId) -> StoreResult<Arc<Mutex<ProductSlot>>> {
        let products = self.products.read().map_err(|_| StoreError::poisoned())?;
        products
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("product").into())
    }

    /// Check-and-write under the product's slot lock.
    fn post_locked(
        &self,
        slot: &mut ProductSlot,
        movement: NewMovement,
        actor: UserId,
    ) -> StoreResult<Movement> {
        if slot.deleted {
            return Err(DomainError::not_found("product").into());
        }
        let next_quantity = plan_posting(slot.product.quantity, &movement)?;

        // Users stay read-locked until the entry is appended so the actor
        // cannot be deleted in between.
        let users = self.users.read().map_err(|_| StoreError::poisoned())?;
        if !users.contains_key(&actor) {
            return Err(DomainError::not_found("user").into());
        }
        let mut ledger = self.ledger.write().map_err(|_| StoreError::poisoned())?;

        let performed_at = ledger.next_timestamp();
        let entry = movement.into_movement(MovementId::new(), actor, performed_at);
        ledger.entries.push(entry.clone());
        slot.product.quantity = next_quantity;

        Ok(entry)
    }

    fn details(&self, movements: Vec<Movement>) -> StoreResult<Vec<MovementDetails>> {
        let names: HashMap<ProductId, (String, String)> = {
            let products = self.products.read().map_err(|_| StoreError::poisoned())?;
            let mut out = HashMap::new();
            for m in &movements {
                if out.contains_key(&m.product_id) {
                    continue;
                }
                if let Some(slot) = products.get(&m.product_id) {
                    let slot = slot.lock().map_err(|_| StoreError::poisoned())?;
                    out.insert(
                        m.product_id,
                        (slot.product.name.clone(), slot.product.sku.clone()),
                    );
                }
            }
            out
        };
        let users = self.users.read().map_err(|_| StoreError::poisoned())?;

        Ok(movements
            .into_iter()
            .map(|movement| {
                let (product_name, product_sku) =
                    names.get(&movement.product_id).cloned().unwrap_or_default();
                let performed_by_name = users
                    .get(&movement.performed_by)
                    .map(|c| c.user.name.clone());
                MovementDetails {
                    movement,
                    product_name,
                    product_sku,
                    performed_by_name,
                }
            })
            .collect())
    }

    fn ensure_unique_user(
        users: &HashMap<UserId, UserCredentials>,
        skip: Option<UserId>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<()> {
        for c in users.values() {
            if Some(c.user.id) == skip {
                continue;
            }
            if username.is_some_and(|u| c.user.username == u) {
                return Err(DomainError::conflict("username already exists").into());
            }
            if email.is_some_and(|e| c.user.email == e) {
                return Err(DomainError::conflict("email already exists").into());
            }
        }
        Ok(())
    }

    /// Caller holds the map write lock, so no slot can be added concurrently.
    fn ensure_unique_product(
        products: &HashMap<ProductId, Arc<Mutex<ProductSlot>>>,
        skip: Option<ProductId>,
        sku: Option<&str>,
        barcode: Option<&str>,
    ) -> StoreResult<()> {
        for (id, slot) in products {
            if Some(*id) == skip {
                continue;
            }
            let slot = slot.lock().map_err(|_| StoreError::poisoned())?;
            if sku.is_some_and(|s| slot.product.sku == s) {
                return Err(DomainError::conflict("sku already exists").into());
            }
            if barcode.is_some_and(|b| slot.product.barcode.as_deref() == Some(b)) {
                return Err(DomainError::conflict("barcode already exists").into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, user: User, password_hash: String) -> StoreResult<User> {
        user.validate()?;
        let mut users = self.users.write().map_err(|_| StoreError::poisoned())?;
        Self::ensure_unique_user(&users, None, Some(&user.username), Some(&user.email))?;
        users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        let users = self.users.read().map_err(|_| StoreError::poisoned())?;
        users
            .get(&id)
            .map(|c| c.user.clone())
            .ok_or_else(|| DomainError::not_found("user").into())
    }

    async fn find_credentials(&self, username: &str) -> StoreResult<Option<UserCredentials>> {
        let users = self.users.read().map_err(|_| StoreError::poisoned())?;
        Ok(users.values().find(|c| c.user.username == username).cloned())
    }

    async fn list_users(&self, filter: &UserFilter, pagination: Pagination) -> StoreResult<Page<User>> {
        let users = self.users.read().map_err(|_| StoreError::poisoned())?;
        let mut matched: Vec<User> = users
            .values()
            .map(|c| &c.user)
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pagination.slice(matched))
    }

    async fn update_user(
        &self,
        id: UserId,
        patch: &UserPatch,
        password_hash: Option<String>,
    ) -> StoreResult<User> {
        patch.validate()?;
        let mut users = self.users.write().map_err(|_| StoreError::poisoned())?;
        if !users.contains_key(&id) {
            return Err(DomainError::not_found("user").into());
        }
        Self::ensure_unique_user(
            &users,
            Some(id),
            patch.username.as_deref(),
            patch.email.as_deref(),
        )?;

        let record = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::from(DomainError::not_found("user")))?;
        patch.apply_to(&mut record.user, Utc::now());
        if let Some(hash) = password_hash {
            record.password_hash = hash;
        }
        Ok(record.user.clone())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<User> {
        let mut users = self.users.write().map_err(|_| StoreError::poisoned())?;
        if !users.contains_key(&id) {
            return Err(DomainError::not_found("user").into());
        }
        let ledger = self.ledger.read().map_err(|_| StoreError::poisoned())?;
        if ledger.entries.iter().any(|m| m.performed_by == id) {
            return Err(DomainError::conflict("user has recorded inventory movements").into());
        }
        drop(ledger);

        users
            .remove(&id)
            .map(|c| c.user)
            .ok_or_else(|| DomainError::not_found("user").into())
    }

    async fn count_users(&self) -> StoreResult<u64> {
        let users = self.users.read().map_err(|_| StoreError::poisoned())?;
        Ok(users.len() as u64)
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn create_product(&self, new: NewProduct, actor: UserId) -> StoreResult<Product> {
        new.validate()?;
        let initial_quantity = new.initial_quantity;
        let product = new.into_product(ProductId::new(), Some(actor), Utc::now());

        let mut products = self.products.write().map_err(|_| StoreError::poisoned())?;
        Self::ensure_unique_product(
            &products,
            None,
            Some(&product.sku),
            product.barcode.as_deref(),
        )?;

        let mut slot = ProductSlot {
            product,
            deleted: false,
        };
        if initial_quantity > 0 {
            let opening = opening_balance(slot.product.id, initial_quantity);
            self.post_locked(&mut slot, opening, actor)?;
        }

        let created = slot.product.clone();
        products.insert(created.id, Arc::new(Mutex::new(slot)));
        Ok(created)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let slot = self.slot(id)?;
        let slot = slot.lock().map_err(|_| StoreError::poisoned())?;
        if slot.deleted {
            return Err(DomainError::not_found("product").into());
        }
        Ok(slot.product.clone())
    }

    async fn get_product_by_sku(&self, sku: &str) -> StoreResult<Product> {
        let products = self.products.read().map_err(|_| StoreError::poisoned())?;
        for slot in products.values() {
            let slot = slot.lock().map_err(|_| StoreError::poisoned())?;
            if !slot.deleted && slot.product.sku == sku {
                return Ok(slot.product.clone());
            }
        }
        Err(DomainError::not_found("product").into())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<Product>> {
        let mut matched = Vec::new();
        {
            let products = self.products.read().map_err(|_| StoreError::poisoned())?;
            for slot in products.values() {
                let slot = slot.lock().map_err(|_| StoreError::poisoned())?;
                if !slot.deleted && filter.matches(&slot.product) {
                    matched.push(slot.product.clone());
                }
            }
        }
        matched.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(pagination.slice(matched))
    }

    async fn update_product(&self, id: ProductId, patch: &ProductPatch) -> StoreResult<Product> {
        patch.validate()?;
        let products = self.products.write().map_err(|_| StoreError::poisoned())?;
        let slot = products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::from(DomainError::not_found("product")))?;

        let barcode = patch.barcode.as_deref().map(str::trim).filter(|b| !b.is_empty());
        Self::ensure_unique_product(&products, Some(id), None, barcode)?;

        let mut slot = slot.lock().map_err(|_| StoreError::poisoned())?;
        patch.apply_to(&mut slot.product, Utc::now());
        Ok(slot.product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<Product> {
        let mut products = self.products.write().map_err(|_| StoreError::poisoned())?;
        let slot = products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::from(DomainError::not_found("product")))?;
        let mut slot = slot.lock().map_err(|_| StoreError::poisoned())?;

        let ledger = self.ledger.read().map_err(|_| StoreError::poisoned())?;
        if ledger.entries.iter().any(|m| m.product_id == id) {
            return Err(DomainError::conflict(
                "product has inventory movements and cannot be deleted",
            )
            .into());
        }
        drop(ledger);

        slot.deleted = true;
        products.remove(&id);
        Ok(slot.product.clone())
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn post_movement(&self, movement: NewMovement, actor: UserId) -> StoreResult<Movement> {
        movement.validate()?;
        let slot = self.slot(movement.product_id)?;
        let mut slot = slot.lock().map_err(|_| StoreError::poisoned())?;
        self.post_locked(&mut slot, movement, actor)
    }

    async fn get_movement(&self, id: MovementId) -> StoreResult<MovementDetails> {
        let found = {
            let ledger = self.ledger.read().map_err(|_| StoreError::poisoned())?;
            ledger.entries.iter().find(|m| m.id == id).cloned()
        };
        let movement = found.ok_or_else(|| StoreError::from(DomainError::not_found("movement")))?;
        self.details(vec![movement])?
            .pop()
            .ok_or_else(|| DomainError::not_found("movement").into())
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>> {
        let page = {
            let ledger = self.ledger.read().map_err(|_| StoreError::poisoned())?;
            // Entries are in insertion order with non-decreasing timestamps,
            // so reversing gives newest first with ties broken by insertion.
            let matched: Vec<Movement> = ledger
                .entries
                .iter()
                .rev()
                .filter(|m| filter.matches(m))
                .cloned()
                .collect();
            pagination.slice(matched)
        };

        let items = self.details(page.items)?;
        Ok(Page {
            items,
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            pages: page.pages,
        })
    }

    async fn movements_for_product(
        &self,
        product_id: ProductId,
        pagination: Pagination,
    ) -> StoreResult<Page<MovementDetails>> {
        self.get_product(product_id).await?;
        self.list_movements(&MovementFilter::for_product(product_id), pagination)
            .await
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
