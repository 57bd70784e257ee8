//! Service wiring: the backing store plus token issuing/verification.

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use stockflow_auth::{
    Hs256JwtValidator, JwtValidator, NewUser, TokenIssuer, User, UserPatch, authorize_user_patch,
    hash_password, verify_password,
};
use stockflow_core::UserId;
use stockflow_infra::db::{connect, run_migrations};
use stockflow_infra::{
    AppConfig, InMemoryStore, PostgresStore, Store, StoreBackend, StoreError, UserRepository,
    seed_demo_data,
};

use crate::app::dto::LoginResponse;
use crate::app::errors::ApiError;
use crate::context::RequestContext;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store initialization failed: {0}")]
    Store(#[from] StoreError),
}

/// Shared by every handler through an `Extension`.
pub struct AppServices {
    store: Arc<dyn Store>,
    issuer: TokenIssuer,
    validator: Arc<dyn JwtValidator>,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, jwt_secret: &[u8], token_ttl: Duration) -> Self {
        Self {
            store,
            issuer: TokenIssuer::new(jwt_secret, token_ttl),
            validator: Arc::new(Hs256JwtValidator::new(jwt_secret)),
        }
    }

    /// Pick the store from configuration, migrate it and optionally seed it.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let store: Arc<dyn Store> = match &config.store {
            StoreBackend::Postgres(url) => {
                let pool = connect(url, config.db_max_connections).await?;
                run_migrations(&pool).await?;
                Arc::new(PostgresStore::new(pool))
            }
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        };

        if config.seed_demo_data {
            seed_demo_data(store.as_ref()).await?;
        }

        Ok(Self::new(store, config.jwt_secret.as_bytes(), config.jwt_ttl))
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn validator(&self) -> Arc<dyn JwtValidator> {
        Arc::clone(&self.validator)
    }

    /// Unknown user and wrong password produce the same error.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let Some(credentials) = self.store.find_credentials(username).await? else {
            tracing::warn!("login rejected");
            return Err(ApiError::InvalidLogin);
        };

        let user_id = credentials.user.id;
        let hash = credentials.password_hash;
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("login rejected");
                return Err(ApiError::InvalidLogin);
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "stored credential unusable; login rejected");
                return Err(ApiError::InvalidLogin);
            }
        }

        let user = credentials.user;
        let issued = self
            .issuer
            .issue(user.id, &user.username, user.role, Utc::now())
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        tracing::info!(user_id = %user.id, "login succeeded");
        Ok(LoginResponse::new(issued, user))
    }

    /// Validate, hash and store a new account. The role is taken as given;
    /// self-registration builds its input with [`NewUser::registration`].
    pub async fn create_user(&self, new: NewUser) -> Result<User, ApiError> {
        new.validate()?;

        let password_hash = hash(new.password).await?;
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            name: new.name.trim().to_string(),
            email: new.email.trim().to_string(),
            username: new.username,
            role: new.role,
            created_at: now,
            updated_at: now,
        };

        let user = self.store.create_user(user, password_hash).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn update_user(
        &self,
        ctx: &RequestContext,
        id: UserId,
        patch: UserPatch,
    ) -> Result<User, ApiError> {
        authorize_user_patch(ctx.identity(), id, &patch)?;
        patch.validate()?;

        let password_hash = match &patch.password {
            Some(password) => Some(hash(password.clone()).await?),
            None => None,
        };

        Ok(self.store.update_user(id, &patch, password_hash).await?)
    }
}

/// Argon2 blocks; run it off the async workers.
async fn hash(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}
