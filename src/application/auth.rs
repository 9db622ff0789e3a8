//! Registration, login and bearer sessions.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Actor, CartService, Context};
use crate::domain::aggregates::user::normalize_email;
use crate::domain::aggregates::{CartOwner, Role, User};
use crate::error::{EcommerceError, Result};

const TOKEN_LENGTH: usize = 48;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(EcommerceError::storage)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn new_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(TOKEN_LENGTH).map(char::from).collect()
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
    /// Products whose quantity was reduced to fit stock while merging the anonymous cart.
    pub clamped_products: Vec<Uuid>,
}

#[derive(Clone)]
pub struct AuthService {
    ctx: Context,
    cart: CartService,
}

impl AuthService {
    pub fn new(ctx: Context, cart: CartService) -> Self { Self { ctx, cart } }

    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: Registration) -> Result<User> {
        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(EcommerceError::validation(format!("password must have at least {MIN_PASSWORD_LENGTH} characters")));
        }
        if self.ctx.stores.users.find_by_email(&input.email).await?.is_some() {
            return Err(EcommerceError::Conflict("Email is already registered".into()));
        }
        let mut user = User::new(&input.email, input.full_name.trim(), hash_password(&input.password)?, Role::Customer);
        user.phone = input.phone;
        self.ctx.stores.users.insert(&user).await?;
        info!(user_id = %user.id, "customer registered");
        Ok(user)
    }

    /// Verifies credentials, opens a session and folds the anonymous cart into the user's.
    #[tracing::instrument(skip(self, password, cart_session))]
    pub async fn login(&self, email: &str, password: &str, cart_session: Option<String>) -> Result<LoginOutcome> {
        let user = match self.ctx.stores.users.find_by_email(email).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!("rejected login");
                return Err(EcommerceError::Unauthorized);
            }
        };
        if !user.active {
            warn!(user_id = %user.id, "login attempt on inactive account");
            return Err(EcommerceError::forbidden("account is disabled"));
        }

        let clamped_products = match cart_session {
            Some(session) => self.cart.merge(CartOwner::Session(session), user.id).await?,
            None => vec![],
        };

        let token = new_token();
        self.ctx.caches.sessions.insert(token.clone(), user.id, self.ctx.config.session_ttl());
        info!(user_id = %user.id, "session opened");
        Ok(LoginOutcome { token, user, clamped_products })
    }

    pub fn logout(&self, token: &str) {
        if let Some(user_id) = self.ctx.caches.sessions.remove(&token.to_string()) {
            info!(%user_id, "session closed");
        }
    }

    /// Resolves a bearer token to an active user.
    pub async fn authenticate(&self, token: &str) -> Result<Actor> {
        let user_id = self.ctx.caches.sessions.get(&token.to_string()).ok_or(EcommerceError::Unauthorized)?;
        match self.ctx.stores.users.get(user_id).await? {
            Some(user) if user.active => Ok(Actor::from_user(&user)),
            _ => {
                self.ctx.caches.sessions.remove(&token.to_string());
                Err(EcommerceError::Unauthorized)
            }
        }
    }

    pub async fn current_user(&self, actor: &Actor) -> Result<User> {
        self.ctx.stores.users.get(actor.user_id).await?.ok_or_else(|| EcommerceError::not_found("User"))
    }

    /// Creates the configured administrator when no account uses that email yet.
    pub async fn bootstrap_admin(&self) -> Result<Option<User>> {
        let (Some(email), Some(password)) = (&self.ctx.config.admin_email, &self.ctx.config.admin_password) else {
            return Ok(None);
        };
        if self.ctx.stores.users.find_by_email(email).await?.is_some() {
            return Ok(None);
        }
        let admin = User::new(&normalize_email(email), "Administrator", hash_password(password)?, Role::Admin);
        self.ctx.stores.users.insert(&admin).await?;
        info!(user_id = %admin.id, "bootstrap administrator created");
        Ok(Some(admin))
    }
}
