//! Back-office user administration.

use tracing::info;
use uuid::Uuid;

use super::auth::{hash_password, MIN_PASSWORD_LENGTH};
use super::{Actor, Context};
use crate::domain::aggregates::user::normalize_email;
use crate::domain::aggregates::{Role, User};
use crate::error::{EcommerceError, Result};

#[derive(Debug, Clone)]
pub struct UserInput {
    pub email: String,
    pub full_name: String,
    pub role: Role,
    /// Required when creating; empty keeps the current password on update.
    pub password: Option<String>,
    pub store_name: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
}

#[derive(Clone)]
pub struct UserService {
    ctx: Context,
}

impl UserService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    pub async fn list(&self, actor: &Actor, role: Option<Role>) -> Result<Vec<User>> {
        actor.require_admin()?;
        self.ctx.stores.users.list(role).await
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<User> {
        actor.require_admin()?;
        self.ctx.stores.users.get(id).await?.ok_or_else(|| EcommerceError::not_found("User"))
    }

    #[tracing::instrument(skip(self, actor, input), fields(email = %input.email))]
    pub async fn create(&self, actor: &Actor, input: UserInput) -> Result<User> {
        actor.require_admin()?;
        let password = input.password.as_deref().filter(|p| !p.is_empty())
            .ok_or_else(|| EcommerceError::validation("password is required"))?;
        check_password(password)?;
        check_store_name(&input)?;
        if self.ctx.stores.users.find_by_email(&input.email).await?.is_some() {
            return Err(EcommerceError::Conflict("Email is already registered".into()));
        }
        let mut user = User::new(&input.email, input.full_name.trim(), hash_password(password)?, input.role);
        user.store_name = input.store_name.map(|s| s.trim().to_string());
        user.phone = input.phone;
        user.active = input.active;
        self.ctx.stores.users.insert(&user).await?;
        info!(user_id = %user.id, role = user.role.as_str(), "user created");
        Ok(user)
    }

    #[tracing::instrument(skip(self, actor, input))]
    pub async fn update(&self, actor: &Actor, id: Uuid, input: UserInput) -> Result<User> {
        actor.require_admin()?;
        check_store_name(&input)?;
        let mut user = self.get(actor, id).await?;
        let email = normalize_email(&input.email);
        if email != user.email {
            if let Some(other) = self.ctx.stores.users.find_by_email(&email).await? {
                if other.id != id { return Err(EcommerceError::Conflict("Email is already registered".into())); }
            }
            user.email = email;
        }
        if id == actor.user_id && (input.role != Role::Admin || !input.active) {
            return Err(EcommerceError::validation("administrators cannot demote or disable themselves"));
        }
        if let Some(password) = input.password.as_deref().filter(|p| !p.is_empty()) {
            check_password(password)?;
            user.password_hash = hash_password(password)?;
        }
        user.full_name = input.full_name.trim().to_string();
        user.role = input.role;
        user.store_name = input.store_name.map(|s| s.trim().to_string());
        user.phone = input.phone;
        user.active = input.active;
        user.touch();
        self.ctx.stores.users.update(&user).await?;
        info!(user_id = %user.id, "user updated");
        Ok(user)
    }

    pub async fn deactivate(&self, actor: &Actor, id: Uuid) -> Result<User> {
        actor.require_admin()?;
        if id == actor.user_id {
            return Err(EcommerceError::validation("administrators cannot disable themselves"));
        }
        let mut user = self.get(actor, id).await?;
        user.deactivate();
        self.ctx.stores.users.update(&user).await?;
        info!(user_id = %user.id, "user deactivated");
        Ok(user)
    }
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(EcommerceError::validation(format!("password must have at least {MIN_PASSWORD_LENGTH} characters")));
    }
    Ok(())
}

fn check_store_name(input: &UserInput) -> Result<()> {
    if input.role == Role::Vendor && input.store_name.as_deref().map_or(true, |s| s.trim().is_empty()) {
        return Err(EcommerceError::validation("vendors need a store name"));
    }
    Ok(())
}
