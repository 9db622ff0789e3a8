//! User (Usuario) Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { Admin, Vendor, #[default] Customer }

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Admin => "admin", Self::Vendor => "vendor", Self::Customer => "customer" }
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "vendor" => Ok(Self::Vendor),
            "customer" => Ok(Self::Customer),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// Storefront name shown for vendors.
    pub store_name: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, full_name: impl Into<String>, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), email: normalize_email(email), full_name: full_name.into(), password_hash, role,
            store_name: None, phone: None, active: true, created_at: now, updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn is_vendor(&self) -> bool { self.role == Role::Vendor }

    /// Name used on reports and settlements.
    pub fn display_name(&self) -> &str { self.store_name.as_deref().unwrap_or(&self.full_name) }

    pub fn deactivate(&mut self) { self.active = false; self.touch(); }
    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let u = User::new("  Ana@Example.COM ", "Ana", String::new(), Role::Customer);
        assert_eq!(u.email, "ana@example.com");
        assert!(u.active);
    }

    #[test]
    fn test_display_name_prefers_store() {
        let mut u = User::new("v@x.com", "Vera", String::new(), Role::Vendor);
        assert_eq!(u.display_name(), "Vera");
        u.store_name = Some("Tienda Vera".into());
        assert_eq!(u.display_name(), "Tienda Vera");
    }

    #[test]
    fn test_role_round_trip() { assert_eq!("vendor".parse::<Role>().unwrap(), Role::Vendor); }
}
