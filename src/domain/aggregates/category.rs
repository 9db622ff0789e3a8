//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str, description: Option<String>, parent_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::now_v7(), name: name.trim().to_string(), slug: slugify(name), description, parent_id,
            active: true, created_at: Utc::now(),
        }
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.slug = slugify(name);
    }
}

/// Lower-cases and joins words with dashes, dropping anything that is not alphanumeric.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Ropa de Niños "), "ropa-de-niños");
        assert_eq!(slugify("Hogar & Cocina"), "hogar-cocina");
    }
}
