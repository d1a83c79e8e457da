//! User model
//!
//! Users are newsroom staff. Readers never authenticate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. The password must already be hashed.
    pub fn new(name: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            email,
            password_hash,
            role,
            image: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id,
            name: self.name.clone(),
            image: self.image.clone(),
            bio: None,
        }
    }

    /// Summary plus bio, for detail pages
    pub fn profile(&self) -> AuthorSummary {
        AuthorSummary {
            bio: self.bio.clone(),
            ..self.summary()
        }
    }
}

/// Staff role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Editor,
    #[default]
    Author,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Editor => write!(f, "editor"),
            UserRole::Author => write!(f, "author"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "editor" => Ok(UserRole::Editor),
            "author" => Ok(UserRole::Author),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Author projection embedded in content responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorSummary {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new(
            "Ravi Sahu".to_string(),
            "ravi@mitaan.in".to_string(),
            "hash".to_string(),
            UserRole::Editor,
        );
        assert_eq!(user.id, 0);
        assert!(!user.is_admin());
        assert_eq!(user.summary().name, "Ravi Sahu");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a".into(), "a@x.in".into(), "secret".into(), UserRole::Admin);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"role\":\"admin\""));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("reader".parse::<UserRole>().is_err());
    }
}
