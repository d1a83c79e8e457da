//! User service
//!
//! Staff authentication:
//! - login with email and password, issuing a bearer session
//! - logout
//! - session validation for the auth middleware
//! - bootstrap of the first administrator from configuration

use crate::config::AdminConfig;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{hash_password, validate_password, verify_password};
use anyhow::Context;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("{0}")]
    AuthenticationError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            user_repo,
            session_repo,
        }
    }

    /// Check credentials and open a new session.
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        if input.email.trim().is_empty() || input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()))?;

        let valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            tracing::info!(user_id = user.id, "Login rejected");
            return Err(UserServiceError::AuthenticationError(
                INVALID_CREDENTIALS.to_string(),
            ));
        }

        let session = self
            .session_repo
            .create(&Session::issue(Uuid::new_v4().to_string(), user.id))
            .await
            .context("Failed to create session")?;

        // opportunistic cleanup
        match self.session_repo.delete_expired().await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(count = n, "Removed expired sessions"),
            Err(e) => tracing::warn!("Failed to remove expired sessions: {:#}", e),
        }

        tracing::info!(user_id = user.id, "User logged in");
        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a bearer token to its user. Unknown and expired tokens yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        Ok(self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?)
    }

    /// Create the configured administrator when the users table is empty.
    ///
    /// Returns the new user, or `None` when nothing was created.
    pub async fn bootstrap_admin(&self, admin: &AdminConfig) -> Result<Option<User>, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        if count > 0 {
            return Ok(None);
        }

        let (email, password) = match (admin.email.as_deref(), admin.password.as_deref()) {
            (Some(email), Some(password)) if !email.trim().is_empty() => (email, password),
            _ => {
                tracing::warn!(
                    "No users exist and no admin credentials are configured; set MITAAN_ADMIN_EMAIL and MITAAN_ADMIN_PASSWORD"
                );
                return Ok(None);
            }
        };
        validate_password(password).map_err(UserServiceError::ValidationError)?;

        let hash = hash_password(password)?;
        let user = self
            .user_repo
            .create(&User::new(
                admin.name.clone(),
                email.to_string(),
                hash,
                UserRole::Admin,
            ))
            .await
            .context("Failed to create admin user")?;
        tracing::info!(user_id = user.id, email = %user.email, "Created bootstrap administrator");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    fn admin_config() -> AdminConfig {
        AdminConfig {
            name: "Editor in Chief".to_string(),
            email: Some("chief@mitaan.in".to_string()),
            password: Some("correct horse".to_string()),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_admin_once() {
        let (_pool, service) = setup_test_service().await;
        let admin = service.bootstrap_admin(&admin_config()).await.unwrap().unwrap();
        assert!(admin.is_admin());
        assert!(service.bootstrap_admin(&admin_config()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_without_credentials_is_skipped() {
        let (_pool, service) = setup_test_service().await;
        let config = AdminConfig {
            email: None,
            ..admin_config()
        };
        assert!(service.bootstrap_admin(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_short_password() {
        let (_pool, service) = setup_test_service().await;
        let config = AdminConfig {
            password: Some("short".into()),
            ..admin_config()
        };
        assert!(matches!(
            service.bootstrap_admin(&config).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (_pool, service) = setup_test_service().await;
        service.bootstrap_admin(&admin_config()).await.unwrap();

        let (session, user) = service
            .login(LoginInput::new("Chief@Mitaan.in", "correct horse"))
            .await
            .unwrap();
        assert_eq!(user.email, "chief@mitaan.in");

        let found = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_wrong_password_fails() {
        let (_pool, service) = setup_test_service().await;
        service.bootstrap_admin(&admin_config()).await.unwrap();

        for (email, password) in [
            ("chief@mitaan.in", "wrong password"),
            ("nobody@mitaan.in", "correct horse"),
        ] {
            let err = service.login(LoginInput::new(email, password)).await.unwrap_err();
            assert!(matches!(err, UserServiceError::AuthenticationError(_)));
        }
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let (pool, service) = setup_test_service().await;
        service.bootstrap_admin(&admin_config()).await.unwrap();
        let (session, _) = service
            .login(LoginInput::new("chief@mitaan.in", "correct horse"))
            .await
            .unwrap();

        sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
            .bind(chrono::Utc::now() - chrono::Duration::hours(1))
            .bind(&session.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }
}
