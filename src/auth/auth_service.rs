use crate::auth::{create_access_token, hash_password, verify_password};
use crate::error::{AppError, Result};
use crate::user::user_models::{User, UserRole};
use crate::user::user_repository::UserRepository;

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
    jwt_expiration_hours: i64,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String, jwt_expiration_hours: i64) -> Self {
        Self {
            user_repo,
            jwt_secret,
            jwt_expiration_hours,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<(User, String)> {
        if self.user_repo.find_by_email(email).await?.is_some() {
            return Err(AppError::BadRequest("User already exists".into()));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .user_repo
            .create(username, email, &password_hash, &role.to_string())
            .await?;

        let access_token = self.issue_token(&user)?;
        tracing::info!("Registered {} user {}", user.role, user.id);

        Ok((user, access_token))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".into()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Authentication("Invalid credentials".into()));
        }

        let access_token = self.issue_token(&user)?;

        Ok((user, access_token))
    }

    fn issue_token(&self, user: &User) -> Result<String> {
        create_access_token(
            user.id,
            &user.email,
            &user.role,
            &self.jwt_secret,
            self.jwt_expiration_hours,
        )
    }
}
