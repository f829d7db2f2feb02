use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    auth::auth_service::AuthService,
    db::DbPool,
    message::{message_models::Message, message_repository::MessageRepository, message_service::MessageService},
    user::user_repository::UserRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub message_tx: broadcast::Sender<Message>,
    pub user_repository: UserRepository,
    pub auth_service: AuthService,
    pub message_service: MessageService,
}

impl AppState {
    pub fn new(db: DbPool, config: Arc<Config>) -> Self {
        let (message_tx, _) = broadcast::channel(100);

        let user_repository = UserRepository::new(db.clone());
        let message_repository = MessageRepository::new(db);

        let auth_service = AuthService::new(
            user_repository.clone(),
            config.jwt_secret.clone(),
            config.jwt_expiration_hours,
        );
        let message_service = MessageService::new(message_repository, user_repository.clone());

        Self {
            config,
            message_tx,
            user_repository,
            auth_service,
            message_service,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_expiration_hours: std::env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("JWT_EXPIRATION_HOURS must be a number")?,
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a number")?,
        })
    }
}
