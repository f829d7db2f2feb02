use crate::{
    auth::{auth_dto::*, auth_handlers},
    conversation::ConversationSummary,
    message::{message_dto::*, message_handlers, message_models::*},
    middleware::auth_middleware,
    state::AppState,
    user::{user_handlers, user_models::*},
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        auth_handlers::register,
        auth_handlers::login,
        user_handlers::get_current_user,
        message_handlers::send_message,
        message_handlers::list_messages,
        message_handlers::get_conversations,
        message_handlers::get_conversation,
        message_handlers::mark_message_read,
        message_handlers::unread_count,
        message_handlers::message_stream,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            UserRole,
            UserResponse,
            SendMessageRequest,
            UnreadCountResponse,
            Message,
            MessageDirection,
            ConversationSummary,
        )
    ),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User endpoints"),
        (name = "messages", description = "Direct messaging endpoints")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let auth_routes = Router::new()
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login));

    // Protected routes (auth required)
    let user_routes = Router::new()
        .route("/me", get(user_handlers::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let message_routes = Router::new()
        .route(
            "/",
            get(message_handlers::list_messages).post(message_handlers::send_message),
        )
        .route("/conversations", get(message_handlers::get_conversations))
        .route(
            "/conversations/:partner_id",
            get(message_handlers::get_conversation),
        )
        .route("/unread-count", get(message_handlers::unread_count))
        .route("/stream", get(message_handlers::message_stream))
        .route("/:id/read", patch(message_handlers::mark_message_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Combine all routes
    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/messages", message_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::create_access_token, state::Config};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    fn test_router() -> Router {
        // Never connects: every request below is rejected before touching the database.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/health_connect_test")
            .unwrap();
        let config = Arc::new(Config {
            jwt_secret: SECRET.to_string(),
            jwt_expiration_hours: 1,
            host: "127.0.0.1".to_string(),
            port: 0,
        });

        create_router(AppState::new(pool, config))
    }

    fn bearer(user_id: Uuid) -> String {
        let token = create_access_token(user_id, "me@example.com", "patient", SECRET, 1).unwrap();
        format!("Bearer {}", token)
    }

    #[tokio::test]
    async fn test_messages_require_token() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/messages?direction=sent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forged_token_is_rejected() {
        let token = create_access_token(Uuid::new_v4(), "x@example.com", "patient", "wrong", 1).unwrap();

        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/messages/unread-count")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_direction_is_bad_request() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/messages?direction=sideways")
                    .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let body = serde_json::json!({ "receiver_id": Uuid::new_v4(), "content": "" });

        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/messages")
                    .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_messaging_yourself_is_rejected() {
        let me = Uuid::new_v4();
        let body = serde_json::json!({ "receiver_id": me, "content": "note to self" });

        let response = test_router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/messages")
                    .header(header::AUTHORIZATION, bearer(me))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
