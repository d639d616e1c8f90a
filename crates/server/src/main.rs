use std::net::SocketAddr;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod services;

use services::scraper::ImageScraper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renobudget_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env();

    // Initialize database
    let db = db::Database::connect(&config.database_url).await?;
    db.run_migrations().await?;

    let scraper = ImageScraper::new(config.scrape_timeout_secs)?;

    let state = AppState {
        db,
        config: config.clone(),
        scraper,
    };

    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    // Build protected routes (require a caller identity)
    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .nest("/projects", routes::projects::router())
        .nest("/rooms", routes::rooms::router())
        .nest("/products", routes::products::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub scraper: ImageScraper,
}

#[cfg(test)]
mod test_support {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{
        config::Config, db::Database, routes::auth::create_token, routes::auth::UserResponse,
        services::scraper::ImageScraper, AppState,
    };

    pub struct TestApp {
        pub router: Router,
        pub db: Database,
        config: Config,
    }

    impl TestApp {
        pub async fn new() -> Self {
            let config = Config {
                port: 0,
                database_url: "sqlite::memory:".to_string(),
                jwt_secret: "test-secret".to_string(),
                token_ttl_days: 1,
                scrape_timeout_secs: 2,
            };
            let db = Database::in_memory().await;
            let state = AppState {
                db: db.clone(),
                config: config.clone(),
                scraper: ImageScraper::new(config.scrape_timeout_secs).unwrap(),
            };

            Self {
                router: super::build_router(state),
                db,
                config,
            }
        }

        /// Inserts a user directly and returns `(id, bearer token)`.
        pub async fn user(&self, email: &str) -> (String, String) {
            let user = UserResponse {
                id: Uuid::new_v4().to_string(),
                email: email.to_string(),
                first_name: "Test".to_string(),
                last_name: email.split('@').next().unwrap().to_string(),
            };
            sqlx::query(
                "INSERT INTO users (id, email, first_name, last_name, password_hash, created_at) VALUES (?, ?, ?, ?, 'unused', ?)",
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db.pool)
            .await
            .unwrap();

            let token =
                create_token(&user, &self.config.jwt_secret, self.config.token_ttl_days).unwrap();
            (user.id, token)
        }

        pub async fn project(&self, token: &str, name: &str) -> String {
            let (status, body) = request(
                &self.router,
                "POST",
                "/api/projects",
                Some(token),
                Some(json!({ "name": name, "budget": 10000.0 })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["id"].as_str().unwrap().to_string()
        }

        pub async fn share(&self, token: &str, project_id: &str, email: &str, permission: &str) {
            let (status, body) = request(
                &self.router,
                "POST",
                &format!("/api/projects/{project_id}/shares"),
                Some(token),
                Some(json!({ "email": email, "permission": permission })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }

        pub async fn room(&self, token: &str, project_id: Option<&str>, name: &str) -> String {
            let (status, body) = request(
                &self.router,
                "POST",
                "/api/rooms",
                Some(token),
                Some(json!({ "name": name, "project_id": project_id })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["id"].as_str().unwrap().to_string()
        }

        pub async fn product(
            &self,
            token: &str,
            room_id: &str,
            name: &str,
            price: f64,
            quantity: i64,
            status: &str,
        ) -> String {
            let (code, body) = request(
                &self.router,
                "POST",
                "/api/products",
                Some(token),
                Some(json!({
                    "room_id": room_id,
                    "name": name,
                    "price": price,
                    "quantity": quantity,
                    "status": status,
                })),
            )
            .await;
            assert_eq!(code, StatusCode::OK, "{body}");
            body["id"].as_str().unwrap().to_string()
        }
    }

    pub async fn request(
        router: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_check_responds() {
        let app = TestApp::new().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
