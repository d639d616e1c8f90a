use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{optional_text, parse_field, required_name};
use crate::{
    db::models::{Product, ProductStatus},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::access::{self, Access, Permission},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/image-preview", post(image_preview))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub room_id: String,
    pub name: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub shop: Option<String>,
    pub price: f64,
    pub quantity: Option<i64>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub shop: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    pub permission: Permission,
}

#[derive(Debug, Deserialize)]
pub struct ImagePreviewRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ImagePreviewResponse {
    pub image_url: Option<String>,
}

fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::Validation(
            "Price must be greater than zero".to_string(),
        ));
    }
    Ok(price)
}

fn validate_quantity(quantity: i64) -> Result<i64> {
    if quantity < 1 {
        return Err(AppError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(quantity)
}

fn parse_status(status: &str) -> Result<ProductStatus> {
    parse_field(status, "Status must be 'planned' or 'purchased'")
}

/// Replaces an optional text field only when the request carries it.
fn patch_text(field: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *field = optional_text(value);
    }
}

async fn load_product(pool: &sqlx::SqlitePool, id: &str) -> Result<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProductRequest>,
) -> Result<Json<ProductResponse>> {
    let name = required_name(&body.name, "Product")?;
    let price = validate_price(body.price)?;
    let quantity = validate_quantity(body.quantity.unwrap_or(1))?;
    let status = match body.status.as_deref() {
        Some(s) => parse_status(s)?,
        None => ProductStatus::Planned,
    };

    access::authorize_room(&state.db.pool, &body.room_id, &user.id, Access::Edit).await?;

    let now = Utc::now().to_rfc3339();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        room_id: body.room_id,
        name,
        description: optional_text(body.description),
        link: optional_text(body.link),
        shop: optional_text(body.shop),
        price,
        quantity,
        category: optional_text(body.category),
        status,
        image_url: optional_text(body.image_url),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO products (id, room_id, name, description, link, shop, price, quantity, category, status, image_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&product.id)
    .bind(&product.room_id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.link)
    .bind(&product.shop)
    .bind(product.price)
    .bind(product.quantity)
    .bind(&product.category)
    .bind(product.status)
    .bind(&product.image_url)
    .bind(&product.created_at)
    .bind(&product.updated_at)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(ProductResponse {
        product,
        permission: Permission::Edit,
    }))
}

async fn get_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>> {
    let permission =
        access::authorize_product(&state.db.pool, &id, &user.id, Access::Read).await?;
    let product = load_product(&state.db.pool, &id).await?;

    Ok(Json(ProductResponse {
        product,
        permission,
    }))
}

async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>> {
    let permission =
        access::authorize_product(&state.db.pool, &id, &user.id, Access::Edit).await?;
    let mut product = load_product(&state.db.pool, &id).await?;

    if let Some(name) = body.name {
        product.name = required_name(&name, "Product")?;
    }
    if let Some(price) = body.price {
        product.price = validate_price(price)?;
    }
    if let Some(quantity) = body.quantity {
        product.quantity = validate_quantity(quantity)?;
    }
    if let Some(status) = body.status {
        product.status = parse_status(&status)?;
    }
    patch_text(&mut product.description, body.description);
    patch_text(&mut product.link, body.link);
    patch_text(&mut product.shop, body.shop);
    patch_text(&mut product.category, body.category);
    patch_text(&mut product.image_url, body.image_url);
    product.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE products
        SET name = ?, description = ?, link = ?, shop = ?, price = ?, quantity = ?,
            category = ?, status = ?, image_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.link)
    .bind(&product.shop)
    .bind(product.price)
    .bind(product.quantity)
    .bind(&product.category)
    .bind(product.status)
    .bind(&product.image_url)
    .bind(&product.updated_at)
    .bind(&product.id)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(ProductResponse {
        product,
        permission,
    }))
}

async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    access::authorize_product(&state.db.pool, &id, &user.id, Access::Edit).await?;

    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}

async fn image_preview(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<ImagePreviewRequest>,
) -> Result<Json<ImagePreviewResponse>> {
    let image_url = state.scraper.fetch_image_url(body.url.trim()).await?;
    Ok(Json(ImagePreviewResponse { image_url }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{request, TestApp};

    #[tokio::test]
    async fn product_lifecycle() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let room_id = app.room(&owner, None, "Kitchen").await;

        let (status, body) = request(
            &app.router,
            "POST",
            "/api/products",
            Some(&owner),
            Some(json!({
                "room_id": room_id,
                "name": "Oven",
                "price": 899.0,
                "shop": "  ",
                "link": "https://shop.example.com/oven"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quantity"], 1);
        assert_eq!(body["status"], "planned");
        assert!(body["shop"].is_null());
        let uri = format!("/api/products/{}", body["id"].as_str().unwrap());

        let (status, body) = request(
            &app.router,
            "PUT",
            &uri,
            Some(&owner),
            Some(json!({ "status": "purchased", "quantity": 2, "link": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "purchased");
        assert_eq!(body["quantity"], 2);
        assert_eq!(body["name"], "Oven");
        assert!(body["link"].is_null());

        let (status, _) = request(&app.router, "DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = request(&app.router, "GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Product not found");
    }

    #[tokio::test]
    async fn product_validation() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let room_id = app.room(&owner, None, "Kitchen").await;

        for payload in [
            json!({ "room_id": room_id, "name": "", "price": 10.0 }),
            json!({ "room_id": room_id, "name": "Tap", "price": 0.0 }),
            json!({ "room_id": room_id, "name": "Tap", "price": 10.0, "quantity": 0 }),
            json!({ "room_id": room_id, "name": "Tap", "price": 10.0, "status": "wished" }),
        ] {
            let (status, _) =
                request(&app.router, "POST", "/api/products", Some(&owner), Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn shared_reader_sees_but_cannot_touch_products() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (_, reader) = app.user("reader@example.com").await;
        let (_, stranger) = app.user("stranger@example.com").await;
        let project_id = app.project(&owner, "House").await;
        app.share(&owner, &project_id, "reader@example.com", "read").await;
        let room_id = app.room(&owner, Some(&project_id), "Hall").await;
        let product_id = app.product(&owner, &room_id, "Rug", 120.0, 1, "planned").await;
        let uri = format!("/api/products/{product_id}");

        let (status, body) = request(&app.router, "GET", &uri, Some(&reader), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permission"], "read");

        let (status, _) = request(
            &app.router,
            "PUT",
            &uri,
            Some(&reader),
            Some(json!({ "price": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = request(
            &app.router,
            "POST",
            "/api/products",
            Some(&reader),
            Some(json!({ "room_id": room_id, "name": "Vase", "price": 15.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = request(&app.router, "GET", &uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Bad input is reported before any permission check
        let (status, _) = request(
            &app.router,
            "POST",
            "/api/products",
            Some(&reader),
            Some(json!({ "room_id": room_id, "name": "Vase", "price": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn image_preview_rejects_bad_links() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;

        for url in [
            "not a url",
            "ftp://files.example.com/lamp.jpg",
            "http://127.0.0.1:3000/api/projects",
        ] {
            let (status, _) = request(
                &app.router,
                "POST",
                "/api/products/image-preview",
                Some(&owner),
                Some(json!({ "url": url })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }
}
