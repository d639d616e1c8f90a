use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{optional_text, required_name};
use crate::{
    db::{
        cascade::delete_room_cascade,
        models::{Product, Room},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::{
        access::{self, Access, Permission},
        estimator::{self, SpendEstimate},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/:id", get(get_room).put(update_room).delete(delete_room))
        .route("/:id/products", get(list_room_products))
        .route("/:id/estimate", get(room_estimate))
}

#[derive(Debug, Deserialize)]
pub struct RoomsQuery {
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub icon: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<Room>,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
}

async fn load_room(pool: &sqlx::SqlitePool, id: &str) -> Result<Room> {
    sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
}

async fn room_products(pool: &sqlx::SqlitePool, room_id: &str) -> Result<Vec<Product>> {
    Ok(sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE room_id = ? ORDER BY created_at ASC",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?)
}

async fn list_rooms(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RoomsQuery>,
) -> Result<Json<RoomListResponse>> {
    let rooms = match optional_text(query.project_id) {
        Some(project_id) => {
            access::authorize_project(&state.db.pool, &project_id, &user.id, Access::Read)
                .await?;
            sqlx::query_as::<_, Room>(
                "SELECT * FROM rooms WHERE project_id = ? ORDER BY created_at ASC",
            )
            .bind(&project_id)
            .fetch_all(&state.db.pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE user_id = ? ORDER BY created_at ASC")
                .bind(&user.id)
                .fetch_all(&state.db.pool)
                .await?
        }
    };

    Ok(Json(RoomListResponse { rooms }))
}

async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<RoomResponse>> {
    let name = required_name(&body.name, "Room")?;
    let project_id = optional_text(body.project_id);

    if let Some(project_id) = &project_id {
        access::authorize_project(&state.db.pool, project_id, &user.id, Access::Edit).await?;
    }

    let now = Utc::now().to_rfc3339();
    let room = Room {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        project_id,
        name,
        icon: optional_text(body.icon),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO rooms (id, user_id, project_id, name, icon, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&room.id)
    .bind(&room.user_id)
    .bind(&room.project_id)
    .bind(&room.name)
    .bind(&room.icon)
    .bind(&room.created_at)
    .bind(&room.updated_at)
    .execute(&state.db.pool)
    .await?;

    tracing::debug!(room_id = %room.id, project_id = ?room.project_id, "Room created");

    Ok(Json(RoomResponse {
        room,
        permission: Permission::Edit,
    }))
}

async fn get_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<RoomResponse>> {
    let permission = access::authorize_room(&state.db.pool, &id, &user.id, Access::Read).await?;
    let room = load_room(&state.db.pool, &id).await?;

    Ok(Json(RoomResponse { room, permission }))
}

async fn update_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateRoomRequest>,
) -> Result<Json<RoomResponse>> {
    let permission = access::authorize_room(&state.db.pool, &id, &user.id, Access::Edit).await?;
    let mut room = load_room(&state.db.pool, &id).await?;

    if let Some(name) = body.name {
        room.name = required_name(&name, "Room")?;
    }
    if body.icon.is_some() {
        room.icon = optional_text(body.icon);
    }
    room.updated_at = Utc::now().to_rfc3339();

    sqlx::query("UPDATE rooms SET name = ?, icon = ?, updated_at = ? WHERE id = ?")
        .bind(&room.name)
        .bind(&room.icon)
        .bind(&room.updated_at)
        .bind(&room.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(RoomResponse { room, permission }))
}

async fn delete_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    access::authorize_room(&state.db.pool, &id, &user.id, Access::Edit).await?;

    let products = delete_room_cascade(&state.db.pool, &id).await?;
    tracing::info!(room_id = %id, products, "Room deleted");

    Ok(Json(()))
}

async fn list_room_products(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProductListResponse>> {
    access::authorize_room(&state.db.pool, &id, &user.id, Access::Read).await?;
    let products = room_products(&state.db.pool, &id).await?;

    Ok(Json(ProductListResponse { products }))
}

async fn room_estimate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SpendEstimate>> {
    access::authorize_room(&state.db.pool, &id, &user.id, Access::Read).await?;
    let products = room_products(&state.db.pool, &id).await?;

    Ok(Json(estimator::estimate(&products)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{request, TestApp};

    #[tokio::test]
    async fn standalone_room_belongs_to_its_creator() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (_, other) = app.user("other@example.com").await;
        let room_id = app.room(&owner, None, "Garage").await;
        let uri = format!("/api/rooms/{room_id}");

        let (status, body) = request(&app.router, "GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permission"], "edit");
        assert!(body["project_id"].is_null());

        let (status, _) = request(&app.router, "GET", &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = request(&app.router, "GET", "/api/rooms", Some(&owner), None).await;
        assert_eq!(body["rooms"].as_array().unwrap().len(), 1);
        let (_, body) = request(&app.router, "GET", "/api/rooms", Some(&other), None).await;
        assert!(body["rooms"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn project_owner_controls_rooms_added_by_editors() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (_, editor) = app.user("editor@example.com").await;
        let project_id = app.project(&owner, "House").await;
        app.share(&owner, &project_id, "editor@example.com", "edit").await;

        let room_id = app.room(&editor, Some(&project_id), "Attic").await;
        let uri = format!("/api/rooms/{room_id}");

        let (status, body) = request(
            &app.router,
            "PUT",
            &uri,
            Some(&owner),
            Some(json!({ "name": "Loft", "icon": "bed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Loft");
        assert_eq!(body["icon"], "bed");

        let (_, body) = request(
            &app.router,
            "GET",
            &format!("/api/rooms?project_id={project_id}"),
            Some(&editor),
            None,
        )
        .await;
        assert_eq!(body["rooms"][0]["name"], "Loft");

        let (status, _) = request(&app.router, "DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = request(&app.router, "GET", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn read_share_cannot_add_rooms() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let (_, reader) = app.user("reader@example.com").await;
        let project_id = app.project(&owner, "House").await;
        app.share(&owner, &project_id, "reader@example.com", "read").await;

        let (status, _) = request(
            &app.router,
            "POST",
            "/api/rooms",
            Some(&reader),
            Some(json!({ "name": "Den", "project_id": project_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = request(
            &app.router,
            "GET",
            &format!("/api/rooms?project_id={project_id}"),
            Some(&reader),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn room_estimate_and_products() {
        let app = TestApp::new().await;
        let (_, owner) = app.user("owner@example.com").await;
        let room_id = app.room(&owner, None, "Bath").await;
        app.product(&owner, &room_id, "Tiles", 30.0, 10, "planned").await;
        app.product(&owner, &room_id, "Tiles", 50.0, 10, "planned").await;
        app.product(&owner, &room_id, "Mirror", 80.0, 1, "purchased").await;

        let (status, body) = request(
            &app.router,
            "GET",
            &format!("/api/rooms/{room_id}/products"),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["products"].as_array().unwrap().len(), 3);

        let (_, body) = request(
            &app.router,
            "GET",
            &format!("/api/rooms/{room_id}/estimate"),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(body["purchased_total"], 80.0);
        assert_eq!(body["planned_total"], 800.0);
        assert_eq!(body["scenarios"]["cheap"], 380.0);
        assert_eq!(body["scenarios"]["average"], 480.0);
        assert_eq!(body["scenarios"]["expensive"], 580.0);
    }
}
