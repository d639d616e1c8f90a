use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{parse_field, required_name};
use crate::{
    db::{
        cascade::{delete_project_cascade, CascadeReport},
        models::{Product, Project, ProjectShare, ProjectStatus, SharePermission},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::{
        access::{self, Access, AccessFacts, Permission},
        estimator::{self, SpendEstimate},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/estimate", get(project_estimate))
        .route("/:id/shares", get(list_shares).post(add_share))
        .route(
            "/:id/shares/:user_id",
            axum::routing::delete(remove_share),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub budget: f64,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub budget: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: Project,
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
}

#[derive(Debug, Serialize)]
pub struct ProjectEstimateResponse {
    pub budget: f64,
    pub remaining_budget: f64,
    #[serde(flatten)]
    pub estimate: SpendEstimate,
}

#[derive(sqlx::FromRow)]
struct ProjectWithShare {
    #[sqlx(flatten)]
    project: Project,
    permission_type: Option<SharePermission>,
}

fn validate_budget(budget: f64) -> Result<f64> {
    if !budget.is_finite() || budget < 0.0 {
        return Err(AppError::Validation(
            "Budget must be zero or a positive amount".to_string(),
        ));
    }
    Ok(budget)
}

fn parse_status(status: &str) -> Result<ProjectStatus> {
    parse_field(status, "Status must be 'active' or 'completed'")
}

async fn load_project(pool: &sqlx::SqlitePool, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProjectListResponse>> {
    // Owned projects plus everything shared with the caller
    let rows = sqlx::query_as::<_, ProjectWithShare>(
        r#"
        SELECT p.*, s.permission_type
        FROM projects p
        LEFT JOIN project_shares s ON s.project_id = p.id AND s.shared_with_id = ?
        WHERE p.user_id = ? OR s.shared_with_id IS NOT NULL
        ORDER BY p.updated_at DESC
        "#,
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let projects = rows
        .into_iter()
        .map(|row| {
            let facts = AccessFacts {
                resource_owner_id: row.project.user_id.clone(),
                project_owner_id: Some(row.project.user_id.clone()),
                share: row.permission_type,
            };
            ProjectResponse {
                permission: access::resolve(&user.id, &facts),
                project: row.project,
            }
        })
        .collect();

    Ok(Json(ProjectListResponse { projects }))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let name = required_name(&body.name, "Project")?;
    let budget = validate_budget(body.budget)?;
    let status = match body.status.as_deref() {
        Some(s) => parse_status(s)?,
        None => ProjectStatus::Active,
    };

    let now = Utc::now().to_rfc3339();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        name,
        budget,
        status,
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO projects (id, user_id, name, budget, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&project.id)
    .bind(&project.user_id)
    .bind(&project.name)
    .bind(project.budget)
    .bind(project.status)
    .bind(&project.created_at)
    .bind(&project.updated_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(project_id = %project.id, user_id = %user.id, "Project created");

    Ok(Json(ProjectResponse {
        project,
        permission: Permission::Edit,
    }))
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProjectResponse>> {
    let permission = access::authorize_project(&state.db.pool, &id, &user.id, Access::Read).await?;
    let project = load_project(&state.db.pool, &id).await?;

    Ok(Json(ProjectResponse {
        project,
        permission,
    }))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let permission = access::authorize_project(&state.db.pool, &id, &user.id, Access::Edit).await?;
    let mut project = load_project(&state.db.pool, &id).await?;

    if let Some(name) = body.name {
        project.name = required_name(&name, "Project")?;
    }
    if let Some(budget) = body.budget {
        project.budget = validate_budget(budget)?;
    }
    if let Some(status) = body.status {
        project.status = parse_status(&status)?;
    }
    project.updated_at = Utc::now().to_rfc3339();

    sqlx::query("UPDATE projects SET name = ?, budget = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(&project.name)
        .bind(project.budget)
        .bind(project.status)
        .bind(&project.updated_at)
        .bind(&project.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(ProjectResponse {
        project,
        permission,
    }))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CascadeReport>> {
    // Only owner can delete project; an edit share is not enough
    let project = load_project(&state.db.pool, &id).await?;
    access::require_project_owner(&user.id, &project.user_id, "delete this project")?;

    let report = delete_project_cascade(&state.db.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    Ok(Json(report))
}

async fn project_estimate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProjectEstimateResponse>> {
    access::authorize_project(&state.db.pool, &id, &user.id, Access::Read).await?;
    let project = load_project(&state.db.pool, &id).await?;

    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT pr.*
        FROM products pr
        JOIN rooms r ON r.id = pr.room_id
        WHERE r.project_id = ?
        ORDER BY pr.created_at ASC
        "#,
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    let estimate = estimator::estimate(&products);

    Ok(Json(ProjectEstimateResponse {
        budget: project.budget,
        remaining_budget: project.budget - estimate.purchased_total,
        estimate,
    }))
}

// Share types
#[derive(Debug, Deserialize)]
pub struct AddShareRequest {
    pub email: String,
    pub permission: String, // "read" or "edit"
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub permission: SharePermission,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct SharesListResponse {
    pub shares: Vec<ShareResponse>,
}

#[derive(Debug, Deserialize)]
pub struct SharePathParams {
    pub id: String,
    pub user_id: String,
}

/// A project is never shared with its own owner.
pub(crate) fn check_share_target(owner_id: &str, target_id: &str) -> Result<()> {
    if owner_id == target_id {
        return Err(AppError::Validation(
            "Cannot share a project with yourself".to_string(),
        ));
    }
    Ok(())
}

async fn list_shares(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<SharesListResponse>> {
    let project = load_project(&state.db.pool, &project_id).await?;
    access::require_project_owner(&user.id, &project.user_id, "manage shares")?;

    let rows = sqlx::query_as::<_, (String, String, String, String, SharePermission, String)>(
        r#"
        SELECT u.id, u.email, u.first_name, u.last_name, s.permission_type, s.created_at
        FROM project_shares s
        JOIN users u ON s.shared_with_id = u.id
        WHERE s.project_id = ?
        ORDER BY u.last_name ASC, u.first_name ASC
        "#,
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    let shares = rows
        .into_iter()
        .map(
            |(user_id, email, first_name, last_name, permission, created_at)| ShareResponse {
                user_id,
                email,
                first_name,
                last_name,
                permission,
                created_at,
            },
        )
        .collect();

    Ok(Json(SharesListResponse { shares }))
}

async fn add_share(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<AddShareRequest>,
) -> Result<Json<ShareResponse>> {
    // Only owner can invite
    let project = load_project(&state.db.pool, &project_id).await?;
    access::require_project_owner(&user.id, &project.user_id, "manage shares")?;

    let permission: SharePermission =
        parse_field(&body.permission, "Permission must be 'read' or 'edit'")?;

    let target = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT id, email, first_name, last_name FROM users WHERE email = ?",
    )
    .bind(body.email.trim().to_lowercase())
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (target_id, email, first_name, last_name) = target;
    check_share_target(&project.user_id, &target_id)?;

    let now = Utc::now().to_rfc3339();

    // Re-inviting an existing grantee changes their permission
    sqlx::query(
        r#"
        INSERT INTO project_shares (id, project_id, owner_id, shared_with_id, permission_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (project_id, shared_with_id) DO UPDATE SET permission_type = excluded.permission_type
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&project_id)
    .bind(&project.user_id)
    .bind(&target_id)
    .bind(permission)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let share = sqlx::query_as::<_, ProjectShare>(
        "SELECT * FROM project_shares WHERE project_id = ? AND shared_with_id = ?",
    )
    .bind(&project_id)
    .bind(&target_id)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(%project_id, shared_with = %target_id, ?permission, "Project shared");

    Ok(Json(ShareResponse {
        user_id: share.shared_with_id,
        email,
        first_name,
        last_name,
        permission: share.permission_type,
        created_at: share.created_at,
    }))
}

async fn remove_share(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<SharePathParams>,
) -> Result<Json<()>> {
    let project = load_project(&state.db.pool, &params.id).await?;
    access::require_project_owner(&user.id, &project.user_id, "manage shares")?;

    let result =
        sqlx::query("DELETE FROM project_shares WHERE project_id = ? AND shared_with_id = ?")
            .bind(&params.id)
            .bind(&params.user_id)
            .execute(&state.db.pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Share not found".to_string()));
    }

    tracing::info!(project_id = %params.id, shared_with = %params.user_id, "Project share removed");

    Ok(Json(()))
}
