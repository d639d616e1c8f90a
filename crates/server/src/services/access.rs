//! Permission resolution for projects, rooms and products.
//!
//! Rooms and products resolve through their parent room and project: the
//! direct owner always has edit rights, then the owner of the parent project,
//! then whatever a project share grants. Handlers load [`AccessFacts`] with the
//! `*_facts` loaders and pass them to [`authorize`]; nothing here decides
//! anything ad hoc at a call site.

use std::fmt;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::models::SharePermission;

/// Effective permission of a user on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Edit,
    Read,
    Denied,
}

/// What an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Edit,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Read => "read",
            Access::Edit => "edit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Project,
    Room,
    Product,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Project => "Project",
            Entity::Room => "Room",
            Entity::Product => "Product",
        })
    }
}

impl Permission {
    pub fn allows(self, required: Access) -> bool {
        match self {
            Permission::Edit => true,
            Permission::Read => required == Access::Read,
            Permission::Denied => false,
        }
    }
}

impl From<SharePermission> for Permission {
    fn from(share: SharePermission) -> Self {
        match share {
            SharePermission::Read => Permission::Read,
            SharePermission::Edit => Permission::Edit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Caller identity required")]
    IdentityRequired,

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("You do not have {required} access to this {}", .entity.to_string().to_lowercase())]
    Denied { entity: Entity, required: Access },

    #[error("Only the project owner can {action}")]
    OwnerOnly { action: &'static str },
}

/// Ownership chain of a resource as seen by one subject.
///
/// For a project, `project_owner_id` is the project's own owner.
/// `share` is the subject's share on the parent project, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessFacts {
    pub resource_owner_id: String,
    pub project_owner_id: Option<String>,
    pub share: Option<SharePermission>,
}

pub fn resolve(subject: &str, facts: &AccessFacts) -> Permission {
    if subject == facts.resource_owner_id {
        return Permission::Edit;
    }

    let Some(project_owner) = facts.project_owner_id.as_deref() else {
        return Permission::Denied;
    };

    if subject == project_owner {
        return Permission::Edit;
    }

    facts.share.map_or(Permission::Denied, Permission::from)
}

pub fn authorize(
    subject: &str,
    facts: Option<&AccessFacts>,
    entity: Entity,
    required: Access,
) -> Result<Permission, AccessError> {
    if subject.trim().is_empty() {
        return Err(AccessError::IdentityRequired);
    }

    let facts = facts.ok_or(AccessError::NotFound(entity))?;
    let permission = resolve(subject, facts);

    if permission.allows(required) {
        Ok(permission)
    } else {
        Err(AccessError::Denied { entity, required })
    }
}

/// Deleting a project and managing its shares is never granted by a share.
pub fn require_project_owner(
    subject: &str,
    owner_id: &str,
    action: &'static str,
) -> Result<(), AccessError> {
    if subject.trim().is_empty() {
        return Err(AccessError::IdentityRequired);
    }
    if subject != owner_id {
        return Err(AccessError::OwnerOnly { action });
    }
    Ok(())
}

pub async fn project_facts(
    pool: &SqlitePool,
    project_id: &str,
    subject: &str,
) -> Result<Option<AccessFacts>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, Option<SharePermission>)>(
        r#"
        SELECT p.user_id, s.permission_type
        FROM projects p
        LEFT JOIN project_shares s ON s.project_id = p.id AND s.shared_with_id = ?
        WHERE p.id = ?
        "#,
    )
    .bind(subject)
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(owner_id, share)| AccessFacts {
        resource_owner_id: owner_id.clone(),
        project_owner_id: Some(owner_id),
        share,
    }))
}

pub async fn room_facts(
    pool: &SqlitePool,
    room_id: &str,
    subject: &str,
) -> Result<Option<AccessFacts>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, Option<String>, Option<SharePermission>)>(
        r#"
        SELECT r.user_id, p.user_id, s.permission_type
        FROM rooms r
        LEFT JOIN projects p ON p.id = r.project_id
        LEFT JOIN project_shares s ON s.project_id = r.project_id AND s.shared_with_id = ?
        WHERE r.id = ?
        "#,
    )
    .bind(subject)
    .bind(room_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(owner_id, project_owner_id, share)| AccessFacts {
        resource_owner_id: owner_id,
        project_owner_id,
        share,
    }))
}

/// A product is owned through its room.
pub async fn product_facts(
    pool: &SqlitePool,
    product_id: &str,
    subject: &str,
) -> Result<Option<AccessFacts>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, Option<String>, Option<SharePermission>)>(
        r#"
        SELECT r.user_id, p.user_id, s.permission_type
        FROM products pr
        JOIN rooms r ON r.id = pr.room_id
        LEFT JOIN projects p ON p.id = r.project_id
        LEFT JOIN project_shares s ON s.project_id = r.project_id AND s.shared_with_id = ?
        WHERE pr.id = ?
        "#,
    )
    .bind(subject)
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(owner_id, project_owner_id, share)| AccessFacts {
        resource_owner_id: owner_id,
        project_owner_id,
        share,
    }))
}

pub async fn authorize_project(
    pool: &SqlitePool,
    project_id: &str,
    subject: &str,
    required: Access,
) -> crate::error::Result<Permission> {
    let facts = project_facts(pool, project_id, subject).await?;
    Ok(authorize(subject, facts.as_ref(), Entity::Project, required)?)
}

pub async fn authorize_room(
    pool: &SqlitePool,
    room_id: &str,
    subject: &str,
    required: Access,
) -> crate::error::Result<Permission> {
    let facts = room_facts(pool, room_id, subject).await?;
    Ok(authorize(subject, facts.as_ref(), Entity::Room, required)?)
}

pub async fn authorize_product(
    pool: &SqlitePool,
    product_id: &str,
    subject: &str,
    required: Access,
) -> crate::error::Result<Permission> {
    let facts = product_facts(pool, product_id, subject).await?;
    Ok(authorize(subject, facts.as_ref(), Entity::Product, required)?)
}
