use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Planned,
    Purchased,
}

/// Level granted by a project share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    Read,
    Edit,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub budget: f64,
    pub status: ProjectStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectShare {
    pub id: String,
    pub project_id: String,
    pub owner_id: String,
    pub shared_with_id: String,
    pub permission_type: SharePermission,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Room {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub room_id: String,
    pub name: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub shop: Option<String>,
    pub price: f64,
    pub quantity: i64,
    pub category: Option<String>,
    pub status: ProductStatus,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&ProductStatus::Planned).unwrap();
        assert_eq!(json, "\"planned\"");
    }

    #[tokio::test]
    async fn enums_decode_from_stored_text() {
        let db = Database::in_memory().await;

        let status: ProjectStatus = sqlx::query_scalar("SELECT 'completed'")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(status, ProjectStatus::Completed);

        let share: Option<SharePermission> = sqlx::query_scalar("SELECT NULL")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(share, None);

        let stored = sqlx::query_scalar::<_, String>("SELECT ?")
            .bind(ProductStatus::Purchased)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(stored, "purchased");
    }

    #[tokio::test]
    async fn unknown_text_fails_to_decode() {
        let db = Database::in_memory().await;
        let result = sqlx::query_scalar::<_, SharePermission>("SELECT 'owner'")
            .fetch_one(&db.pool)
            .await;
        assert!(result.is_err());
    }
}
