//! Ordered deletes for projects and rooms.
//!
//! The schema cascades on its own, but deletes are issued explicitly
//! child-first inside one transaction. The first failing step aborts the
//! whole delete and is named in the error.

use std::fmt;

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    Begin,
    Products,
    Rooms,
    Shares,
    Project,
    Room,
    Commit,
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CascadeStep::Begin => "begin",
            CascadeStep::Products => "products",
            CascadeStep::Rooms => "rooms",
            CascadeStep::Shares => "shares",
            CascadeStep::Project => "project",
            CascadeStep::Room => "room",
            CascadeStep::Commit => "commit",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Delete failed at step '{step}': {source}")]
pub struct CascadeError {
    pub step: CascadeStep,
    #[source]
    pub source: sqlx::Error,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub products: u64,
    pub rooms: u64,
    pub shares: u64,
}

trait StepExt<T> {
    fn at(self, step: CascadeStep) -> Result<T, CascadeError>;
}

impl<T> StepExt<T> for Result<T, sqlx::Error> {
    fn at(self, step: CascadeStep) -> Result<T, CascadeError> {
        self.map_err(|source| CascadeError { step, source })
    }
}

async fn run_step(
    tx: &mut Transaction<'_, Sqlite>,
    step: CascadeStep,
    sql: &str,
    id: &str,
) -> Result<u64, CascadeError> {
    let affected = sqlx::query(sql)
        .bind(id)
        .execute(&mut **tx)
        .await
        .at(step)?
        .rows_affected();
    tracing::debug!(%step, id, affected, "Cascade step done");
    Ok(affected)
}

/// Deletes products, rooms, shares and finally the project row.
///
/// Returns `Ok(None)` if the project row did not exist.
pub async fn delete_project_cascade(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Option<CascadeReport>, CascadeError> {
    let mut tx = pool.begin().await.at(CascadeStep::Begin)?;

    let products = run_step(
        &mut tx,
        CascadeStep::Products,
        "DELETE FROM products WHERE room_id IN (SELECT id FROM rooms WHERE project_id = ?)",
        project_id,
    )
    .await?;
    let rooms = run_step(
        &mut tx,
        CascadeStep::Rooms,
        "DELETE FROM rooms WHERE project_id = ?",
        project_id,
    )
    .await?;
    let shares = run_step(
        &mut tx,
        CascadeStep::Shares,
        "DELETE FROM project_shares WHERE project_id = ?",
        project_id,
    )
    .await?;
    let deleted = run_step(
        &mut tx,
        CascadeStep::Project,
        "DELETE FROM projects WHERE id = ?",
        project_id,
    )
    .await?;

    if deleted == 0 {
        tx.rollback().await.at(CascadeStep::Commit)?;
        return Ok(None);
    }

    tx.commit().await.at(CascadeStep::Commit)?;

    let report = CascadeReport {
        products,
        rooms,
        shares,
    };
    tracing::info!(project_id, ?report, "Project deleted");
    Ok(Some(report))
}

/// Deletes a room's products, then the room. Returns the product count.
pub async fn delete_room_cascade(pool: &SqlitePool, room_id: &str) -> Result<u64, CascadeError> {
    let mut tx = pool.begin().await.at(CascadeStep::Begin)?;

    let products = run_step(
        &mut tx,
        CascadeStep::Products,
        "DELETE FROM products WHERE room_id = ?",
        room_id,
    )
    .await?;
    run_step(
        &mut tx,
        CascadeStep::Room,
        "DELETE FROM rooms WHERE id = ?",
        room_id,
    )
    .await?;

    tx.commit().await.at(CascadeStep::Commit)?;
    Ok(products)
}
