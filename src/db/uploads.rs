//! Upload database queries.
//!
//! An upload is a portrait photo plus the costume labels the classifier
//! predicted for it, the label the user corrected it to, and their feedback.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{is_foreign_key_violation, DbPool, Owner};
use crate::{Error, Result};

/// Upload record joined with its owner's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Upload {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    /// Media-relative path of the stored photo.
    pub upload_image: String,
    pub nation1: Option<String>,
    pub nation2: Option<String>,
    pub nation3: Option<String>,
    pub modified_nation: Option<String>,
    pub time_consuming: Option<String>,
    pub user_assess: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Input for creating a new upload.
#[derive(Debug, Clone, Default)]
pub struct CreateUpload {
    pub user_id: Option<i64>,
    pub upload_image: String,
    pub nation1: Option<String>,
    pub nation2: Option<String>,
    pub nation3: Option<String>,
    pub time_consuming: Option<String>,
}

const SELECT_UPLOAD: &str = r#"
    SELECT up.*, us.username AS username
    FROM uploads up
    LEFT JOIN users us ON us.id = up.user_id
"#;

/// Create a new upload.
pub async fn create_upload(pool: &DbPool, input: CreateUpload) -> Result<Upload> {
    let now = Utc::now();
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO uploads (user_id, upload_image, nation1, nation2, nation3, time_consuming,
                             created_at, modified_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(input.user_id)
    .bind(&input.upload_image)
    .bind(&input.nation1)
    .bind(&input.nation2)
    .bind(&input.nation3)
    .bind(&input.time_consuming)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    get_upload(pool, id).await
}

/// Get an upload by ID regardless of owner.
pub async fn get_upload(pool: &DbPool, id: i64) -> Result<Upload> {
    get_upload_optional(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Upload not found: {}", id)))
}

/// Get an upload by ID (optional).
pub async fn get_upload_optional(pool: &DbPool, id: i64) -> Result<Option<Upload>> {
    sqlx::query_as::<_, Upload>(&format!("{} WHERE up.id = ?", SELECT_UPLOAD))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)
}

/// Get an upload visible to `owner`. Rows owned by someone else are reported as missing.
pub async fn get_owned_upload(pool: &DbPool, id: i64, owner: Owner) -> Result<Upload> {
    sqlx::query_as::<_, Upload>(&format!(
        "{} WHERE up.id = ? AND up.user_id IS ?",
        SELECT_UPLOAD
    ))
    .bind(id)
    .bind(owner.user_id())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Upload not found: {}", id)))
}

/// List uploads visible to `owner`, newest first.
pub async fn list_uploads(
    pool: &DbPool,
    owner: Owner,
    limit: Option<i64>,
    offset: i64,
) -> Result<Vec<Upload>> {
    sqlx::query_as::<_, Upload>(&format!(
        r#"
        {}
        WHERE up.user_id IS ?
        ORDER BY up.created_at DESC, up.id DESC
        LIMIT ? OFFSET ?
        "#,
        SELECT_UPLOAD
    ))
    .bind(owner.user_id())
    .bind(limit.unwrap_or(-1))
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Record the label the user corrected the prediction to.
pub async fn set_modified_nation(pool: &DbPool, id: i64, name: &str) -> Result<Upload> {
    sqlx::query("UPDATE uploads SET modified_nation = ?, modified_at = ? WHERE id = ?")
        .bind(name)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    get_upload(pool, id).await
}

/// Record the user's feedback on the prediction.
pub async fn set_user_assess(pool: &DbPool, id: i64, assess: &str) -> Result<Upload> {
    sqlx::query("UPDATE uploads SET user_assess = ?, modified_at = ? WHERE id = ?")
        .bind(assess)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    get_upload(pool, id).await
}

/// Count merge jobs that reference an upload as either person.
pub async fn count_upload_references(pool: &DbPool, id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM merge_jobs WHERE person_1_upload_id = ? OR person_2_upload_id = ?",
    )
    .bind(id)
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Delete an upload by ID.
///
/// Uploads still referenced by a merge job are protected.
/// Note: This only deletes the database record, not the file.
pub async fn delete_upload(pool: &DbPool, id: i64) -> Result<Upload> {
    let upload = get_upload(pool, id).await?;

    let references = count_upload_references(pool, id).await?;
    if references > 0 {
        return Err(Error::Conflict(format!(
            "Upload {} is used by {} merge job(s)",
            id, references
        )));
    }

    remove_upload_row(pool, id).await?;

    Ok(upload)
}

/// Delete an upload row. A merge job created after the reference check
/// still blocks the delete through its RESTRICT foreign key.
async fn remove_upload_row(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM uploads WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::Conflict(format!("Upload {} is used by a merge job", id))
            } else {
                Error::Database(e)
            }
        })?;

    Ok(())
}
