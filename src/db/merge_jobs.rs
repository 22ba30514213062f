//! Merge job database queries.
//!
//! A merge job records what one face-merge composite needs: the two uploads
//! whose costumes are used, two head images, and a background. Jobs are
//! created nearly empty, filled in by later edits, and receive their
//! `result_image` once the merge pipeline has run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{is_foreign_key_violation, DbPool};
use crate::{Error, Result};

/// Merge job record joined with its owner's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MergeJob {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub person_1_upload_id: Option<i64>,
    pub person_1_head_image: Option<String>,
    pub person_2_upload_id: Option<i64>,
    pub person_2_head_image: Option<String>,
    pub background_name: Option<String>,
    pub result_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl MergeJob {
    /// Upload used as the clothed template for a person (1 or 2).
    pub fn upload_id(&self, person: Person) -> Option<i64> {
        match person {
            Person::First => self.person_1_upload_id,
            Person::Second => self.person_2_upload_id,
        }
    }

    /// Stored head image for a person.
    pub fn head_image(&self, person: Person) -> Option<&str> {
        match person {
            Person::First => self.person_1_head_image.as_deref(),
            Person::Second => self.person_2_head_image.as_deref(),
        }
    }

    pub fn set_upload_id(&mut self, person: Person, upload_id: Option<i64>) {
        match person {
            Person::First => self.person_1_upload_id = upload_id,
            Person::Second => self.person_2_upload_id = upload_id,
        }
    }

    pub fn set_head_image(&mut self, person: Person, path: Option<String>) {
        match person {
            Person::First => self.person_1_head_image = path,
            Person::Second => self.person_2_head_image = path,
        }
    }
}

/// One of the two people in a merge job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Person {
    First,
    Second,
}

impl Person {
    pub const BOTH: [Person; 2] = [Person::First, Person::Second];

    /// 1-based slot number used in field and file names.
    pub fn slot(self) -> u8 {
        match self {
            Person::First => 1,
            Person::Second => 2,
        }
    }
}

/// Input for creating a new merge job. Head images are attached after the
/// row exists, since their file names embed the job ID.
#[derive(Debug, Clone, Default)]
pub struct CreateMergeJob {
    pub user_id: Option<i64>,
    pub person_1_upload_id: Option<i64>,
    pub person_2_upload_id: Option<i64>,
    pub background_name: Option<String>,
}

const SELECT_MERGE_JOB: &str = r#"
    SELECT mj.*, us.username AS username
    FROM merge_jobs mj
    LEFT JOIN users us ON us.id = mj.user_id
"#;

/// Create a new merge job.
pub async fn create_merge_job(pool: &DbPool, input: CreateMergeJob) -> Result<MergeJob> {
    let now = Utc::now();
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO merge_jobs (user_id, person_1_upload_id, person_2_upload_id, background_name,
                                created_at, modified_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(input.user_id)
    .bind(input.person_1_upload_id)
    .bind(input.person_2_upload_id)
    .bind(&input.background_name)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(missing_reference)?;

    get_merge_job(pool, id).await
}

/// Get a merge job by ID regardless of owner.
pub async fn get_merge_job(pool: &DbPool, id: i64) -> Result<MergeJob> {
    sqlx::query_as::<_, MergeJob>(&format!("{} WHERE mj.id = ?", SELECT_MERGE_JOB))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Merge job not found: {}", id)))
}

/// Get a merge job owned by `user_id`. Other users' jobs are reported as missing.
pub async fn get_user_merge_job(pool: &DbPool, id: i64, user_id: i64) -> Result<MergeJob> {
    sqlx::query_as::<_, MergeJob>(&format!(
        "{} WHERE mj.id = ? AND mj.user_id = ?",
        SELECT_MERGE_JOB
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Merge job not found: {}", id)))
}

/// List a user's merge jobs, newest (highest ID) first.
pub async fn list_merge_jobs(
    pool: &DbPool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<MergeJob>> {
    sqlx::query_as::<_, MergeJob>(&format!(
        r#"
        {}
        WHERE mj.user_id = ?
        ORDER BY mj.id DESC
        LIMIT ? OFFSET ?
        "#,
        SELECT_MERGE_JOB
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Count a user's merge jobs.
pub async fn count_merge_jobs(pool: &DbPool, user_id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM merge_jobs WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// List a user's merge jobs that have a result image, newest first.
pub async fn list_merge_jobs_with_result(pool: &DbPool, user_id: i64) -> Result<Vec<MergeJob>> {
    sqlx::query_as::<_, MergeJob>(&format!(
        r#"
        {}
        WHERE mj.user_id = ? AND mj.result_image IS NOT NULL
        ORDER BY mj.id DESC
        "#,
        SELECT_MERGE_JOB
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)
}

/// Persist every editable column of a merge job.
pub async fn save_merge_job(pool: &DbPool, job: &MergeJob) -> Result<MergeJob> {
    let result = sqlx::query(
        r#"
        UPDATE merge_jobs
        SET person_1_upload_id = ?, person_1_head_image = ?,
            person_2_upload_id = ?, person_2_head_image = ?,
            background_name = ?, result_image = ?, modified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(job.person_1_upload_id)
    .bind(&job.person_1_head_image)
    .bind(job.person_2_upload_id)
    .bind(&job.person_2_head_image)
    .bind(&job.background_name)
    .bind(&job.result_image)
    .bind(Utc::now())
    .bind(job.id)
    .execute(pool)
    .await
    .map_err(missing_reference)?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Merge job not found: {}", job.id)));
    }

    get_merge_job(pool, job.id).await
}

/// A referenced upload or user was deleted between validation and write.
fn missing_reference(err: sqlx::Error) -> Error {
    if is_foreign_key_violation(&err) {
        Error::InvalidInput("Referenced upload no longer exists".to_string())
    } else {
        Error::Database(err)
    }
}

/// Record the composited result of a merge job.
pub async fn set_result_image(pool: &DbPool, id: i64, path: &str) -> Result<MergeJob> {
    sqlx::query("UPDATE merge_jobs SET result_image = ?, modified_at = ? WHERE id = ?")
        .bind(path)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    get_merge_job(pool, id).await
}

/// Delete a merge job by ID.
/// Note: This only deletes the database record, not its files.
pub async fn delete_merge_job(pool: &DbPool, id: i64) -> Result<MergeJob> {
    let job = get_merge_job(pool, id).await?;

    sqlx::query("DELETE FROM merge_jobs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_upload, create_user, init_pool, initialize_schema, CreateUpload, CreateUser};

    async fn setup() -> (DbPool, i64) {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        let user = create_user(
            &pool,
            CreateUser {
                username: "mei".to_string(),
                password_hash: "hash".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();
        (pool, user.id)
    }

    #[tokio::test]
    async fn test_create_and_fill_merge_job() {
        let (pool, user_id) = setup().await;
        let upload = create_upload(
            &pool,
            CreateUpload {
                upload_image: "upload_images/Miao/a.png".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let job = create_merge_job(
            &pool,
            CreateMergeJob {
                user_id: Some(user_id),
                person_1_upload_id: Some(upload.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(job.username.as_deref(), Some("mei"));
        assert_eq!(job.upload_id(Person::First), Some(upload.id));
        assert_eq!(job.upload_id(Person::Second), None);
        assert!(job.result_image.is_none());

        let mut edited = job.clone();
        edited.set_head_image(Person::Second, Some("merge-image/merged-1-head-2.png".into()));
        edited.background_name = Some("bg3".to_string());
        let saved = save_merge_job(&pool, &edited).await.unwrap();
        assert_eq!(saved.head_image(Person::Second), Some("merge-image/merged-1-head-2.png"));
        assert_eq!(saved.background_name.as_deref(), Some("bg3"));

        let done = set_result_image(&pool, job.id, "merge-image/merged-1-merged.png")
            .await
            .unwrap();
        assert_eq!(done.result_image.as_deref(), Some("merge-image/merged-1-merged.png"));
    }

    #[tokio::test]
    async fn test_jobs_scoped_to_owner() {
        let (pool, user_id) = setup().await;
        let other = create_user(
            &pool,
            CreateUser {
                username: "tao".to_string(),
                password_hash: "hash".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();

        let first = create_merge_job(&pool, CreateMergeJob { user_id: Some(user_id), ..Default::default() })
            .await
            .unwrap();
        let second = create_merge_job(&pool, CreateMergeJob { user_id: Some(user_id), ..Default::default() })
            .await
            .unwrap();
        create_merge_job(&pool, CreateMergeJob { user_id: Some(other.id), ..Default::default() })
            .await
            .unwrap();

        let listed = list_merge_jobs(&pool, user_id, 50, 0).await.unwrap();
        assert_eq!(listed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(count_merge_jobs(&pool, user_id).await.unwrap(), 2);

        assert!(get_user_merge_job(&pool, first.id, other.id).await.is_err());
        assert!(get_user_merge_job(&pool, first.id, user_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_with_result_skips_pending_jobs() {
        let (pool, user_id) = setup().await;
        let pending = create_merge_job(&pool, CreateMergeJob { user_id: Some(user_id), ..Default::default() })
            .await
            .unwrap();
        let done = create_merge_job(&pool, CreateMergeJob { user_id: Some(user_id), ..Default::default() })
            .await
            .unwrap();
        set_result_image(&pool, done.id, "merge-image/out.png").await.unwrap();

        let with_result = list_merge_jobs_with_result(&pool, user_id).await.unwrap();
        assert_eq!(with_result.iter().map(|j| j.id).collect::<Vec<_>>(), vec![done.id]);

        delete_merge_job(&pool, pending.id).await.unwrap();
        assert!(get_merge_job(&pool, pending.id).await.is_err());
    }

    #[tokio::test]
    async fn test_vanished_upload_is_invalid_input() {
        let (pool, user_id) = setup().await;

        let err = create_merge_job(
            &pool,
            CreateMergeJob {
                user_id: Some(user_id),
                person_2_upload_id: Some(404),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let mut job = create_merge_job(&pool, CreateMergeJob { user_id: Some(user_id), ..Default::default() })
            .await
            .unwrap();
        job.person_1_upload_id = Some(404);
        let err = save_merge_job(&pool, &job).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
