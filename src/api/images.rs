//! Upload Routes
//!
//! Portrait uploads and their costume classification. Anonymous callers
//! may use every route; they only ever see uploads without an owner.
//!
//! Routes:
//! - GET /images - List the caller's uploads, newest first
//! - POST /images - Upload and classify a photo
//! - GET /images/:id - Get an upload
//! - DELETE /images/:id - Delete an upload
//! - GET /images/:id/change-nation?name= - Correct the predicted label
//! - GET /images/:id/user-assess?assess= - Leave feedback on the prediction

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{self, CreateUpload, Upload};
use crate::middleware::{owner_of, AuthUser};
use crate::services::{classifier, media, MediaStorage};
use crate::{AppState, Error, Result};

/// Multipart field carrying the photo.
const FILE_FIELD: &str = "upload_images";

/// Longest label stored with an upload.
pub const MAX_NATION_LEN: usize = 20;

/// Longest feedback text stored with an upload.
pub const MAX_ASSESS_LEN: usize = 50;

/// Build upload routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_uploads).post(create_upload))
        .route("/:id", get(get_upload).delete(delete_upload))
        .route("/:id/change-nation", get(change_nation))
        .route("/:id/user-assess", get(user_assess))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListUploadsQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChangeNationQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserAssessQuery {
    pub assess: Option<String>,
}

/// Upload as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub id: i64,
    /// Owner's username, null for anonymous uploads.
    pub user: Option<String>,
    /// Absolute URL of the stored photo.
    pub upload_images: String,
    pub nation1: Option<String>,
    pub nation2: Option<String>,
    pub nation3: Option<String>,
    pub modified_nation: Option<String>,
    pub time_consuming: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl UploadResponse {
    pub fn new(upload: Upload, media: &MediaStorage) -> Self {
        Self {
            id: upload.id,
            user: upload.username,
            upload_images: media.url(&upload.upload_image),
            nation1: upload.nation1,
            nation2: upload.nation2,
            nation3: upload.nation3,
            modified_nation: upload.modified_nation,
            time_consuming: upload.time_consuming,
            created: upload.created_at,
            modified: upload.modified_at,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Read a required text query parameter, enforcing a length limit.
fn required_param(value: Option<String>, name: &str, max: usize) -> Result<String> {
    let value = value.ok_or_else(|| Error::Validation(format!("Parameter {} is required", name)))?;
    if value.chars().count() > max {
        return Err(Error::Validation(format!(
            "Parameter {} must be at most {} characters",
            name, max
        )));
    }
    Ok(value)
}

// ============================================================================
// Handlers
// ============================================================================

/// List the caller's uploads.
///
/// GET /images
///
/// Newest first. `limit` and `offset` are optional; without `limit` every
/// upload is returned.
#[axum::debug_handler]
async fn list_uploads(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Query(query): Query<ListUploadsQuery>,
) -> Result<Json<Vec<UploadResponse>>> {
    let uploads = db::list_uploads(
        &state.db,
        owner_of(&user),
        query.limit.filter(|l| *l >= 0),
        query.offset.max(0),
    )
    .await?;

    Ok(Json(
        uploads
            .into_iter()
            .map(|u| UploadResponse::new(u, &state.media))
            .collect(),
    ))
}

/// Upload and classify a photo.
///
/// POST /images
///
/// Accepts multipart/form-data with the photo in the `upload_images` field.
/// The photo is stored in a folder named after its best label.
#[axum::debug_handler]
async fn create_upload(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        Error::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload".into());
        let content_type = field.content_type().map(|s| s.to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("Failed to read file: {}", e)))?;

        if data.is_empty() {
            return Err(Error::Validation("The submitted file is empty".into()));
        }
        if data.len() > state.media.max_upload_size() {
            return Err(Error::FileTooLarge {
                max_size: state.media.max_upload_size(),
            });
        }
        if !media::is_supported_image(content_type.as_deref(), &filename, &data) {
            return Err(Error::InvalidFileType(
                content_type.unwrap_or_else(|| filename.clone()),
            ));
        }

        let result = classifier::classify(state.classifier.as_ref(), &data).await?;
        let nation = |rank: usize| result.label(rank).map(|l| truncate_chars(&l, MAX_NATION_LEN));

        let path = media::upload_image_path(result.labels.first().map(String::as_str), &data);
        state.media.save(&path, &data).await?;

        let owner = owner_of(&user);
        let upload = db::create_upload(
            &state.db,
            CreateUpload {
                user_id: owner.user_id(),
                upload_image: path,
                nation1: nation(0),
                nation2: nation(1),
                nation3: nation(2),
                time_consuming: Some(result.time_consuming()),
            },
        )
        .await?;

        info!(
            upload_id = upload.id,
            nation = upload.nation1.as_deref().unwrap_or("-"),
            "Classified upload"
        );

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse::new(upload, &state.media)),
        ));
    }

    Err(Error::Validation(format!("No file was submitted in field {}", FILE_FIELD)))
}

/// Get an upload.
///
/// GET /images/:id
#[axum::debug_handler]
async fn get_upload(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<i64>,
) -> Result<Json<UploadResponse>> {
    let upload = db::get_owned_upload(&state.db, id, owner_of(&user)).await?;
    Ok(Json(UploadResponse::new(upload, &state.media)))
}

/// Delete an upload and its photo.
///
/// DELETE /images/:id
///
/// Uploads used by a merge job cannot be deleted.
#[axum::debug_handler]
async fn delete_upload(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    db::get_owned_upload(&state.db, id, owner_of(&user)).await?;
    let upload = db::delete_upload(&state.db, id).await?;
    state.media.remove(&upload.upload_image).await;

    info!(upload_id = id, "Deleted upload");
    Ok(StatusCode::NO_CONTENT)
}

/// Correct the predicted label.
///
/// GET /images/:id/change-nation?name=
#[axum::debug_handler]
async fn change_nation(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<i64>,
    Query(query): Query<ChangeNationQuery>,
) -> Result<Json<UploadResponse>> {
    db::get_owned_upload(&state.db, id, owner_of(&user)).await?;
    let name = required_param(query.name, "name", MAX_NATION_LEN)?;

    let upload = db::set_modified_nation(&state.db, id, &name).await?;
    Ok(Json(UploadResponse::new(upload, &state.media)))
}

/// Leave feedback on the prediction.
///
/// GET /images/:id/user-assess?assess=
#[axum::debug_handler]
async fn user_assess(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(id): Path<i64>,
    Query(query): Query<UserAssessQuery>,
) -> Result<Json<UploadResponse>> {
    db::get_owned_upload(&state.db, id, owner_of(&user)).await?;
    let assess = required_param(query.assess, "assess", MAX_ASSESS_LEN)?;

    let upload = db::set_user_assess(&state.db, id, &assess).await?;
    Ok(Json(UploadResponse::new(upload, &state.media)))
}
