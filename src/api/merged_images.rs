//! Merge Job Routes
//!
//! Merge jobs pair two uploads (the costumes) with two head images and a
//! background. A client typically creates a job with the first person,
//! fills in the rest with PATCH requests, then calls `merge`.
//!
//! All routes require a signed-in user and only expose their own jobs.
//!
//! Routes:
//! - GET /merged-images - List jobs (paginated, newest first)
//! - POST /merged-images - Create a job (multipart)
//! - GET /merged-images/travelled - Newest finished job per background (paginated)
//! - GET /merged-images/:id - Get a job
//! - PUT /merged-images/:id - Replace a job (omitted fields are cleared)
//! - PATCH /merged-images/:id - Update the given fields
//! - DELETE /merged-images/:id - Delete a job and its images
//! - GET /merged-images/:id/merge - Run the merge, then redirect to the job

use std::collections::HashSet;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};

use super::images::UploadResponse;
use super::pagination::{Page, PageParams};
use crate::db::{self, CreateMergeJob, MergeJob, Person};
use crate::middleware::AuthUser;
use crate::services::media;
use crate::{AppState, Error, Result};

/// Longest accepted background name.
const MAX_BACKGROUND_NAME_LEN: usize = 100;

/// Build merge job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_merge_jobs).post(create_merge_job))
        .route("/travelled", get(travelled))
        .route(
            "/:id",
            get(get_merge_job)
                .put(replace_merge_job)
                .patch(update_merge_job)
                .delete(delete_merge_job),
        )
        .route("/:id/merge", get(merge))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Merge job as returned by the API.
#[derive(Debug, Serialize)]
pub struct MergeJobResponse {
    pub id: i64,
    pub user: Option<String>,
    pub detail_url: String,
    pub background_name: Option<String>,
    pub result_image: Option<String>,
    pub person_1_head_image: Option<String>,
    pub person_2_head_image: Option<String>,
    pub person_1_identification: Option<i64>,
    pub person_2_identification: Option<i64>,
    pub person_1_identification_detail: Option<UploadResponse>,
    pub person_2_identification_detail: Option<UploadResponse>,
}

/// Absolute URL of a job's detail route.
pub fn detail_url(public_url: &str, id: i64) -> String {
    format!("{}/api/merged-images/{}/", public_url, id)
}

async fn to_response(state: &AppState, job: MergeJob) -> Result<MergeJobResponse> {
    let mut details = Vec::with_capacity(2);
    for person in Person::BOTH {
        let detail = match job.upload_id(person) {
            Some(id) => db::get_upload_optional(&state.db, id)
                .await?
                .map(|u| UploadResponse::new(u, &state.media)),
            None => None,
        };
        details.push(detail);
    }
    let person_2_detail = details.pop().flatten();
    let person_1_detail = details.pop().flatten();

    let url = |path: &Option<String>| path.as_deref().map(|p| state.media.url(p));

    Ok(MergeJobResponse {
        id: job.id,
        user: job.username.clone(),
        detail_url: detail_url(&state.public_url, job.id),
        background_name: job.background_name.clone(),
        result_image: url(&job.result_image),
        person_1_head_image: url(&job.person_1_head_image),
        person_2_head_image: url(&job.person_2_head_image),
        person_1_identification: job.person_1_upload_id,
        person_2_identification: job.person_2_upload_id,
        person_1_identification_detail: person_1_detail,
        person_2_identification_detail: person_2_detail,
    })
}

async fn to_page(state: &AppState, page: Page<MergeJob>) -> Result<Page<MergeJobResponse>> {
    let mut results = Vec::with_capacity(page.results.len());
    for job in page.results {
        results.push(to_response(state, job).await?);
    }
    Ok(Page {
        count: page.count,
        next: page.next,
        previous: page.previous,
        results,
    })
}

/// A head image file from the form.
#[derive(Debug)]
struct HeadImage {
    data: Bytes,
}

/// Fields sent in a create/update form.
///
/// The outer `Option` records whether the field was sent at all; the inner
/// one whether it was sent empty, which clears the value.
#[derive(Debug, Default)]
struct MergeJobForm {
    uploads: [Option<Option<i64>>; 2],
    heads: [Option<Option<HeadImage>>; 2],
    background_name: Option<Option<String>>,
}

fn slot_index(person: Person) -> usize {
    usize::from(person.slot() - 1)
}

fn field_person(name: &str, suffix: &str) -> Option<Person> {
    Person::BOTH
        .into_iter()
        .find(|p| name == format!("person_{}_{}", p.slot(), suffix))
}

impl MergeJobForm {
    /// Read the multipart body, validating every field.
    async fn parse(state: &AppState, mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            Error::InvalidInput(format!("Failed to read multipart field: {}", e))
        })? {
            let name = field.name().unwrap_or_default().to_string();

            if let Some(person) = field_person(&name, "identification") {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("Failed to read {}: {}", name, e)))?;
                let upload_id = parse_upload_ref(state, &name, &text).await?;
                form.uploads[slot_index(person)] = Some(upload_id);
            } else if let Some(person) = field_person(&name, "head_image") {
                let filename = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("Failed to read {}: {}", name, e)))?;

                // An empty value clears the image
                let head = if data.is_empty() {
                    None
                } else {
                    let filename = filename.unwrap_or_else(|| "head".into());
                    if data.len() > state.media.max_upload_size() {
                        return Err(Error::FileTooLarge {
                            max_size: state.media.max_upload_size(),
                        });
                    }
                    if !media::is_supported_image(content_type.as_deref(), &filename, &data) {
                        return Err(Error::InvalidFileType(format!(
                            "{} is not a valid image",
                            name
                        )));
                    }
                    Some(HeadImage { data })
                };
                form.heads[slot_index(person)] = Some(head);
            } else if name == "background_name" {
                let text = field.text().await.map_err(|e| {
                    Error::InvalidInput(format!("Failed to read background_name: {}", e))
                })?;
                let text = text.trim().to_string();
                if text.chars().count() > MAX_BACKGROUND_NAME_LEN {
                    return Err(Error::Validation(format!(
                        "background_name must be at most {} characters",
                        MAX_BACKGROUND_NAME_LEN
                    )));
                }
                form.background_name = Some((!text.is_empty()).then_some(text));
            } else {
                debug!(field = %name, "Ignoring unknown form field");
            }
        }

        Ok(form)
    }

    /// Turn fields that were not sent into explicit clears.
    fn fill_missing(&mut self) {
        for slot in 0..2 {
            self.uploads[slot].get_or_insert(None);
            if self.heads[slot].is_none() {
                self.heads[slot] = Some(None);
            }
        }
        self.background_name.get_or_insert(None);
    }
}

/// Parse an upload reference. Empty means none; unknown IDs are rejected.
async fn parse_upload_ref(state: &AppState, field: &str, text: &str) -> Result<Option<i64>> {
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Ok(None);
    }

    let id: i64 = text.parse().map_err(|_| {
        Error::Validation(format!("{}: incorrect type, expected pk value", field))
    })?;

    if db::get_upload_optional(&state.db, id).await?.is_none() {
        return Err(Error::Validation(format!(
            "{}: invalid pk \"{}\" - object does not exist",
            field, id
        )));
    }
    Ok(Some(id))
}

/// Apply a parsed form to a stored job: store new head images, drop
/// replaced ones and persist the row.
async fn apply_form(state: &AppState, mut job: MergeJob, form: MergeJobForm) -> Result<MergeJob> {
    let mut stale = Vec::new();

    for person in Person::BOTH {
        let slot = slot_index(person);

        if let Some(upload_id) = form.uploads[slot] {
            job.set_upload_id(person, upload_id);
        }

        let new_path = match &form.heads[slot] {
            None => continue,
            Some(None) => None,
            Some(Some(image)) => {
                let path = media::head_image_path(job.id, person, &image.data);
                state.media.save(&path, &image.data).await?;
                Some(path)
            }
        };

        if let Some(old) = job.head_image(person) {
            if new_path.as_deref() != Some(old) {
                stale.push(old.to_string());
            }
        }
        job.set_head_image(person, new_path);
    }

    if let Some(background_name) = form.background_name {
        job.background_name = background_name;
    }

    let saved = db::save_merge_job(&state.db, &job).await?;

    for path in stale {
        state.media.remove(&path).await;
    }

    Ok(saved)
}

// ============================================================================
// Handlers
// ============================================================================

/// List the caller's merge jobs.
///
/// GET /merged-images
#[axum::debug_handler]
async fn list_merge_jobs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<MergeJobResponse>>> {
    let count = db::count_merge_jobs(&state.db, auth.user_id).await?;
    let jobs = db::list_merge_jobs(
        &state.db,
        auth.user_id,
        params.limit() as i64,
        params.offset() as i64,
    )
    .await?;

    let base_url = format!("{}/api/merged-images/", state.public_url);
    let page = Page::new(count as usize, jobs, &params, &base_url);
    Ok(Json(to_page(&state, page).await?))
}

/// Create a merge job.
///
/// POST /merged-images
///
/// Every field is optional. The row is created first because head image
/// file names embed the job ID.
#[axum::debug_handler]
async fn create_merge_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MergeJobResponse>)> {
    let form = MergeJobForm::parse(&state, multipart).await?;

    let job = db::create_merge_job(
        &state.db,
        CreateMergeJob {
            user_id: Some(auth.user_id),
            person_1_upload_id: form.uploads[0].flatten(),
            person_2_upload_id: form.uploads[1].flatten(),
            background_name: form.background_name.clone().flatten(),
        },
    )
    .await?;

    let job = if form.heads.iter().any(|h| matches!(h, Some(Some(_)))) {
        apply_form(&state, job, form).await?
    } else {
        job
    };

    info!(job_id = job.id, user_id = auth.user_id, "Created merge job");
    Ok((StatusCode::CREATED, Json(to_response(&state, job).await?)))
}

/// Get a merge job.
///
/// GET /merged-images/:id
#[axum::debug_handler]
async fn get_merge_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MergeJobResponse>> {
    let job = db::get_user_merge_job(&state.db, id, auth.user_id).await?;
    Ok(Json(to_response(&state, job).await?))
}

/// Replace a merge job. Fields not sent are cleared.
///
/// PUT /merged-images/:id
#[axum::debug_handler]
async fn replace_merge_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<MergeJobResponse>> {
    let job = db::get_user_merge_job(&state.db, id, auth.user_id).await?;
    let mut form = MergeJobForm::parse(&state, multipart).await?;
    form.fill_missing();

    let job = apply_form(&state, job, form).await?;
    Ok(Json(to_response(&state, job).await?))
}

/// Update the fields that were sent.
///
/// PATCH /merged-images/:id
#[axum::debug_handler]
async fn update_merge_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<MergeJobResponse>> {
    let job = db::get_user_merge_job(&state.db, id, auth.user_id).await?;
    let form = MergeJobForm::parse(&state, multipart).await?;

    let job = apply_form(&state, job, form).await?;
    Ok(Json(to_response(&state, job).await?))
}

/// Delete a merge job and its images.
///
/// DELETE /merged-images/:id
#[axum::debug_handler]
async fn delete_merge_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    db::get_user_merge_job(&state.db, id, auth.user_id).await?;
    let job = db::delete_merge_job(&state.db, id).await?;

    let files = [
        job.person_1_head_image,
        job.person_2_head_image,
        job.result_image,
    ];
    for path in files.iter().flatten() {
        state.media.remove(path).await;
    }

    info!(job_id = id, "Deleted merge job");
    Ok(StatusCode::NO_CONTENT)
}

/// Run the merge pipeline for a job.
///
/// GET /merged-images/:id/merge
///
/// Redirects to the job on success. Jobs with missing inputs answer 409
/// without contacting any external service.
#[axum::debug_handler]
async fn merge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let job = db::get_user_merge_job(&state.db, id, auth.user_id).await?;
    state.pipeline.merge(&job).await?;

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, detail_url(&state.public_url, id))],
    ))
}

/// Newest finished job per background.
///
/// GET /merged-images/travelled
///
/// Only jobs whose result file still exists count.
#[axum::debug_handler]
async fn travelled(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<MergeJobResponse>>> {
    let jobs = db::list_merge_jobs_with_result(&state.db, auth.user_id).await?;
    let newest = newest_per_background(jobs, |path| state.media.exists(path));

    let base_url = format!("{}/api/merged-images/travelled/", state.public_url);
    let page = Page::paginate(newest, &params, &base_url);
    Ok(Json(to_page(&state, page).await?))
}

/// Keep the first job per background name among those whose result exists.
/// Input order is preserved, so newest-first input gives the newest job.
fn newest_per_background(
    jobs: Vec<MergeJob>,
    result_exists: impl Fn(&str) -> bool,
) -> Vec<MergeJob> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| {
            job.result_image
                .as_deref()
                .is_some_and(|path| result_exists(path))
        })
        .filter(|job| seen.insert(job.background_name.clone()))
        .collect()
}
