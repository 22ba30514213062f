//! Merge pipeline.
//!
//! Turns a merge job into a composited picture:
//! 1. check every input exists (both uploads, both head images, the background)
//! 2. per person: put the head's face onto the costume photo, cut the person out
//! 3. paste both people onto the background and encode PNG
//!
//! Nothing external is called until step 1 has passed.

use std::sync::Arc;

use image::{RgbImage, RgbaImage};
use tracing::{debug, info};

use crate::db::{self, DbPool, MergeJob, Person};
use crate::models::Background;
use crate::services::compositor;
use crate::services::face_api::FaceMerger;
use crate::services::media::{self, MediaStorage};
use crate::services::segmentation::Segmenter;
use crate::{Error, Result};

/// Media-relative inputs of one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeInputs {
    /// Costume photo per person.
    pub clothes: [String; 2],
    /// Head image per person.
    pub heads: [String; 2],
    pub background: Background,
}

/// Runs merge jobs against the face-merge API and segmentation model.
#[derive(Clone)]
pub struct MergePipeline {
    db: DbPool,
    media: Arc<MediaStorage>,
    face: Arc<dyn FaceMerger>,
    segmenter: Arc<dyn Segmenter>,
    merge_rate: u8,
}

impl MergePipeline {
    pub fn new(
        db: DbPool,
        media: Arc<MediaStorage>,
        face: Arc<dyn FaceMerger>,
        segmenter: Arc<dyn Segmenter>,
        merge_rate: u8,
    ) -> Self {
        Self {
            db,
            media,
            face,
            segmenter,
            merge_rate,
        }
    }

    /// Resolve and check the inputs of a job.
    ///
    /// Any missing reference, file or unknown background makes the job
    /// unavailable.
    pub async fn prepare(&self, job: &MergeJob) -> Result<MergeInputs> {
        let unavailable = || Error::MergeUnavailable(job.id);

        let background: Background = job
            .background_name
            .as_deref()
            .ok_or_else(unavailable)?
            .parse()
            .map_err(|_| unavailable())?;
        if !self.media.exists(&background.relative_path()) {
            debug!(job_id = job.id, background = %background, "Background file missing");
            return Err(unavailable());
        }

        let mut clothes = Vec::with_capacity(2);
        let mut heads = Vec::with_capacity(2);
        for person in Person::BOTH {
            let upload_id = job.upload_id(person).ok_or_else(unavailable)?;
            let upload = db::get_upload_optional(&self.db, upload_id)
                .await?
                .ok_or_else(unavailable)?;
            let head = job.head_image(person).ok_or_else(unavailable)?;

            for path in [upload.upload_image.as_str(), head] {
                if !self.media.exists(path) {
                    debug!(job_id = job.id, path, "Merge input missing");
                    return Err(unavailable());
                }
            }

            clothes.push(upload.upload_image);
            heads.push(head.to_string());
        }

        Ok(MergeInputs {
            clothes: [clothes.remove(0), clothes.remove(0)],
            heads: [heads.remove(0), heads.remove(0)],
            background,
        })
    }

    /// Face-merge the head onto the costume photo, then cut the person out.
    async fn extract_person(&self, clothes: &str, head: &str) -> Result<RgbaImage> {
        let template = self.media.read(clothes).await?;
        let face = self.media.read(head).await?;

        let merged = self
            .face
            .merge_face(&template, &face, self.merge_rate)
            .await?;
        self.segmenter.segment(&merged).await
    }

    /// Run the pipeline and return the composited PNG.
    pub async fn render(&self, job: &MergeJob) -> Result<Vec<u8>> {
        let inputs = self.prepare(job).await?;

        let first = self
            .extract_person(&inputs.clothes[0], &inputs.heads[0])
            .await?;
        let second = self
            .extract_person(&inputs.clothes[1], &inputs.heads[1])
            .await?;

        let background_bytes = self.media.read(&inputs.background.relative_path()).await?;

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let background: RgbImage = image::load_from_memory(&background_bytes)?.to_rgb8();
            let composite = compositor::composite_pair(&background, &first, &second);
            compositor::encode_png(&composite)
        })
        .await
        .map_err(|e| Error::Internal(format!("Compositing task failed: {}", e)))?
    }

    /// Run the pipeline, store the result and record it on the job.
    pub async fn merge(&self, job: &MergeJob) -> Result<MergeJob> {
        let png = self.render(job).await?;

        let path = media::result_image_path(job.id);
        self.media.save(&path, &png).await?;
        let updated = db::set_result_image(&self.db, job.id, &path).await?;

        info!(job_id = job.id, path = %path, bytes = png.len(), "Merge complete");
        Ok(updated)
    }
}
