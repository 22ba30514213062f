//! Application state for the costume studio backend.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::{
    AuthService, Classifier, FaceMerger, FacePlusPlus, HttpClassifier, HumanSegService,
    MediaStorage, MergePipeline, Segmenter,
};
use crate::{config, Result};

/// The model and face-merge services the backend calls out to.
#[derive(Clone)]
pub struct Backends {
    pub classifier: Arc<dyn Classifier>,
    pub face: Arc<dyn FaceMerger>,
    pub segmenter: Arc<dyn Segmenter>,
}

impl Backends {
    /// HTTP clients for the configured endpoints.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.models.timeout_secs);

        Ok(Self {
            classifier: Arc::new(HttpClassifier::new(&config.models.classifier_url, timeout)?),
            face: Arc::new(FacePlusPlus::new(&config.face_api, timeout)?),
            segmenter: Arc::new(HumanSegService::new(&config.models.humanseg_url, timeout)?),
        })
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: DbPool,
    /// Uploaded photos, head images, backgrounds and results.
    pub media: Arc<MediaStorage>,
    /// Registration, passwords and tokens.
    pub auth: AuthService,
    /// Costume classifier.
    pub classifier: Arc<dyn Classifier>,
    /// Merge job runner.
    pub pipeline: MergePipeline,
    /// Base URL for absolute links, without a trailing slash.
    pub public_url: String,
}

impl AppState {
    /// Create a new application state, initializing all services.
    pub async fn new() -> Result<Self> {
        let config = config::config();

        // Initialize database
        let db = crate::db::init_pool(&config.database.path).await?;

        // Initialize database schema
        crate::db::initialize_schema(&db).await?;

        let backends = Backends::from_config(config)?;
        Ok(Self::from_parts(db, config, backends))
    }

    /// Assemble the state from an open database and chosen backends.
    pub fn from_parts(db: DbPool, config: &Config, backends: Backends) -> Self {
        let public_url = config.server.public_url.trim_end_matches('/').to_string();
        let media = Arc::new(MediaStorage::new(&config.media, &public_url));
        let auth = AuthService::new(db.clone(), &config.auth);

        let pipeline = MergePipeline::new(
            db.clone(),
            media.clone(),
            backends.face,
            backends.segmenter,
            config.face_api.merge_rate,
        );

        Self {
            db,
            media,
            auth,
            classifier: backends.classifier,
            pipeline,
            public_url,
        }
    }
}
