//! Service layer for the costume studio backend.
//!
//! Contains business logic and external service integrations:
//! - Media (filesystem storage under the media root)
//! - Classifier (costume classification model service)
//! - FaceApi (Face++ detect and mergeface)
//! - Segmentation (portrait cut-out model service)
//! - Compositor (alpha blending onto backgrounds)
//! - Pipeline (merge job orchestration)
//! - Auth (password hashing and JWT issuance)

mod auth;
pub mod classifier;
pub mod compositor;
pub mod face_api;
pub mod media;
mod pipeline;
pub mod segmentation;

pub use auth::{AuthService, Claims, Registration, TokenKind, TokenPair, MIN_PASSWORD_LEN};
pub use classifier::{Classification, Classifier, HttpClassifier, ScoredLabel};
pub use face_api::{FaceMerger, FacePlusPlus};
pub use media::MediaStorage;
pub use pipeline::{MergeInputs, MergePipeline};
pub use segmentation::{HumanSegService, Segmenter};
