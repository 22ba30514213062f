//! Face geometry exchanged with the face-merge API.

use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRectangle {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRectangle {
    /// Wire form expected by the merge endpoint: `top,left,width,height`.
    pub fn to_param(&self) -> String {
        format!("{},{},{},{}", self.top, self.left, self.width, self.height)
    }
}
