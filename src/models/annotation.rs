use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageType {
    NotImage,
    Jpeg,
    Png,
    StaticWebp,
    AnimatedWebp,
}

impl ImageType {
    /// Animated WebPs are recognised but never indexed.
    pub fn is_indexable(self) -> bool {
        matches!(self, ImageType::Jpeg | ImageType::Png | ImageType::StaticWebp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResponse {
    pub lines: Vec<OcrLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierLabel {
    pub name: String,
    /// Normalised to `0.0..=1.0` of the backend's confidence scale.
    pub confidence: f32,
    pub id: i32,
    pub mid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResponse {
    pub status: ClassifierStatus,
    pub annotations: Vec<ClassifierLabel>,
}
