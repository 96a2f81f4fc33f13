//! Trained model loading and inference

pub mod gbdt;
pub mod inference;
pub mod linear;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use inference::{predict_proba, ModelBackend, ModelFlavor, TrainedModel};
pub use loader::{ArtifactStore, FileArtifactStore, ModelMeta};
