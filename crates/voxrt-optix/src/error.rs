use thiserror::Error;
use voxrt::SourceError;

use crate::device::{BufferFormat, DeviceError};

/// Broad class of a [`SceneError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A device object (context setup, buffer, program, material,
    /// acceleration, sampler) could not be created
    ResourceCreation,
    /// The graph failed structural validation or compilation
    Validation,
    /// The device reported an error while executing a launch
    Launch,
    /// The caller broke a precondition; the device was not touched
    Usage,
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to create {what}: {source}")]
    Creation {
        what: String,
        #[source]
        source: DeviceError,
    },
    #[error("scene validation failed: {0}")]
    Validation(#[source] DeviceError),
    #[error("launch failed: {0}")]
    Launch(#[source] DeviceError),
    #[error("material index {index} out of range ({count} materials)")]
    MaterialIndex { index: usize, count: usize },
    #[error("{what} is {actual} bytes, expected {expected}")]
    BlobSize {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("mesh has no triangles")]
    EmptyMesh,
    #[error("material index {0} does not fit the device's 32-bit material id")]
    MaterialId(usize),
    #[error("launch requested before the scene was validated")]
    NotValidated,
    #[error("surface format {0:?} cannot be copied to a texture")]
    UnsupportedFormat(BufferFormat),
    #[error("invalid source data: {0}")]
    Source(#[from] SourceError),
}

impl SceneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SceneError::Creation { .. } => ErrorKind::ResourceCreation,
            SceneError::Validation(_) => ErrorKind::Validation,
            SceneError::Launch(_) => ErrorKind::Launch,
            SceneError::MaterialIndex { .. }
            | SceneError::BlobSize { .. }
            | SceneError::EmptyMesh
            | SceneError::MaterialId(_)
            | SceneError::NotValidated
            | SceneError::UnsupportedFormat(_)
            | SceneError::Source(_) => ErrorKind::Usage,
        }
    }

    /// Underlying device diagnostic, if the device produced one
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            SceneError::Creation { source, .. } => Some(source),
            SceneError::Validation(e) | SceneError::Launch(e) => Some(e),
            _ => None,
        }
    }
}

/// Attaches "what was being created" to device failures
pub(crate) trait ResultExt<T> {
    fn creating(self, what: impl Into<String>) -> Result<T, SceneError>;
}

impl<T> ResultExt<T> for Result<T, DeviceError> {
    fn creating(self, what: impl Into<String>) -> Result<T, SceneError> {
        self.map_err(|source| {
            let what = what.into();
            tracing::error!("failed to create {what}: {source}");
            SceneError::Creation { what, source }
        })
    }
}

pub type SceneResult<T> = Result<T, SceneError>;
