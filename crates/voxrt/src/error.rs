use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("vertex stride {stride} is too small for a position")]
    StrideTooSmall { stride: usize },

    #[error("vertex attribute `{attribute}` at offset {offset} does not fit in stride {stride}")]
    AttributeOutsideStride {
        attribute: &'static str,
        offset: usize,
        stride: usize,
    },

    #[error("vertex buffer holds {actual} bytes but {vertex_count} vertices need {expected}")]
    VertexBufferTooShort {
        vertex_count: usize,
        expected: usize,
        actual: usize,
    },

    #[error("index buffer length {0} is not a multiple of 3")]
    Untriangulated(usize),

    #[error("triangle {triangle} references vertex {index}, but the mesh has {vertex_count}")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("transfer function needs exactly {expected} entries, got {actual}")]
    TransferFunctionLength { expected: usize, actual: usize },
}
