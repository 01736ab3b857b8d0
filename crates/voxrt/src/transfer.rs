//! Volume transfer function: a fixed-length table of RGBA entries indexed by
//! normalized density on the device.

use crate::{SourceError, geometry::Vec4};

/// Entry count of every transfer-function table
pub const TRANSFER_FUNC_LEN: usize = 16384;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    entries: Box<[Vec4]>,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl TransferFunction {
    pub fn zeroed() -> Self {
        Self {
            entries: vec![Vec4::zero(); TRANSFER_FUNC_LEN].into_boxed_slice(),
        }
    }

    pub fn from_entries(entries: Vec<Vec4>) -> Result<Self, SourceError> {
        if entries.len() != TRANSFER_FUNC_LEN {
            return Err(SourceError::TransferFunctionLength {
                expected: TRANSFER_FUNC_LEN,
                actual: entries.len(),
            });
        }

        Ok(Self {
            entries: entries.into_boxed_slice(),
        })
    }

    /// Linear ramp from `low` (density 0) to `high` (density 1)
    pub fn ramp(low: Vec4, high: Vec4) -> Self {
        let last = (TRANSFER_FUNC_LEN - 1) as f32;
        let entries = (0..TRANSFER_FUNC_LEN)
            .map(|i| Vec4::lerp(low, high, i as f32 / last))
            .collect::<Vec<_>>();

        Self {
            entries: entries.into_boxed_slice(),
        }
    }

    pub fn entries(&self) -> &[Vec4] {
        &self.entries
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }
}
