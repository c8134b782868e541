//! Wire format for masks in oracle responses.

use serde::{Deserialize, Serialize};

use super::OracleError;
use crate::models::BitMask;

/// Run-length encoded mask.
///
/// Runs alternate background/foreground starting with background, in
/// row-major pixel order. Runs must cover the grid exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RleMask {
    /// Grid dimensions as `[height, width]`.
    pub size: [u32; 2],
    pub counts: Vec<u32>,
}

impl RleMask {
    /// Expand the runs into a dense mask.
    pub fn decode(&self) -> Result<BitMask, OracleError> {
        let [height, width] = self.size;
        let total = width as usize * height as usize;
        let mut data: Vec<bool> = Vec::with_capacity(total);
        let mut value = false;
        for &run in &self.counts {
            let next = data.len() + run as usize;
            if next > total {
                return Err(OracleError::Parse(format!(
                    "mask runs exceed the {}x{} grid",
                    width, height
                )));
            }
            data.resize(next, value);
            value = !value;
        }
        if data.len() != total {
            return Err(OracleError::Parse(format!(
                "mask runs cover {} of {} pixels",
                data.len(),
                total
            )));
        }
        BitMask::from_data(width, height, data)
            .ok_or_else(|| OracleError::Parse("mask payload disagrees with its size".to_string()))
    }

    /// Encode a dense mask.
    pub fn from_mask(mask: &BitMask) -> Self {
        let mut counts = Vec::new();
        let mut value = false;
        let mut run = 0u32;
        for &pixel in mask.as_slice() {
            if pixel == value {
                run += 1;
            } else {
                counts.push(run);
                value = pixel;
                run = 1;
            }
        }
        counts.push(run);
        Self {
            size: [mask.height(), mask.width()],
            counts,
        }
    }
}
