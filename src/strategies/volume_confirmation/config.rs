//! Volume Confirmation Configuration

use serde::{Deserialize, Serialize};

use crate::strategies::Sizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMode {
    /// VPT above its own average and close above its SMA
    Vpt,
    /// Up day on volume of at least `volume_multiple` x average
    RelativeVolume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfirmationConfig {
    pub id: Option<String>,

    pub mode: VolumeMode,

    /// Averaging window for price, VPT and volume (default: 20)
    pub period: usize,

    /// Relative volume threshold (default: 1.5)
    pub volume_multiple: f64,

    pub top_k: usize,

    pub sizing: Sizing,
}

impl Default for VolumeConfirmationConfig {
    fn default() -> Self {
        Self {
            id: None,
            mode: VolumeMode::Vpt,
            period: 20,
            volume_multiple: 1.5,
            top_k: 10,
            sizing: Sizing::Proportional,
        }
    }
}

impl VolumeConfirmationConfig {
    pub fn variant_id(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        match self.mode {
            VolumeMode::Vpt => format!("volume_vpt{}_top{}", self.period, self.top_k),
            VolumeMode::RelativeVolume => format!(
                "volume_relvol{}_x{}_top{}",
                self.period, self.volume_multiple, self.top_k
            ),
        }
    }
}
