// ============================================================================
// SETTINGS: persisted lens configuration (JSON)
// ============================================================================

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::components::input::SIZE_MULTIPLIERS;
use crate::components::overlay::OverlayConfig;
use crate::error::Result;
use crate::ops::extract::SourceMode;

pub const DEFAULT_COLOR: &str = "#0000ff";

/// Persisted state. Unknown keys are ignored, missing keys take defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensSettings {
    pub is_active: bool,
    pub size_index: i64,
    pub source_index: i64,
    pub reticle: bool,
    pub overlay: bool,
    pub no_color: bool,
    pub crop: bool,
    pub outline: bool,
    /// 0 ..= 100
    pub opacity: i64,
    /// `#rrggbb`
    pub color: String,
}

impl Default for LensSettings {
    fn default() -> Self {
        Self {
            is_active: false,
            size_index: 0,
            source_index: 0,
            reticle: true,
            overlay: false,
            no_color: false,
            crop: false,
            outline: false,
            opacity: 100,
            color: DEFAULT_COLOR.to_string(),
        }
    }
}

impl LensSettings {
    /// Parse a stored blob. Never fails: a corrupt blob yields defaults and
    /// out-of-range values are pulled back into range.
    pub fn from_json(text: &str) -> Self {
        match Self::try_from_json(text) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("settings: corrupt blob, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Strict variant of [`LensSettings::from_json`].
    pub fn try_from_json(text: &str) -> Result<Self> {
        let parsed: LensSettings = serde_json::from_str(text)?;
        Ok(parsed.normalized())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn normalized(mut self) -> Self {
        if !(0..SIZE_MULTIPLIERS.len() as i64).contains(&self.size_index) {
            self.size_index = 0;
        }
        if !(0..=1).contains(&self.source_index) {
            self.source_index = 0;
        }
        self.opacity = self.opacity.clamp(0, 100);
        if parse_color(&self.color).is_none() {
            self.color = DEFAULT_COLOR.to_string();
        }
        self
    }

    pub fn source_mode(&self) -> SourceMode {
        SourceMode::from_index(self.source_index)
    }

    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            opacity: self.opacity.clamp(0, 100) as f32 / 100.0,
            crop: self.crop,
            outline: self.outline,
            no_color: self.no_color,
            color: parse_color(&self.color).unwrap_or(Rgba([0, 0, 255, 255])),
            source: self.source_mode(),
        }
    }
}

/// `#rrggbb` (leading `#` optional) → opaque colour.
pub fn parse_color(text: &str) -> Option<Rgba<u8>> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

pub fn format_color(color: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}
