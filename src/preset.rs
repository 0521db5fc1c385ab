//! Presets: named parameter profiles for common scan qualities.
//!
//! A preset rewrites DPI, the three preprocessing flags and the segmentation
//! mode. Language, engine mode and the page cap always pass through, so a
//! preset can be layered on any user's parameters without clobbering their
//! language choice.
//!
//! | Preset | DPI | deskew | adaptive | sharpen | segmentation |
//! |--------|-----|--------|----------|---------|--------------|
//! | `Default` | unchanged | unchanged | unchanged | unchanged | unchanged |
//! | `LowQualityScan` | 400 | on | on | on | `SingleColumn` |
//! | `Photo` | 500 | on | on | on | `Auto` |
//! | `Form` | 300 | on | off | off | `SparseText` |

use crate::config::{ParameterSet, SegmentationMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of parameter profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Preset {
    /// Identity: keep the parameters as merged.
    #[default]
    Default,
    /// Faded or noisy office scans.
    LowQualityScan,
    /// Phone photos of documents: uneven light, perspective, blur.
    Photo,
    /// Forms with scattered fields and boxes.
    Form,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Default,
        Preset::LowQualityScan,
        Preset::Photo,
        Preset::Form,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Default => "Default",
            Preset::LowQualityScan => "LowQualityScan",
            Preset::Photo => "Photo",
            Preset::Form => "Form",
        }
    }

    /// Resolve a user-supplied name, ignoring case and surrounding space.
    pub fn lookup(name: &str) -> Option<Preset> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::lookup(s).ok_or_else(|| format!("unknown preset '{s}'"))
    }
}

/// Apply `preset` to `params`, returning the adjusted set.
pub fn apply_preset(params: ParameterSet, preset: Preset) -> ParameterSet {
    match preset {
        Preset::Default => params,
        Preset::LowQualityScan => ParameterSet {
            dpi: 400,
            deskew: true,
            adaptive_threshold: true,
            sharpen: true,
            segmentation_mode: SegmentationMode::SingleColumn,
            ..params
        },
        Preset::Photo => ParameterSet {
            dpi: 500,
            deskew: true,
            adaptive_threshold: true,
            sharpen: true,
            segmentation_mode: SegmentationMode::Auto,
            ..params
        },
        Preset::Form => ParameterSet {
            dpi: 300,
            deskew: true,
            adaptive_threshold: false,
            sharpen: false,
            segmentation_mode: SegmentationMode::SparseText,
            ..params
        },
    }
}

/// Apply the preset called `name`; unknown names return `params` unchanged.
pub fn apply_named_preset(params: ParameterSet, name: &str) -> ParameterSet {
    match Preset::lookup(name) {
        Some(preset) => apply_preset(params, preset),
        None => params,
    }
}
