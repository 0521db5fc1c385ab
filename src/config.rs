//! Parameter model: the knobs that drive one OCR run.
//!
//! Three layers feed a run:
//!
//! 1. [`OcrDefaults`]: the stored defaults, loaded once at process start
//!    (from a JSON file or [`OcrDefaults::default`]) and shared read-only.
//! 2. [`ParameterOverrides`]: per-request values as a human typed them
//!    (strings, possibly blank or invalid).
//! 3. An optional preset name (see [`crate::preset`]).
//!
//! [`merge_defaults`] folds 1 and 2 into a fresh [`ParameterSet`]; the preset
//! is applied on top. From then on the `ParameterSet` is the only source of
//! truth for every stage; nothing downstream looks at the defaults again.
//!
//! Parsing happens here and only here. An override that cannot be parsed
//! falls back to the stored default with a warning instead of failing the
//! request.

use crate::error::OcrError;
use crate::preset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Lower bound of the max-pages clamp applied at the request boundary.
pub const MIN_PAGES: u32 = 1;
/// Upper bound of the max-pages clamp applied at the request boundary.
pub const MAX_PAGES: u32 = 200;

// ── Engine enums ─────────────────────────────────────────────────────────

/// Tesseract engine selection (`--oem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineMode {
    /// Legacy engine only.
    TesseractOnly,
    /// Neural-net LSTM engine only.
    LstmOnly,
    /// Legacy + LSTM combined.
    TesseractAndLstm,
    /// Whatever the traineddata supports.
    Default,
}

impl EngineMode {
    const ALL: [EngineMode; 4] = [
        EngineMode::TesseractOnly,
        EngineMode::LstmOnly,
        EngineMode::TesseractAndLstm,
        EngineMode::Default,
    ];

    /// Numeric code as understood by `tesseract --oem`.
    pub fn code(self) -> u8 {
        match self {
            EngineMode::TesseractOnly => 0,
            EngineMode::LstmOnly => 1,
            EngineMode::TesseractAndLstm => 2,
            EngineMode::Default => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EngineMode::TesseractOnly => "TesseractOnly",
            EngineMode::LstmOnly => "LstmOnly",
            EngineMode::TesseractAndLstm => "TesseractAndLstm",
            EngineMode::Default => "Default",
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineMode {
    type Err = String;

    /// Accepts names case-insensitively (`lstmonly`, `LstmOnly`) or the
    /// numeric `--oem` code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::ALL
                .into_iter()
                .find(|m| m.code() == code)
                .ok_or_else(|| format!("unknown engine mode code {code}"));
        }
        let key = s.to_ascii_lowercase();
        match key.as_str() {
            "tesseractlstmcombined" => return Ok(EngineMode::TesseractAndLstm),
            "lstm" => return Ok(EngineMode::LstmOnly),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(&key))
            .ok_or_else(|| format!("unknown engine mode '{s}'"))
    }
}

impl TryFrom<String> for EngineMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EngineMode> for String {
    fn from(m: EngineMode) -> Self {
        m.name().to_string()
    }
}

/// Tesseract page-layout assumption (`--psm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SegmentationMode {
    OsdOnly,
    AutoOsd,
    AutoOnly,
    /// Fully automatic page segmentation, no OSD.
    Auto,
    /// A single column of text of variable sizes.
    SingleColumn,
    SingleBlockVertText,
    SingleBlock,
    SingleLine,
    SingleWord,
    CircleWord,
    SingleChar,
    /// As much text as possible in no particular order.
    SparseText,
    SparseTextOsd,
    RawLine,
}

impl SegmentationMode {
    const ALL: [SegmentationMode; 14] = [
        SegmentationMode::OsdOnly,
        SegmentationMode::AutoOsd,
        SegmentationMode::AutoOnly,
        SegmentationMode::Auto,
        SegmentationMode::SingleColumn,
        SegmentationMode::SingleBlockVertText,
        SegmentationMode::SingleBlock,
        SegmentationMode::SingleLine,
        SegmentationMode::SingleWord,
        SegmentationMode::CircleWord,
        SegmentationMode::SingleChar,
        SegmentationMode::SparseText,
        SegmentationMode::SparseTextOsd,
        SegmentationMode::RawLine,
    ];

    /// Numeric code as understood by `tesseract --psm`.
    pub fn code(self) -> u8 {
        match self {
            SegmentationMode::OsdOnly => 0,
            SegmentationMode::AutoOsd => 1,
            SegmentationMode::AutoOnly => 2,
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleColumn => 4,
            SegmentationMode::SingleBlockVertText => 5,
            SegmentationMode::SingleBlock => 6,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SingleWord => 8,
            SegmentationMode::CircleWord => 9,
            SegmentationMode::SingleChar => 10,
            SegmentationMode::SparseText => 11,
            SegmentationMode::SparseTextOsd => 12,
            SegmentationMode::RawLine => 13,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SegmentationMode::OsdOnly => "OsdOnly",
            SegmentationMode::AutoOsd => "AutoOsd",
            SegmentationMode::AutoOnly => "AutoOnly",
            SegmentationMode::Auto => "Auto",
            SegmentationMode::SingleColumn => "SingleColumn",
            SegmentationMode::SingleBlockVertText => "SingleBlockVertText",
            SegmentationMode::SingleBlock => "SingleBlock",
            SegmentationMode::SingleLine => "SingleLine",
            SegmentationMode::SingleWord => "SingleWord",
            SegmentationMode::CircleWord => "CircleWord",
            SegmentationMode::SingleChar => "SingleChar",
            SegmentationMode::SparseText => "SparseText",
            SegmentationMode::SparseTextOsd => "SparseTextOsd",
            SegmentationMode::RawLine => "RawLine",
        }
    }
}

impl fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SegmentationMode {
    type Err = String;

    /// Accepts names case-insensitively, with or without a `Psm` prefix, or
    /// the numeric `--psm` code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::ALL
                .into_iter()
                .find(|m| m.code() == code)
                .ok_or_else(|| format!("unknown segmentation mode code {code}"));
        }
        let lower = s.to_ascii_lowercase();
        let key = lower.strip_prefix("psm").unwrap_or(&lower);
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(key))
            .ok_or_else(|| format!("unknown segmentation mode '{s}'"))
    }
}

impl TryFrom<String> for SegmentationMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SegmentationMode> for String {
    fn from(m: SegmentationMode) -> Self {
        m.name().to_string()
    }
}

// ── ParameterSet ─────────────────────────────────────────────────────────

/// Every tunable of a single OCR run.
///
/// Built once per request by [`ParameterSet::for_request`] (or by hand) and
/// only ever borrowed by the pipeline. Presets produce a new value rather
/// than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Tesseract language selector, e.g. `"eng"` or `"deu+eng"`.
    pub language: String,
    pub engine_mode: EngineMode,
    pub segmentation_mode: SegmentationMode,
    /// Rasterisation density in dots per inch. Always positive.
    pub dpi: u32,
    pub deskew: bool,
    pub adaptive_threshold: bool,
    pub sharpen: bool,
    /// Page cap. Clamped to [`MIN_PAGES`]..=[`MAX_PAGES`] at the request
    /// boundary; the pipeline itself only guards against zero.
    pub max_pages: u32,
}

impl ParameterSet {
    /// Merge `overrides` onto `defaults`, then apply the named preset.
    ///
    /// `preset` is resolved leniently: `None`, blank or unknown names leave
    /// the merged parameters untouched.
    pub fn for_request(
        defaults: &OcrDefaults,
        overrides: &ParameterOverrides,
        preset: Option<&str>,
    ) -> ParameterSet {
        let merged = merge_defaults(defaults, overrides);
        match preset {
            Some(name) => preset::apply_named_preset(merged, name),
            None => merged,
        }
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet::from(&OcrDefaults::default())
    }
}

impl From<&OcrDefaults> for ParameterSet {
    fn from(d: &OcrDefaults) -> Self {
        ParameterSet {
            language: d.language.clone(),
            engine_mode: d.engine_mode,
            segmentation_mode: d.segmentation_mode,
            dpi: d.dpi.max(1),
            deskew: d.deskew,
            adaptive_threshold: d.adaptive_threshold,
            sharpen: d.sharpen,
            max_pages: d.max_pages.clamp(MIN_PAGES, MAX_PAGES),
        }
    }
}

// ── Stored defaults ──────────────────────────────────────────────────────

/// Process-wide default parameters.
///
/// Load once with [`OcrDefaults::load`] and share behind an `Arc` or a plain
/// reference; never mutate it per request.
///
/// The file is JSON, either the object itself or nested under an `"ocr"`
/// key, so the section can live inside a larger settings file:
///
/// ```json
/// { "ocr": { "language": "eng", "dpi": 300, "max_pages": 25 } }
/// ```
///
/// Missing fields take the built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrDefaults {
    /// Default: `"deu+eng"`.
    pub language: String,
    /// Default: [`EngineMode::LstmOnly`].
    pub engine_mode: EngineMode,
    /// Default: [`SegmentationMode::Auto`].
    pub segmentation_mode: SegmentationMode,
    /// Default: 300. 300–400 is typical for scanned documents.
    pub dpi: u32,
    /// Default: true.
    pub deskew: bool,
    /// Default: true.
    pub adaptive_threshold: bool,
    /// Default: true.
    pub sharpen: bool,
    /// Default: 10.
    pub max_pages: u32,
}

impl Default for OcrDefaults {
    fn default() -> Self {
        Self {
            language: "deu+eng".to_string(),
            engine_mode: EngineMode::LstmOnly,
            segmentation_mode: SegmentationMode::Auto,
            dpi: 300,
            deskew: true,
            adaptive_threshold: true,
            sharpen: true,
            max_pages: 10,
        }
    }
}

impl OcrDefaults {
    /// Read the defaults from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OcrError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| OcrError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&raw).map_err(|detail| OcrError::ConfigLoad {
            path: path.to_path_buf(),
            detail,
        })
    }

    /// Parse the defaults from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let mut value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if let Some(section) = value.get_mut("ocr") {
            value = section.take();
        }
        let defaults: OcrDefaults = serde_json::from_value(value).map_err(|e| e.to_string())?;
        if defaults.language.trim().is_empty() {
            return Err("language must not be empty".into());
        }
        if defaults.dpi == 0 {
            return Err("dpi must be positive".into());
        }
        Ok(defaults)
    }
}

// ── Per-request overrides ────────────────────────────────────────────────

/// Raw per-request values as entered by a user.
///
/// Every field is optional; `None` means "use the stored default". Numeric
/// fields are signed so a typed `0` or `-5` can be told apart from absence
/// and still fall back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterOverrides {
    pub language: Option<String>,
    pub engine_mode: Option<String>,
    pub segmentation_mode: Option<String>,
    pub dpi: Option<i64>,
    pub deskew: Option<bool>,
    pub adaptive_threshold: Option<bool>,
    pub sharpen: Option<bool>,
    pub max_pages: Option<i64>,
}

/// Fold per-request `overrides` onto the stored `defaults`.
///
/// Never fails: blank strings, unparseable enum names and non-positive
/// numbers all fall back to the stored default. `max_pages` is clamped into
/// [`MIN_PAGES`]..=[`MAX_PAGES`].
pub fn merge_defaults(defaults: &OcrDefaults, overrides: &ParameterOverrides) -> ParameterSet {
    let base = ParameterSet::from(defaults);

    let language = overrides
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or(base.language);

    let engine_mode = parse_or_default(
        "engine mode",
        overrides.engine_mode.as_deref(),
        base.engine_mode,
    );
    let segmentation_mode = parse_or_default(
        "segmentation mode",
        overrides.segmentation_mode.as_deref(),
        base.segmentation_mode,
    );

    let dpi = positive_or_default(overrides.dpi, base.dpi);
    let max_pages = positive_or_default(overrides.max_pages, base.max_pages)
        .clamp(MIN_PAGES, MAX_PAGES);

    ParameterSet {
        language,
        engine_mode,
        segmentation_mode,
        dpi,
        deskew: overrides.deskew.unwrap_or(base.deskew),
        adaptive_threshold: overrides
            .adaptive_threshold
            .unwrap_or(base.adaptive_threshold),
        sharpen: overrides.sharpen.unwrap_or(base.sharpen),
        max_pages,
    }
}

fn parse_or_default<T>(what: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr<Err = String> + Copy,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => default,
        Some(s) => s.parse().unwrap_or_else(|e| {
            warn!("Ignoring invalid {}: {}", what, e);
            default
        }),
    }
}

fn positive_or_default(raw: Option<i64>, default: u32) -> u32 {
    match raw {
        Some(v) if v > 0 => u32::try_from(v).unwrap_or(u32::MAX),
        _ => default,
    }
}
