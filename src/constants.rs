//! Application constants for the harvest processor
//!
//! This module contains the fixed vocabulary of default values used
//! throughout the pipeline: administrative prefixes, field delimiters,
//! labeling thresholds, windowing defaults, and source column names.

// =============================================================================
// Region Name Canonicalization
// =============================================================================

/// Administrative prefixes stripped during region canonicalization.
///
/// Ordered most specific first; each entry is tried with its trailing space
/// before the bare form, and at most one prefix is removed per name.
pub const REGION_PREFIXES: &[&str] = &["Kotamadya", "Kabupaten", "Kab.", "Kota"];

// =============================================================================
// Categorical Field Delimiters
// =============================================================================

/// Delimiter between tokens in the extreme-weather event field
/// (e.g. "Hujan Lebat, Petir")
pub const EVENT_DELIMITER: &str = ", ";

/// Delimiter between tokens in the weather-impact field
/// (e.g. "Banjir / Tanah Longsor")
pub const IMPACT_DELIMITER: &str = " / ";

/// Column-name prefix for encoded event indicator features
pub const EVENT_COLUMN_PREFIX: &str = "event_";

/// Column-name prefix for encoded impact indicator features
pub const IMPACT_COLUMN_PREFIX: &str = "impact_";

/// Feature column carrying the harvested area filled across periods
pub const AREA_FEATURE_COLUMN: &str = "harvested_area";

// =============================================================================
// Labeling
// =============================================================================

/// Z-score below which a yield observation is labeled a harvest failure
pub const DEFAULT_Z_SCORE_THRESHOLD: f64 = -1.5;

/// Status-text token marking a yield decline (annual pipeline label = 1)
pub const STATUS_DECLINE_TOKEN: &str = "TURUN";

/// Status-text token marking a yield increase
pub const STATUS_INCREASE_TOKEN: &str = "NAIK";

/// Pattern extracting the tonnage delta from a status string,
/// e.g. "TURUN (5.2 TON)"
pub const STATUS_DELTA_PATTERN: &str = r"([-+]?\d+[.,]?\d*)\s*TON";

// =============================================================================
// Sequence Construction
// =============================================================================

/// Default number of consecutive periods per classifier input window
pub const DEFAULT_SEQUENCE_LENGTH: usize = 12;

/// Default stride between consecutive windows
pub const DEFAULT_SEQUENCE_STRIDE: usize = 1;

/// Floor for the annual-pipeline sequence-length override
pub const MIN_SEQUENCE_LENGTH: usize = 2;

// =============================================================================
// Classification Thresholds
// =============================================================================

/// Probability threshold used before a trained bundle supplies its own
pub const DEFAULT_OPTIMAL_THRESHOLD: f32 = 0.5;

/// Bounds and step of the validation threshold sweep (inclusive start,
/// exclusive end)
pub const THRESHOLD_SWEEP_START: f32 = 0.30;
pub const THRESHOLD_SWEEP_END: f32 = 0.80;
pub const THRESHOLD_SWEEP_STEP: f32 = 0.05;

/// Probability at or above which risk is reported as high
pub const HIGH_RISK_PROBABILITY: f32 = 0.7;

/// Fraction of training windows reserved for validation
pub const VALIDATION_SPLIT: f64 = 0.2;

// =============================================================================
// Default Source Column Names
// =============================================================================

/// Default source column names, overridable through
/// [`crate::config::SourceSchema`]
pub mod columns {
    /// Region identifier shared by both sources
    pub const REGION: &str = "Kabupaten/Kota";

    /// Calendar date of a weather event row
    pub const DATE: &str = "Tanggal";

    /// Delimited extreme-weather event text
    pub const WEATHER_EVENT: &str = "Cuaca Ekstrem";

    /// Delimited weather-impact text
    pub const WEATHER_IMPACT: &str = "Dampak";

    /// Harvest year
    pub const YEAR: &str = "Tahun";

    /// Rice productivity (quintal per hectare), locale-formatted
    pub const PRODUCTIVITY: &str = "Produktivitas Tanaman Padi (ku/ha) (Ku/ha)";

    /// Harvested area in hectares, locale-formatted
    pub const HARVESTED_AREA: &str = "Luas Panen Tanaman Padi (ha) (Ha)";

    /// Total rice production in tons; carries the label's source value and
    /// never enters the feature matrix
    pub const PRODUCTION: &str = "Rekap Produksi Padi (ton)";

    /// Annual-variant yield total
    pub const ANNUAL_YIELD: &str = "hasil_panen";

    /// Annual-variant status text ("TURUN (5.2 TON)", "NAIK", "STABIL")
    pub const ANNUAL_STATUS: &str = "status_panen";

    /// Annual-variant combined weather/impact summary text
    pub const ANNUAL_WEATHER_INFO: &str = "info_cuaca";

    /// Annual-variant region column
    pub const ANNUAL_REGION: &str = "kabupaten/kota";

    /// Annual-variant year column
    pub const ANNUAL_YEAR: &str = "tahun";
}

/// Keyword fallbacks for locating numeric weather metric columns when no
/// explicit schema mapping exists. Matching is case-insensitive substring
/// search over the source headers.
pub mod metric_keywords {
    pub const TEMPERATURE: &[&str] = &["suhu", "temperature"];
    pub const HUMIDITY: &[&str] = &["lembap", "humidity"];
    pub const RAINFALL: &[&str] = &["hujan", "precip"];
    pub const WIND: &[&str] = &["angin", "wind"];
}

// =============================================================================
// Annual ("Conclusion") Dataset Keywords
// =============================================================================

/// Keyword-to-column mapping for annual weather event counts.
/// Keys are matched case-insensitively against the summary text.
pub const ANNUAL_EVENT_KEYWORDS: &[(&str, &str)] = &[
    ("hujan lebat", "event_hujan_lebat"),
    ("angin kencang", "event_angin_kencang"),
    ("puting beliung", "event_puting_beliung"),
    ("hujan es", "event_hujan_es"),
    ("petir", "event_petir"),
    ("suhu ekstrem", "event_suhu_ekstrem"),
    ("jarak pandang", "event_jarak_pandang"),
];

/// Keyword-to-column mapping for annual impact counts. More specific
/// phrases come first so "banjir / genangan" is not double-counted.
pub const ANNUAL_IMPACT_KEYWORDS: &[(&str, &str)] = &[
    ("banjir / genangan", "impact_banjir"),
    ("banjir", "impact_banjir"),
    ("genangan", "impact_banjir"),
    ("tanah longsor", "impact_tanah_longsor"),
    ("pohon tumbang", "impact_pohon_tumbang"),
    ("bangunan rusak", "impact_bangunan_rusak"),
    ("gangguan transportasi", "impact_gangguan_transport"),
    ("korban jiwa / luka", "impact_korban_jiwa"),
    ("tidak ada data", "impact_tidak_ada_data"),
];

/// Pattern extracting "(Nx)" occurrence multipliers from annual summaries
pub const ANNUAL_OCCURRENCE_PATTERN: &str = r"\((\d+)x\)";

// =============================================================================
// Artifact Bundle
// =============================================================================

/// File names of the three artifact bundle members. The bundle is versioned
/// as a unit: loading one file without the other two is an error.
pub const CLASSIFIER_FILE_NAME: &str = "sequence_model.json";
pub const SCALER_FILE_NAME: &str = "feature_scaler.json";
pub const MODEL_CONFIG_FILE_NAME: &str = "model_config.json";

/// Directory name under the platform data dir holding the artifact bundle
pub const ARTIFACT_DIR_NAME: &str = "harvest-processor";

// =============================================================================
// Training
// =============================================================================

/// Default epochs for the built-in classifier fit
pub const DEFAULT_TRAINING_EPOCHS: usize = 200;

/// Default learning rate for the built-in classifier fit
pub const DEFAULT_LEARNING_RATE: f64 = 0.05;
