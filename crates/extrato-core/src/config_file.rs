use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub vocabulary: Option<VocabularyConfig>,
    pub markers: Option<MarkersConfig>,
    pub thresholds: Option<ThresholdsConfig>,
}

/// Closed vocabularies. Lists extend the built-in tables unless
/// `replace_defaults` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub operators: Option<Vec<String>>,
    pub function_codes: Option<Vec<String>>,
    pub shift_codes: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub replace_defaults: Option<bool>,
}

/// Regex overrides for structural markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkersConfig {
    pub record_start: Option<String>,
    pub declared_summary: Option<String>,
    pub revised_summary: Option<String>,
    pub header_banner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub y_tolerance: Option<f64>,
    pub record_gap: Option<f64>,
    pub numeric_line_ratio: Option<f64>,
    pub numeric_line_min_tokens: Option<usize>,
    pub mismatch_tolerance: Option<f64>,
    pub fallback_data_lines: Option<usize>,
    pub operator_scan_window: Option<usize>,
    pub month_year_window: Option<usize>,
}

/// Platform config directory path: `<config_dir>/extrato/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("extrato").join("config.toml"))
}

/// Load config by cascading CWD `.extrato.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".extrato.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let bv = base.vocabulary.unwrap_or_default();
    let ov = overlay.vocabulary.unwrap_or_default();
    let bm = base.markers.unwrap_or_default();
    let om = overlay.markers.unwrap_or_default();
    let bt = base.thresholds.unwrap_or_default();
    let ot = overlay.thresholds.unwrap_or_default();

    ConfigFile {
        vocabulary: Some(VocabularyConfig {
            operators: ov.operators.or(bv.operators),
            function_codes: ov.function_codes.or(bv.function_codes),
            shift_codes: ov.shift_codes.or(bv.shift_codes),
            categories: ov.categories.or(bv.categories),
            replace_defaults: ov.replace_defaults.or(bv.replace_defaults),
        }),
        markers: Some(MarkersConfig {
            record_start: om.record_start.or(bm.record_start),
            declared_summary: om.declared_summary.or(bm.declared_summary),
            revised_summary: om.revised_summary.or(bm.revised_summary),
            header_banner: om.header_banner.or(bm.header_banner),
        }),
        thresholds: Some(ThresholdsConfig {
            y_tolerance: ot.y_tolerance.or(bt.y_tolerance),
            record_gap: ot.record_gap.or(bt.record_gap),
            numeric_line_ratio: ot.numeric_line_ratio.or(bt.numeric_line_ratio),
            numeric_line_min_tokens: ot.numeric_line_min_tokens.or(bt.numeric_line_min_tokens),
            mismatch_tolerance: ot.mismatch_tolerance.or(bt.mismatch_tolerance),
            fallback_data_lines: ot.fallback_data_lines.or(bt.fallback_data_lines),
            operator_scan_window: ot.operator_scan_window.or(bt.operator_scan_window),
            month_year_window: ot.month_year_window.or(bt.month_year_window),
        }),
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}
