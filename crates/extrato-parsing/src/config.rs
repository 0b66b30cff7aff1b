use std::collections::HashSet;

use regex::Regex;

use extrato_core::config_file::ConfigFile;

/// Controls how a list of values is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }

    fn push(&mut self, value: T) {
        match self {
            ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(value),
            ListOverride::Default => *self = ListOverride::Extend(vec![value]),
        }
    }
}

/// Terminal/employer names printed in the operator column. Multi-word names
/// are matched word by word.
pub const DEFAULT_OPERATORS: &[&str] = &[
    "SAGRES",
    "LIBRA",
    "TECON",
    "BTP",
    "DPW",
    "ECOPORTO",
    "RODRIMAR",
    "MARIMEX",
    "DEICMAR",
    "TERMARES",
    "USIMINAS",
    "CUTRALE",
    "CITROSUCO",
    "TEAG",
    "TGG",
    "ADM",
    "SANTOS BRASIL",
    "LOUIS DREYFUS",
];

pub const DEFAULT_FUNCTION_CODES: &[&str] = &[
    "101", "102", "103", "104", "105", "106", "201", "202", "203", "301", "302", "303", "401",
    "402", "501", "502", "601", "602", "701", "702", "801", "802", "803", "804", "805", "901",
    "902",
];

pub const DEFAULT_SHIFT_CODES: &[&str] = &["A", "B", "C", "D"];

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "ESTIVADOR",
    "ARRUMADOR",
    "VIGIA",
    "CONFERENTE",
    "CONSERTADOR",
    "BLOCO",
];

/// Configuration for the statement extraction pipeline.
///
/// Regex fields are `Option<Regex>`: `None` means "use the built-in default".
/// Vocabularies are resolved once at build time. Use [`ParsingConfigBuilder`]
/// to construct with string patterns.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── section.rs ──
    /// Regex for the record-start prefix. Groups 1–3 must capture day, batch and sub-batch.
    pub(crate) record_start_re: Option<Regex>,
    /// Regex for the declared-summary label.
    pub(crate) declared_marker_re: Option<Regex>,
    /// Regex for the revised-summary label.
    pub(crate) revised_marker_re: Option<Regex>,
    /// Regex for repeated column-header / title banners.
    pub(crate) header_banner_re: Option<Regex>,
    /// Minimum share of numeric words for a line to count as a totals line.
    pub(crate) numeric_line_ratio: f64,
    /// Minimum word count for a line to count as a totals line.
    pub(crate) numeric_line_min_tokens: usize,
    /// Size of the data-region prefix used when no record start exists.
    pub(crate) fallback_data_lines: usize,

    // ── layout.rs ──
    /// Rounded rows closer than this to the first row of a line join it (0 disables).
    pub(crate) y_tolerance: f64,

    // ── grouping.rs ──
    /// Maximum vertical gap between lines of one record.
    pub(crate) record_gap: f64,

    // ── fields.rs ──
    /// Operator names, split into words, longest first.
    pub(crate) operators: Vec<Vec<String>>,
    pub(crate) function_codes: HashSet<String>,
    pub(crate) shift_codes: HashSet<String>,
    /// How many words after the record-start prefix may hold the operator.
    pub(crate) operator_scan_window: usize,

    // ── header.rs ──
    pub(crate) categories: Vec<String>,
    /// Maximum word distance between a month code and its year.
    pub(crate) month_year_window: usize,

    // ── summary.rs ──
    /// Relative difference between declared and computed base amount that raises a warning.
    pub(crate) mismatch_tolerance: f64,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        // Defaults cannot fail: no patterns to compile.
        ParsingConfigBuilder::new().resolve(None, None, None, None)
    }
}

impl ParsingConfig {
    pub fn is_function_code(&self, word: &str) -> bool {
        self.function_codes.contains(word)
    }

    pub fn is_shift_code(&self, word: &str) -> bool {
        self.shift_codes.contains(word)
    }

    /// The category whose name equals `word`, ignoring case.
    pub fn category(&self, word: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.eq_ignore_ascii_case(word))
            .map(|c| c.as_str())
    }

    pub fn mismatch_tolerance(&self) -> f64 {
        self.mismatch_tolerance
    }
}

/// Builder for [`ParsingConfig`].
///
/// Accepts string patterns that are compiled to `Regex` in [`build()`](Self::build).
/// Fails fast with `regex::Error` if any pattern is invalid.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    record_start_re: Option<String>,
    declared_marker_re: Option<String>,
    revised_marker_re: Option<String>,
    header_banner_re: Option<String>,
    numeric_line_ratio: Option<f64>,
    numeric_line_min_tokens: Option<usize>,
    fallback_data_lines: Option<usize>,
    y_tolerance: Option<f64>,
    record_gap: Option<f64>,
    operators: ListOverride<String>,
    function_codes: ListOverride<String>,
    shift_codes: ListOverride<String>,
    categories: ListOverride<String>,
    operator_scan_window: Option<usize>,
    month_year_window: Option<usize>,
    mismatch_tolerance: Option<f64>,
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from an on-disk [`ConfigFile`]. Vocabulary lists extend
    /// the defaults unless the file sets `replace_defaults = true`.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        let mut b = Self::new();

        if let Some(vocab) = &file.vocabulary {
            let replace = vocab.replace_defaults.unwrap_or(false);
            let wrap = |v: &Option<Vec<String>>| match v {
                None => ListOverride::Default,
                Some(list) if replace => ListOverride::Replace(list.clone()),
                Some(list) => ListOverride::Extend(list.clone()),
            };
            b.operators = wrap(&vocab.operators);
            b.function_codes = wrap(&vocab.function_codes);
            b.shift_codes = wrap(&vocab.shift_codes);
            b.categories = wrap(&vocab.categories);
        }

        if let Some(markers) = &file.markers {
            b.record_start_re = markers.record_start.clone();
            b.declared_marker_re = markers.declared_summary.clone();
            b.revised_marker_re = markers.revised_summary.clone();
            b.header_banner_re = markers.header_banner.clone();
        }

        if let Some(t) = &file.thresholds {
            b.y_tolerance = t.y_tolerance;
            b.record_gap = t.record_gap;
            b.numeric_line_ratio = t.numeric_line_ratio;
            b.numeric_line_min_tokens = t.numeric_line_min_tokens;
            b.mismatch_tolerance = t.mismatch_tolerance;
            b.fallback_data_lines = t.fallback_data_lines;
            b.operator_scan_window = t.operator_scan_window;
            b.month_year_window = t.month_year_window;
        }

        b
    }

    // ── Markers ──

    pub fn record_start_regex(mut self, pattern: &str) -> Self {
        self.record_start_re = Some(pattern.to_string());
        self
    }

    pub fn declared_marker_regex(mut self, pattern: &str) -> Self {
        self.declared_marker_re = Some(pattern.to_string());
        self
    }

    pub fn revised_marker_regex(mut self, pattern: &str) -> Self {
        self.revised_marker_re = Some(pattern.to_string());
        self
    }

    pub fn header_banner_regex(mut self, pattern: &str) -> Self {
        self.header_banner_re = Some(pattern.to_string());
        self
    }

    // ── Vocabularies ──

    pub fn set_operators(mut self, operators: Vec<String>) -> Self {
        self.operators = ListOverride::Replace(operators);
        self
    }

    pub fn add_operator(mut self, operator: String) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn set_function_codes(mut self, codes: Vec<String>) -> Self {
        self.function_codes = ListOverride::Replace(codes);
        self
    }

    pub fn add_function_code(mut self, code: String) -> Self {
        self.function_codes.push(code);
        self
    }

    pub fn set_shift_codes(mut self, codes: Vec<String>) -> Self {
        self.shift_codes = ListOverride::Replace(codes);
        self
    }

    pub fn add_shift_code(mut self, code: String) -> Self {
        self.shift_codes.push(code);
        self
    }

    pub fn set_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = ListOverride::Replace(categories);
        self
    }

    pub fn add_category(mut self, category: String) -> Self {
        self.categories.push(category);
        self
    }

    // ── Scalars ──

    pub fn y_tolerance(mut self, tolerance: f64) -> Self {
        self.y_tolerance = Some(tolerance);
        self
    }

    pub fn record_gap(mut self, gap: f64) -> Self {
        self.record_gap = Some(gap);
        self
    }

    pub fn numeric_line_ratio(mut self, ratio: f64) -> Self {
        self.numeric_line_ratio = Some(ratio);
        self
    }

    pub fn numeric_line_min_tokens(mut self, n: usize) -> Self {
        self.numeric_line_min_tokens = Some(n);
        self
    }

    pub fn fallback_data_lines(mut self, n: usize) -> Self {
        self.fallback_data_lines = Some(n);
        self
    }

    pub fn operator_scan_window(mut self, n: usize) -> Self {
        self.operator_scan_window = Some(n);
        self
    }

    pub fn month_year_window(mut self, n: usize) -> Self {
        self.month_year_window = Some(n);
        self
    }

    pub fn mismatch_tolerance(mut self, tolerance: f64) -> Self {
        self.mismatch_tolerance = Some(tolerance);
        self
    }

    /// Compile all string patterns into regexes and produce a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, regex::Error> {
        let compile = |opt: &Option<String>| -> Result<Option<Regex>, regex::Error> {
            opt.as_deref().map(Regex::new).transpose()
        };

        let record_start = compile(&self.record_start_re)?;
        let declared = compile(&self.declared_marker_re)?;
        let revised = compile(&self.revised_marker_re)?;
        let banner = compile(&self.header_banner_re)?;

        Ok(self.resolve(record_start, declared, revised, banner))
    }

    fn resolve(
        self,
        record_start_re: Option<Regex>,
        declared_marker_re: Option<Regex>,
        revised_marker_re: Option<Regex>,
        header_banner_re: Option<Regex>,
    ) -> ParsingConfig {
        let owned = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };

        let mut operators: Vec<Vec<String>> = self
            .operators
            .resolve(&owned(DEFAULT_OPERATORS))
            .iter()
            .map(|op| {
                op.split_whitespace()
                    .map(|w| w.to_uppercase())
                    .collect::<Vec<_>>()
            })
            .filter(|words| !words.is_empty())
            .collect();
        // Longest names first so "SANTOS BRASIL" wins over a hypothetical "SANTOS".
        operators.sort_by(|a, b| b.len().cmp(&a.len()));
        operators.dedup();

        ParsingConfig {
            record_start_re,
            declared_marker_re,
            revised_marker_re,
            header_banner_re,
            numeric_line_ratio: self.numeric_line_ratio.unwrap_or(0.9),
            numeric_line_min_tokens: self.numeric_line_min_tokens.unwrap_or(10),
            fallback_data_lines: self.fallback_data_lines.unwrap_or(10),
            y_tolerance: self.y_tolerance.unwrap_or(0.5),
            record_gap: self.record_gap.unwrap_or(2.0),
            operators,
            function_codes: self
                .function_codes
                .resolve(&owned(DEFAULT_FUNCTION_CODES))
                .into_iter()
                .collect(),
            shift_codes: self
                .shift_codes
                .resolve(&owned(DEFAULT_SHIFT_CODES))
                .into_iter()
                .collect(),
            operator_scan_window: self.operator_scan_window.unwrap_or(3),
            categories: self
                .categories
                .resolve(&owned(DEFAULT_CATEGORIES))
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
            month_year_window: self.month_year_window.unwrap_or(3),
            mismatch_tolerance: self.mismatch_tolerance.unwrap_or(0.10),
        }
    }
}
