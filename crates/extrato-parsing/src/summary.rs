use serde::Serialize;

use extrato_core::{Amounts, ExtractionWarning, MonetarySummary};

use crate::config::ParsingConfig;
use crate::layout::Line;
use crate::numeric::{is_monetary, normalize_amount};
use crate::section::{is_declared_marker, is_numeric_heavy, is_revised_marker, is_section_marker};

/// Where the declared summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SummarySource {
    /// A labelled declared-summary line.
    Marked,
    /// The first numeric-heavy line of the summary region.
    Positional,
    /// Folded from the extracted entries.
    Computed,
}

/// Declared and revised summaries plus the consistency check result.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub declared: MonetarySummary,
    pub revised: MonetarySummary,
    pub source: SummarySource,
    /// `SummaryMismatch` or `SummaryAbsent`, when raised.
    pub warning: Option<ExtractionWarning>,
}

/// The last 13 monetary words of a line, zero-padded on the right.
/// `None` when the line has no monetary words at all.
fn trailing_values(line: &Line) -> Option<(usize, Amounts)> {
    let words = line.words();
    let money: Vec<&str> = words.into_iter().filter(|w| is_monetary(w)).collect();
    if money.is_empty() {
        return None;
    }
    let tail = &money[money.len().saturating_sub(13)..];
    let values: Vec<f64> = tail.iter().map(|w| normalize_amount(w)).collect();
    Some((tail.len(), Amounts::from_values(&values)))
}

/// Values for a labelled line: the label line itself when it carries all 13,
/// otherwise the following line, otherwise whatever the label line had.
fn marked_values(lines: &[Line], idx: usize) -> Option<Amounts> {
    let own = trailing_values(&lines[idx]);
    if let Some((13, amounts)) = own {
        return Some(amounts);
    }
    let next = lines.get(idx + 1).and_then(|l| trailing_values(l));
    match (own, next) {
        (_, Some((13, amounts))) => Some(amounts),
        (Some((_, amounts)), _) => Some(amounts),
        (None, Some((_, amounts))) => Some(amounts),
        (None, None) => None,
    }
}

/// Relative difference between the entries' base amount and the declared one.
pub fn mismatch_ratio(declared_base: f64, computed_base: f64) -> Option<f64> {
    if declared_base == 0.0 {
        return None;
    }
    Some((computed_base - declared_base).abs() / declared_base)
}

/// Reconcile the summary region against the extracted entries with the
/// default configuration.
pub fn reconcile(summary_lines: &[Line], entries_total: &Amounts) -> Reconciliation {
    reconcile_with_config(summary_lines, entries_total, &ParsingConfig::default())
}

/// Config-aware version of [`reconcile`].
///
/// Sources are tried in order: marked lines, positional numeric lines, then a
/// sum over the entries.
pub(crate) fn reconcile_with_config(
    summary_lines: &[Line],
    entries_total: &Amounts,
    config: &ParsingConfig,
) -> Reconciliation {
    let marked = summary_lines
        .iter()
        .position(|l| is_declared_marker(l, config))
        .and_then(|i| marked_values(summary_lines, i));

    let (declared, revised, source) = if let Some(declared) = marked {
        let revised = summary_lines
            .iter()
            .position(|l| is_revised_marker(l, config))
            .and_then(|i| marked_values(summary_lines, i))
            .unwrap_or_default();
        (declared, revised, SummarySource::Marked)
    } else {
        let positional: Vec<Amounts> = summary_lines
            .iter()
            .filter(|l| is_numeric_heavy(l, config) && !is_section_marker(l, config))
            .filter_map(|l| trailing_values(l).map(|(_, a)| a))
            .collect();
        match positional.as_slice() {
            [declared, rest @ ..] => (
                *declared,
                rest.first().copied().unwrap_or_default(),
                SummarySource::Positional,
            ),
            [] => (*entries_total, Amounts::default(), SummarySource::Computed),
        }
    };

    let warning = if source == SummarySource::Computed {
        Some(ExtractionWarning::SummaryAbsent)
    } else {
        mismatch_ratio(declared.base_amount, entries_total.base_amount)
            .filter(|ratio| *ratio > config.mismatch_tolerance)
            .map(|ratio| ExtractionWarning::SummaryMismatch {
                declared: declared.base_amount,
                computed: entries_total.base_amount,
                ratio,
            })
    };

    Reconciliation {
        declared,
        revised,
        source,
        warning,
    }
}
