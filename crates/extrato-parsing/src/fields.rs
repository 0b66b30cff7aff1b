use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use extrato_core::{Amounts, EntryField, UNIDENTIFIED_VESSEL, UNKNOWN, WorkEntry};

use crate::config::ParsingConfig;
use crate::grouping::LogicalRecord;
use crate::numeric::{is_monetary, normalize_amount};
use crate::section::match_record_start_with_config;

static PAYMENT_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}/\d{2}$").unwrap());

/// Which heuristic located the (function, shift, gang, date) quadruple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnchorStrategy {
    /// All four fields valid and adjacent.
    Exact,
    /// A function code directly followed by a shift code.
    FunctionShift,
    /// Walk back from the last `DD/MM` word, checking gang and shift.
    BackwardDate,
    /// Four words before the 13-value monetary tail.
    NumericTail,
}

/// Where the 13 monetary values were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoneySource {
    /// The run of monetary words right after the anchor quadruple.
    AfterAnchor,
    /// The last 13 monetary words of the record.
    Tail,
}

/// A work entry plus how it was recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub entry: WorkEntry,
    /// Fields replaced by sentinels or zero-filled.
    pub missing: Vec<EntryField>,
    /// `None` when no strategy found the quadruple.
    pub anchor: Option<AnchorStrategy>,
    pub money_source: MoneySource,
    /// Words after the monetary block were appended to balance the vessel's parentheses.
    pub vessel_reappended: bool,
}

impl ParsedRecord {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn is_gang(word: &str) -> bool {
    matches!(word, "1" | "2" | "3")
}

fn is_payment_date(word: &str) -> bool {
    PAYMENT_DATE_RE.is_match(word)
}

/// Accept vocabulary codes, and any three-digit code when the quadruple
/// position is already corroborated by its neighbours.
fn is_plausible_function(word: &str, config: &ParsingConfig) -> bool {
    config.is_function_code(word) || (word.len() == 3 && word.chars().all(|c| c.is_ascii_digit()))
}

/// Whether the words contain a function code immediately followed by a shift code.
pub(crate) fn has_function_shift_pair(words: &[&str], config: &ParsingConfig) -> bool {
    words
        .windows(2)
        .any(|w| config.is_function_code(w[0]) && config.is_shift_code(w[1]))
}

type StrategyFn = fn(&[&str], usize, &ParsingConfig) -> Option<usize>;

/// Anchor strategies in priority order. Each returns the index of the
/// function-code word, searching at or after `from`.
const STRATEGIES: &[(AnchorStrategy, StrategyFn)] = &[
    (AnchorStrategy::Exact, anchor_exact),
    (AnchorStrategy::FunctionShift, anchor_function_shift),
    (AnchorStrategy::BackwardDate, anchor_backward_date),
    (AnchorStrategy::NumericTail, anchor_numeric_tail),
];

fn anchor_exact(words: &[&str], from: usize, config: &ParsingConfig) -> Option<usize> {
    (from..words.len().saturating_sub(3)).find(|&i| {
        config.is_function_code(words[i])
            && config.is_shift_code(words[i + 1])
            && is_gang(words[i + 2])
            && is_payment_date(words[i + 3])
    })
}

fn anchor_function_shift(words: &[&str], from: usize, config: &ParsingConfig) -> Option<usize> {
    (from..words.len().saturating_sub(1))
        .find(|&i| config.is_function_code(words[i]) && config.is_shift_code(words[i + 1]))
}

fn anchor_backward_date(words: &[&str], from: usize, config: &ParsingConfig) -> Option<usize> {
    let date = words.iter().rposition(|w| is_payment_date(w))?;
    let start = date.checked_sub(3)?;
    if start < from {
        return None;
    }
    let plausible = is_gang(words[date - 1])
        && config.is_shift_code(words[date - 2])
        && is_plausible_function(words[start], config);
    plausible.then_some(start)
}

fn anchor_numeric_tail(words: &[&str], from: usize, _config: &ParsingConfig) -> Option<usize> {
    let money: Vec<usize> = (from..words.len()).filter(|&i| is_monetary(words[i])).collect();
    let first = *money.get(money.len().saturating_sub(13))?;
    Some(first.saturating_sub(4).max(from))
}

/// Find the anchor quadruple, trying each strategy in order.
pub(crate) fn find_anchor(
    words: &[&str],
    from: usize,
    config: &ParsingConfig,
) -> Option<(AnchorStrategy, usize)> {
    STRATEGIES
        .iter()
        .find_map(|(strategy, find)| find(words, from, config).map(|i| (*strategy, i)))
}

/// Longest operator-vocabulary match starting within the scan window.
/// Returns `(operator, start, end)` where `end` is one past the last matched word.
fn find_operator(
    words: &[&str],
    offset: usize,
    config: &ParsingConfig,
) -> Option<(String, usize, usize)> {
    let window_end = (offset + config.operator_scan_window).min(words.len());
    for start in offset..window_end {
        for name in &config.operators {
            let end = start + name.len();
            if end > words.len() {
                continue;
            }
            let hit = words[start..end]
                .iter()
                .zip(name.iter())
                .all(|(w, n)| w.eq_ignore_ascii_case(n));
            if hit {
                return Some((name.join(" "), start, end));
            }
        }
    }
    None
}

fn paren_balance(words: &[&str]) -> i64 {
    words.iter().fold(0i64, |acc, w| {
        acc + w.matches('(').count() as i64 - w.matches(')').count() as i64
    })
}

/// Parse a logical record with the default configuration.
pub fn parse_record(record: &LogicalRecord) -> Option<ParsedRecord> {
    parse_record_with_config(record, &ParsingConfig::default())
}

/// Config-aware version of [`parse_record`].
pub(crate) fn parse_record_with_config(
    record: &LogicalRecord,
    config: &ParsingConfig,
) -> Option<ParsedRecord> {
    parse_record_text(&record.text(), config)
}

/// Parse the joined text of one record. `None` when the record-start prefix
/// does not match.
pub(crate) fn parse_record_text(text: &str, config: &ParsingConfig) -> Option<ParsedRecord> {
    let start = match_record_start_with_config(text, config)?;
    let words: Vec<&str> = text.split_whitespace().collect();
    let offset = start.prefix_words.min(words.len());
    let mut missing = Vec::new();

    // Operator.
    // Words skipped before a match inside the scan window belong to the vessel.
    let (operator_code, op_start, op_end) = match find_operator(&words, offset, config) {
        Some(found) => found,
        None => match words.get(offset) {
            Some(w) if !is_monetary(w) && !config.is_function_code(w) => {
                (w.to_string(), offset, offset + 1)
            }
            _ => {
                missing.push(EntryField::OperatorCode);
                (UNKNOWN.to_string(), offset, offset)
            }
        },
    };

    // Anchor quadruple.
    let anchor = find_anchor(&words, op_end, config);
    let anchor_idx = anchor.map(|(_, i)| i);
    let quad = |k: usize| anchor_idx.and_then(|i| words.get(i + k)).copied();

    let function_code = match quad(0) {
        Some(w) if is_plausible_function(w, config) => w.to_string(),
        _ => {
            missing.push(EntryField::FunctionCode);
            UNKNOWN.to_string()
        }
    };
    let shift_code = match quad(1) {
        Some(w) if config.is_shift_code(w) => w.to_string(),
        _ => {
            missing.push(EntryField::ShiftCode);
            UNKNOWN.to_string()
        }
    };
    let gang_number = match quad(2) {
        Some(w) if is_gang(w) => w.parse().unwrap_or(0),
        _ => {
            missing.push(EntryField::GangNumber);
            0
        }
    };
    let payment_date = match quad(3) {
        Some(w) if is_payment_date(w) => w.to_string(),
        _ => {
            missing.push(EntryField::PaymentDate);
            UNKNOWN.to_string()
        }
    };

    // Monetary block.
    let money_from = anchor_idx.map(|i| (i + 4).min(words.len()));
    let after_anchor: Vec<usize> = money_from
        .map(|from| {
            (from..words.len())
                .take_while(|&i| is_monetary(words[i]))
                .take(13)
                .collect()
        })
        .unwrap_or_default();

    let (money_idx, money_source) = if after_anchor.len() == 13 {
        (after_anchor, MoneySource::AfterAnchor)
    } else {
        let all: Vec<usize> = (op_end..words.len())
            .filter(|&i| is_monetary(words[i]))
            .collect();
        let tail = all[all.len().saturating_sub(13)..].to_vec();
        (tail, MoneySource::Tail)
    };
    if money_idx.len() < 13 {
        missing.push(EntryField::Amounts);
    }
    let values: Vec<f64> = money_idx.iter().map(|&i| normalize_amount(words[i])).collect();
    let amounts = Amounts::from_values(&values);
    let money_end = money_idx.last().map(|&i| i + 1).unwrap_or(words.len());

    // Vessel: strictly between operator and anchor. Without an anchor, up to
    // the first monetary word.
    let vessel_end = anchor_idx.unwrap_or_else(|| {
        (op_end..words.len())
            .find(|&i| is_monetary(words[i]))
            .unwrap_or(words.len())
    });
    let mut vessel: Vec<&str> = words[offset..op_start].to_vec();
    vessel.extend_from_slice(&words[op_end.min(vessel_end)..vessel_end]);
    let mut vessel_reappended = false;
    if paren_balance(&vessel) > 0 {
        for w in words.iter().skip(money_end.max(vessel_end)) {
            vessel.push(*w);
            vessel_reappended = true;
            if paren_balance(&vessel) <= 0 {
                break;
            }
        }
    }
    let vessel_name = if vessel.is_empty() {
        missing.push(EntryField::VesselName);
        UNIDENTIFIED_VESSEL.to_string()
    } else {
        vessel.join(" ")
    };

    missing.sort_by_key(|f| *f as u8);

    Some(ParsedRecord {
        entry: WorkEntry {
            day: start.day,
            batch_id: start.batch_id(),
            operator_code,
            vessel_name,
            function_code,
            shift_code,
            gang_number,
            payment_date,
            amounts,
        },
        missing,
        anchor: anchor.map(|(s, _)| s),
        money_source,
        vessel_reappended,
    })
}
