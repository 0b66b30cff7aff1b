use serde::Serialize;

use crate::config::ParsingConfig;
use crate::fields::has_function_shift_pair;
use crate::layout::Line;
use crate::numeric::trailing_monetary;
use crate::section::{is_record_start, is_section_marker};

/// Why a line absorbed the line that followed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeRule {
    /// More `(` than `)`: a wrapped vessel name.
    OpenParenthesis,
    /// Record start without an adjacent function/shift pair.
    MissingAnchor,
    /// Record start with fewer than 13 trailing monetary words.
    SparseTail,
}

/// One merge performed during reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Merge {
    /// Index of the resulting line in the reconstructed sequence.
    pub line_index: usize,
    pub rule: MergeRule,
}

type RuleFn = fn(&Line, &ParsingConfig) -> bool;

/// Merge rules in priority order.
const RULES: &[(MergeRule, RuleFn)] = &[
    (MergeRule::OpenParenthesis, open_parenthesis),
    (MergeRule::MissingAnchor, missing_anchor),
    (MergeRule::SparseTail, sparse_tail),
];

fn open_parenthesis(line: &Line, _config: &ParsingConfig) -> bool {
    let open = line.text.matches('(').count();
    let close = line.text.matches(')').count();
    open > close
}

fn missing_anchor(line: &Line, config: &ParsingConfig) -> bool {
    is_record_start(line, config) && !has_function_shift_pair(&line.words(), config)
}

fn sparse_tail(line: &Line, config: &ParsingConfig) -> bool {
    is_record_start(line, config) && trailing_monetary(&line.words()) < 13
}

/// Whether `next` may be absorbed into the line above it.
fn can_absorb(current: &Line, next: &Line, config: &ParsingConfig) -> bool {
    current.page == next.page
        && !is_record_start(next, config)
        && !is_section_marker(next, config)
}

/// Merge line fragments that belong to one logical line.
pub fn reconstruct_lines(lines: &[Line]) -> (Vec<Line>, Vec<Merge>) {
    reconstruct_lines_with_config(lines, &ParsingConfig::default())
}

/// Config-aware version of [`reconstruct_lines`].
///
/// Each rule is tried in order against the growing candidate line and fires
/// at most once per candidate. Input lines are never modified.
pub(crate) fn reconstruct_lines_with_config(
    lines: &[Line],
    config: &ParsingConfig,
) -> (Vec<Line>, Vec<Merge>) {
    let mut out = Vec::with_capacity(lines.len());
    let mut merges = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let mut current = lines[i].clone();
        i += 1;
        for (rule, applies) in RULES {
            let Some(next) = lines.get(i) else { break };
            if applies(&current, config) && can_absorb(&current, next, config) {
                current = current.merged(next);
                merges.push(Merge {
                    line_index: out.len(),
                    rule: *rule,
                });
                i += 1;
            }
        }
        out.push(current);
    }

    (out, merges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use extrato_core::Token;

    fn line_at(page: usize, y: f64, text: &str) -> Line {
        let tokens = text
            .split_whitespace()
            .enumerate()
            .map(|(x, w)| Token::new(w, x as f64, y, page))
            .collect();
        Line::new(page, y, tokens)
    }

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| line_at(0, i as f64, t))
            .collect()
    }

    const THIRTEEN: &str =
        "1.439,07 100,00 50,00 0,00 10,00 5,00 2,00 1,00 1.242,74 20,00 30,00 40,00 50,00";

    #[test]
    fn test_open_parenthesis_merges_next() {
        let input = lines(&["BULK BOLIVIA (PORTO", "NOVO) 802 D 1 04/04"]);
        let (out, merges) = reconstruct_lines(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "BULK BOLIVIA (PORTO NOVO) 802 D 1 04/04");
        assert_eq!(merges, vec![Merge { line_index: 0, rule: MergeRule::OpenParenthesis }]);
    }

    #[test]
    fn test_complete_record_untouched() {
        let full = format!("01 684855 00 SAGRES INDIAN OCEAN 802 D 1 04/04 {}", THIRTEEN);
        let input = lines(&[&full, "02 684856 00 LIBRA"]);
        let (out, merges) = reconstruct_lines(&input);
        assert_eq!(out.len(), 2);
        assert!(merges.is_empty());
    }

    #[test]
    fn test_missing_anchor_then_sparse_tail() {
        let input = lines(&[
            "01 684855 00 SAGRES INDIAN OCEAN",
            "802 D 1 04/04 1.439,07 100,00",
            "50,00 0,00 10,00 5,00 2,00 1,00 1.242,74 20,00 30,00 40,00 50,00",
        ]);
        let (out, merges) = reconstruct_lines(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(
            merges.iter().map(|m| m.rule).collect::<Vec<_>>(),
            vec![MergeRule::MissingAnchor, MergeRule::SparseTail]
        );
        assert_eq!(trailing_monetary(&out[0].words()), 13);
    }

    #[test]
    fn test_never_absorbs_record_start() {
        let input = lines(&["01 684855 00 SAGRES", "02 684856 00 LIBRA"]);
        let (out, merges) = reconstruct_lines(&input);
        assert_eq!(out.len(), 2);
        assert!(merges.is_empty());
    }

    #[test]
    fn test_never_absorbs_marker_or_other_page() {
        let input = lines(&["01 684855 00 SAGRES", &format!("FOLHAS/COMPLEMENTOS {}", THIRTEEN)]);
        assert_eq!(reconstruct_lines(&input).0.len(), 2);

        let input = vec![
            line_at(0, 40.0, "01 684855 00 SAGRES (PORTO"),
            line_at(1, 1.0, "NOVO) 802 D 1 04/04"),
        ];
        assert_eq!(reconstruct_lines(&input).0.len(), 2);
    }

    #[test]
    fn test_each_rule_fires_once() {
        let input = lines(&["X (A", "(B", "C)", "D)"]);
        let (out, merges) = reconstruct_lines(&input);
        // Only the open-parenthesis rule applies to non-record lines.
        assert_eq!(merges.len(), 1);
        assert_eq!(out[0].text, "X (A (B");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_input_not_mutated() {
        let input = lines(&["BULK (PORTO", "NOVO)"]);
        let before = input.clone();
        let _ = reconstruct_lines(&input);
        assert_eq!(input, before);
    }
}
