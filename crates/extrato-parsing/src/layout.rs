use std::collections::BTreeMap;

use extrato_core::Token;

use crate::config::ParsingConfig;

/// Tokens sharing one (rounded) vertical position on one page, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub page: usize,
    /// The rounded y of the line's first row.
    pub y: f64,
    /// The rounded y of its last row. Equal to `y` unless rows were folded
    /// or fragments merged into it.
    pub y_end: f64,
    pub tokens: Vec<Token>,
    /// Token texts joined with single spaces.
    pub text: String,
}

impl Line {
    pub fn new(page: usize, y: f64, tokens: Vec<Token>) -> Self {
        let text = tokens
            .iter()
            .map(|t| t.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            page,
            y,
            y_end: y,
            tokens,
            text,
        }
    }

    /// Set the bottom row of a line spanning several rows.
    pub fn with_y_end(mut self, y_end: f64) -> Self {
        self.y_end = y_end.max(self.y);
        self
    }

    /// Whitespace-separated words of the line text.
    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// A new line made of `self` followed by `next`. Token coordinates are kept
    /// as they were; page and top come from `self`, and the bottom extends to
    /// `next` when both sit on the same page.
    pub fn merged(&self, next: &Line) -> Line {
        let mut tokens = self.tokens.clone();
        tokens.extend(next.tokens.iter().cloned());
        let text = match (self.text.is_empty(), next.text.is_empty()) {
            (true, _) => next.text.clone(),
            (_, true) => self.text.clone(),
            _ => format!("{} {}", self.text, next.text),
        };
        let y_end = if next.page == self.page {
            self.y_end.max(next.y_end)
        } else {
            self.y_end
        };
        Line {
            page: self.page,
            y: self.y,
            y_end,
            tokens,
            text,
        }
    }

    /// Vertical gap between the nearest edges of `self` and `other`; zero when
    /// they overlap, infinite across pages.
    pub fn distance_to(&self, other: &Line) -> f64 {
        if self.page != other.page {
            f64::INFINITY
        } else if other.y >= self.y_end {
            other.y - self.y_end
        } else if self.y >= other.y_end {
            self.y - other.y_end
        } else {
            0.0
        }
    }
}

/// Group tokens into lines using the default configuration.
pub fn assemble_lines(tokens: &[Token]) -> Vec<Line> {
    assemble_lines_with_config(tokens, &ParsingConfig::default())
}

/// Config-aware version of [`assemble_lines`].
///
/// Tokens are bucketed by page, then by y rounded to one decimal. A row closer
/// than `y_tolerance` to the first row of the line being built is folded into
/// it, so jittered baselines stay together without chaining down the page.
/// Within a line, tokens are sorted by x (stable, so equal x keeps input
/// order). Blank tokens are dropped.
pub(crate) fn assemble_lines_with_config(tokens: &[Token], config: &ParsingConfig) -> Vec<Line> {
    // page -> rounded y (tenths) -> tokens in input order
    let mut pages: BTreeMap<usize, BTreeMap<i64, Vec<&Token>>> = BTreeMap::new();
    for token in tokens {
        if token.text.trim().is_empty() || !token.y.is_finite() {
            continue;
        }
        let row = (token.y * 10.0).round() as i64;
        pages
            .entry(token.page)
            .or_default()
            .entry(row)
            .or_default()
            .push(token);
    }

    let mut lines = Vec::new();
    for (page, rows) in pages {
        let mut current: Option<(i64, i64, Vec<&Token>)> = None;
        for (row, row_tokens) in rows {
            let fold = matches!(
                &current,
                Some((first, _, _)) if config.y_tolerance > 0.0
                    && ((row - *first) as f64 / 10.0) < config.y_tolerance
            );
            if fold {
                if let Some((_, last, acc)) = current.as_mut() {
                    acc.extend(row_tokens);
                    *last = row;
                }
                continue;
            }
            if let Some((first, last, acc)) = current.take() {
                lines.push(build_line(page, first, last, acc));
            }
            current = Some((row, row, row_tokens));
        }
        if let Some((first, last, acc)) = current {
            lines.push(build_line(page, first, last, acc));
        }
    }
    lines
}

fn build_line(page: usize, first: i64, last: i64, mut tokens: Vec<&Token>) -> Line {
    tokens.sort_by(|a, b| a.x.total_cmp(&b.x));
    Line::new(page, first as f64 / 10.0, tokens.into_iter().cloned().collect())
        .with_y_end(last as f64 / 10.0)
}
