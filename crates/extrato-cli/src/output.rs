use std::io::Write;

use extrato_core::{ExtractionResult, ExtractionStats, ExtractionWarning, UpsertOutcome};
use extrato_parsing::numeric::format_amount;
use extrato_parsing::section::line_numeric_ratio;
use extrato_parsing::{Line, Merge, ParseTrace, Sections};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// One input file in JSON output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport<'a> {
    pub file: String,
    #[serde(flatten)]
    pub result: Option<&'a ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<&'a ParseTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn write_json_reports(w: &mut dyn Write, reports: &[FileReport<'_>]) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *w, reports)?;
    writeln!(w)?;
    Ok(())
}

/// Print the header, entries and summaries of one statement.
pub fn print_statement(
    w: &mut dyn Write,
    file_name: &str,
    result: &ExtractionResult,
    color: ColorMode,
) -> std::io::Result<()> {
    let doc = &result.document;
    let h = &doc.header;

    if color.enabled() {
        writeln!(w, "{} {}", "STATEMENT:".bold().cyan(), file_name.bold())?;
    } else {
        writeln!(w, "STATEMENT: {}", file_name)?;
    }
    writeln!(w, "  Worker:   {} {}", h.worker_id, h.worker_name)?;
    writeln!(w, "  Period:   {}/{}", h.month, h.year)?;
    writeln!(w, "  Category: {}", h.category)?;
    writeln!(w)?;

    writeln!(
        w,
        "  {:>3} {:<9} {:<14} {:<28} {:>4} {:>2} {:>1} {:>5} {:>12} {:>12}",
        "DIA", "BATCH", "OPERATOR", "VESSEL", "FUN", "SH", "G", "PAY", "BASE", "NET"
    )?;
    for e in &doc.entries {
        let vessel = if e.vessel_name.chars().count() > 28 {
            let cut: String = e.vessel_name.chars().take(25).collect();
            format!("{}...", cut)
        } else {
            e.vessel_name.clone()
        };
        writeln!(
            w,
            "  {:>3} {:<9} {:<14} {:<28} {:>4} {:>2} {:>1} {:>5} {:>12} {:>12}",
            e.day,
            e.batch_id,
            e.operator_code,
            vessel,
            e.function_code,
            e.shift_code,
            e.gang_number,
            e.payment_date,
            format_amount(e.amounts.base_amount),
            format_amount(e.amounts.net_amount)
        )?;
    }
    writeln!(w)?;

    writeln!(
        w,
        "  Declared: base {} / net {}",
        format_amount(doc.summary.base_amount),
        format_amount(doc.summary.net_amount)
    )?;
    if !doc.revised_summary.is_zero() {
        writeln!(
            w,
            "  Revised:  base {} / net {}",
            format_amount(doc.revised_summary.base_amount),
            format_amount(doc.revised_summary.net_amount)
        )?;
    }
    Ok(())
}

pub fn print_warnings(
    w: &mut dyn Write,
    warnings: &[ExtractionWarning],
    color: ColorMode,
) -> std::io::Result<()> {
    for warning in warnings {
        let severe = matches!(
            warning,
            ExtractionWarning::IncompleteHeader { .. } | ExtractionWarning::SummaryMismatch { .. }
        );
        if !color.enabled() {
            writeln!(w, "  WARNING: {}", warning)?;
        } else if severe {
            writeln!(w, "  {} {}", "WARNING:".yellow().bold(), warning)?;
        } else {
            writeln!(w, "  {} {}", "WARNING:".yellow(), warning.dimmed())?;
        }
    }
    Ok(())
}

pub fn print_stats(
    w: &mut dyn Write,
    stats: &ExtractionStats,
    color: ColorMode,
) -> std::io::Result<()> {
    let line = format!(
        "  ({} lines, {} after {} merges; {} records, {} entries, {} duplicates, {} incomplete)",
        stats.lines_assembled,
        stats.lines_reconstructed,
        stats.merges,
        stats.records,
        stats.entries,
        stats.duplicates,
        stats.incomplete_records
    );
    if color.enabled() {
        writeln!(w, "{}", line.dimmed())
    } else {
        writeln!(w, "{}", line)
    }
}

/// Print the per-record decisions of a traced run.
pub fn print_trace(w: &mut dyn Write, trace: &ParseTrace, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "  {}", "TRACE".bold().magenta())?;
    } else {
        writeln!(w, "  TRACE")?;
    }
    if let Some(s) = &trace.sections {
        writeln!(
            w,
            "    sections: header {:?}, data {:?}, summary {:?} ({:?})",
            s.header, s.data, s.summary, s.summary_anchor
        )?;
    }
    for m in &trace.merges {
        writeln!(w, "    merge: line {} ({:?})", m.line_index, m.rule)?;
    }
    if !trace.header_relaxed.is_empty() {
        let names: Vec<String> = trace.header_relaxed.iter().map(|f| f.to_string()).collect();
        writeln!(w, "    header (whole-document pass): {}", names.join(", "))?;
    }
    for (i, r) in trace.records.iter().enumerate() {
        let anchor = r
            .anchor
            .map(|a| format!("{:?}", a))
            .unwrap_or_else(|| "none".to_string());
        let money = r
            .money_source
            .map(|m| format!("{:?}", m))
            .unwrap_or_else(|| "-".to_string());
        let mut flags = Vec::new();
        if r.duplicate {
            flags.push("duplicate");
        }
        if r.vessel_reappended {
            flags.push("vessel re-appended");
        }
        if r.day.is_none() {
            flags.push("unparsed");
        }
        writeln!(
            w,
            "    record {}: {} line(s), anchor {}, money {}{}",
            i + 1,
            r.line_count,
            anchor,
            money,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        )?;
    }
    if let Some(source) = trace.summary_source {
        writeln!(w, "    summary source: {:?}", source)?;
    }
    Ok(())
}

pub fn print_failure(
    w: &mut dyn Write,
    file_name: &str,
    error: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}: {}", "FAILED:".red().bold(), file_name, error)
    } else {
        writeln!(w, "FAILED: {}: {}", file_name, error)
    }
}

pub fn print_stored(
    w: &mut dyn Write,
    key: &str,
    outcome: UpsertOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    let verb = match outcome {
        UpsertOutcome::Inserted => "stored",
        UpsertOutcome::Replaced => "replaced",
    };
    if color.enabled() {
        writeln!(w, "  {} {}", verb.green(), key)
    } else {
        writeln!(w, "  {} {}", verb, key)
    }
}

/// Print lines with their region (`H`eader, `D`ata, `S`ummary) and merge marks.
pub fn print_lines(
    w: &mut dyn Write,
    lines: &[Line],
    sections: Option<&Sections>,
    merges: &[Merge],
    color: ColorMode,
) -> std::io::Result<()> {
    for (i, line) in lines.iter().enumerate() {
        let region = match sections {
            Some(s) if s.header.contains(&i) => "H",
            Some(s) if s.data.contains(&i) => "D",
            Some(s) if s.summary.contains(&i) => "S",
            Some(_) => "?",
            None => " ",
        };
        let merged = if merges.iter().any(|m| m.line_index == i) {
            "+"
        } else {
            " "
        };
        let ratio = line_numeric_ratio(line);
        let numeric = if sections.is_some() && ratio >= 0.5 {
            format!("  [numeric {:.2}]", ratio)
        } else {
            String::new()
        };
        let prefix = format!("{:>4} {}{} p{} y={:>6.1}", i, region, merged, line.page, line.y);
        if color.enabled() {
            writeln!(w, "{} {}{}", prefix.dimmed(), line.text, numeric.dimmed())?;
        } else {
            writeln!(w, "{} {}{}", prefix, line.text, numeric)?;
        }
    }
    if let Some(s) = sections
        && s.degraded
    {
        let msg = "no record-start line found; showing the fallback data prefix";
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    Ok(())
}
