use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

pub mod config_file;
pub mod source;
pub mod store;

pub use source::{SourceError, TokenSource};
pub use store::{DocumentKey, DocumentStore, StoreError, UpsertOutcome};

/// Placeholder for any text field that could not be recovered.
pub const UNKNOWN: &str = "UNKNOWN";

/// Placeholder year used when the statement period cannot be recovered.
pub const UNKNOWN_YEAR: &str = "0000";

/// Placeholder vessel name for entries whose free-text span came out empty.
pub const UNIDENTIFIED_VESSEL: &str = "UNIDENTIFIED VESSEL";

/// A positioned unit of text as produced by a token source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub page: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, x: f64, y: f64, page: usize) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            page,
        }
    }
}

/// The 13 monetary columns shared by every work entry and both monthly summaries.
///
/// Field order matches the column order on the printed statement, which is
/// also the order of [`Amounts::values`] and [`Amounts::from_values`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amounts {
    pub base_amount: f64,
    pub social_security: f64,
    pub income_tax: f64,
    pub court_withholding: f64,
    pub union_due_a: f64,
    pub monthly_due: f64,
    pub union_due_b: f64,
    pub equipment_due: f64,
    pub net_amount: f64,
    pub vacation_accrual: f64,
    pub thirteenth_salary: f64,
    pub thirteenth_salary_charge: f64,
    pub severance_fund: f64,
}

/// A monthly aggregate (declared or revised) has the same shape as an entry's amounts.
pub type MonetarySummary = Amounts;

impl Amounts {
    pub const FIELD_COUNT: usize = 13;

    pub const FIELD_NAMES: [&'static str; Self::FIELD_COUNT] = [
        "baseAmount",
        "socialSecurity",
        "incomeTax",
        "courtWithholding",
        "unionDueA",
        "monthlyDue",
        "unionDueB",
        "equipmentDue",
        "netAmount",
        "vacationAccrual",
        "thirteenthSalary",
        "thirteenthSalaryCharge",
        "severanceFund",
    ];

    /// Build from positional values. Missing trailing values are zero and
    /// anything non-finite or negative is replaced by zero.
    pub fn from_values(values: &[f64]) -> Self {
        let at = |i: usize| sanitize(values.get(i).copied().unwrap_or(0.0));
        Self {
            base_amount: at(0),
            social_security: at(1),
            income_tax: at(2),
            court_withholding: at(3),
            union_due_a: at(4),
            monthly_due: at(5),
            union_due_b: at(6),
            equipment_due: at(7),
            net_amount: at(8),
            vacation_accrual: at(9),
            thirteenth_salary: at(10),
            thirteenth_salary_charge: at(11),
            severance_fund: at(12),
        }
    }

    pub fn values(&self) -> [f64; Self::FIELD_COUNT] {
        [
            self.base_amount,
            self.social_security,
            self.income_tax,
            self.court_withholding,
            self.union_due_a,
            self.monthly_due,
            self.union_due_b,
            self.equipment_due,
            self.net_amount,
            self.vacation_accrual,
            self.thirteenth_salary,
            self.thirteenth_salary_charge,
            self.severance_fund,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.values().iter().all(|v| *v == 0.0)
    }

    /// True when every component is finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.values().iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

impl Add for Amounts {
    type Output = Amounts;

    fn add(self, rhs: Amounts) -> Amounts {
        let (a, b) = (self.values(), rhs.values());
        let summed: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        Amounts::from_values(&summed)
    }
}

impl AddAssign for Amounts {
    fn add_assign(&mut self, rhs: Amounts) {
        *self = *self + rhs;
    }
}

impl<'a> std::iter::Sum<&'a Amounts> for Amounts {
    fn sum<I: Iterator<Item = &'a Amounts>>(iter: I) -> Amounts {
        iter.fold(Amounts::default(), |acc, a| acc + *a)
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

/// One line item of the statement: a single shift worked on one vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEntry {
    pub day: u8,
    /// `NNNNNN-NN`: payroll batch and sub-batch.
    pub batch_id: String,
    pub operator_code: String,
    pub vessel_name: String,
    pub function_code: String,
    pub shift_code: String,
    /// 1–3, or 0 when the gang column could not be recovered.
    pub gang_number: u8,
    /// `DD/MM`
    pub payment_date: String,
    #[serde(flatten)]
    pub amounts: Amounts,
}

/// Worker identity and statement period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderInfo {
    pub worker_id: String,
    pub worker_name: String,
    pub month: String,
    pub year: String,
    pub category: String,
}

impl Default for HeaderInfo {
    fn default() -> Self {
        Self {
            worker_id: UNKNOWN.to_string(),
            worker_name: UNKNOWN.to_string(),
            month: UNKNOWN.to_string(),
            year: UNKNOWN_YEAR.to_string(),
            category: UNKNOWN.to_string(),
        }
    }
}

/// A fully extracted pay statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub header: HeaderInfo,
    pub entries: Vec<WorkEntry>,
    pub summary: MonetarySummary,
    pub revised_summary: MonetarySummary,
}

impl Document {
    /// The `(workerId, month, year)` triple the storage collaborator upserts on.
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            worker_id: self.header.worker_id.clone(),
            month: self.header.month.clone(),
            year: self.header.year.clone(),
        }
    }

    /// Element-wise sum of every entry's amounts.
    pub fn entries_total(&self) -> Amounts {
        self.entries.iter().map(|e| &e.amounts).sum()
    }
}

/// Header fields that can individually fail to be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderField {
    WorkerId,
    WorkerName,
    Month,
    Year,
    Category,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WorkerId => "worker id",
            Self::WorkerName => "worker name",
            Self::Month => "month",
            Self::Year => "year",
            Self::Category => "category",
        };
        f.write_str(name)
    }
}

/// Work-entry fields that can individually fail to be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryField {
    OperatorCode,
    VesselName,
    FunctionCode,
    ShiftCode,
    GangNumber,
    PaymentDate,
    Amounts,
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OperatorCode => "operator code",
            Self::VesselName => "vessel name",
            Self::FunctionCode => "function code",
            Self::ShiftCode => "shift code",
            Self::GangNumber => "gang number",
            Self::PaymentDate => "payment date",
            Self::Amounts => "monetary values",
        };
        f.write_str(name)
    }
}

/// Non-fatal conditions raised while extracting a document.
///
/// None of these stop a [`Document`] from being produced; callers decide how
/// much to trust a result that carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExtractionWarning {
    /// Header fields replaced by sentinels after both search passes.
    IncompleteHeader { missing: Vec<HeaderField> },
    /// An entry kept with sentinel or zero-filled fields.
    #[serde(rename_all = "camelCase")]
    IncompleteRecord {
        day: u8,
        batch_id: String,
        missing: Vec<EntryField>,
    },
    /// A later entry with an already-seen `(day, batchId)`; it was dropped.
    #[serde(rename_all = "camelCase")]
    DuplicateRecord { day: u8, batch_id: String },
    /// Declared base amount and the sum over entries disagree by more than the tolerance.
    SummaryMismatch {
        declared: f64,
        computed: f64,
        ratio: f64,
    },
    /// No summary line found; the declared summary was computed from the entries.
    SummaryAbsent,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteHeader { missing } => {
                let names: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
                write!(f, "incomplete header: missing {}", names.join(", "))
            }
            Self::IncompleteRecord {
                day,
                batch_id,
                missing,
            } => {
                let names: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
                write!(
                    f,
                    "incomplete record (day {}, batch {}): missing {}",
                    day,
                    batch_id,
                    names.join(", ")
                )
            }
            Self::DuplicateRecord { day, batch_id } => {
                write!(f, "duplicate record dropped (day {}, batch {})", day, batch_id)
            }
            Self::SummaryMismatch {
                declared,
                computed,
                ratio,
            } => write!(
                f,
                "summary mismatch: declared base {:.2}, entries sum to {:.2} ({:.1}% off)",
                declared,
                computed,
                ratio * 100.0
            ),
            Self::SummaryAbsent => f.write_str("no summary found; totals computed from entries"),
        }
    }
}

/// Counters collected over one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub lines_assembled: usize,
    pub lines_reconstructed: usize,
    pub merges: usize,
    pub records: usize,
    pub entries: usize,
    pub duplicates: usize,
    pub incomplete_records: usize,
}

/// Result of extracting one statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document: Document,
    pub warnings: Vec<ExtractionWarning>,
    pub stats: ExtractionStats,
}

impl ExtractionResult {
    /// True when the header had to be filled with sentinels.
    pub fn is_low_confidence(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ExtractionWarning::IncompleteHeader { .. }))
    }
}
