//! Shared types for the archiving decision engine.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ArchiveError;

// ── Classification ──────────────────────────────────────────────────

/// Top-level document family reported by the classifier.
///
/// Accepts the English names and the Portuguese names the classifier was
/// originally trained with. Anything unrecognised lands in `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentGroup {
    Commercial,
    Customs,
    Tax,
    Banking,
    Freight,
    Hr,
    #[default]
    Other,
}

impl DocumentGroup {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMMERCIAL" | "DOCUMENTOS_COMERCIAIS" => Self::Commercial,
            "CUSTOMS" | "DOCUMENTOS_ADUANEIROS" => Self::Customs,
            "TAX" | "DOCUMENTOS_FISCAIS" => Self::Tax,
            "BANKING" | "DOCUMENTOS_BANCARIOS" => Self::Banking,
            "FREIGHT" | "DOCUMENTOS_FRETE" => Self::Freight,
            "HR" | "DOCUMENTOS_RH" => Self::Hr,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commercial => "COMMERCIAL",
            Self::Customs => "CUSTOMS",
            Self::Tax => "TAX",
            Self::Banking => "BANKING",
            Self::Freight => "FREIGHT",
            Self::Hr => "HR",
            Self::Other => "OTHER",
        }
    }
}

impl From<String> for DocumentGroup {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DocumentGroup> for String {
    fn from(group: DocumentGroup) -> Self {
        group.as_str().to_string()
    }
}

impl fmt::Display for DocumentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document type families the rule table branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    ProForma,
    Receipt,
    InvoiceLike,
    SettlementNote,
    PayrollSheet,
    Other,
}

impl DocumentKind {
    /// Map a free-form document type onto a kind (case-insensitive, English or Portuguese).
    pub fn of(document_type: &str) -> Self {
        let normalized = document_type
            .trim()
            .to_ascii_uppercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "PRO_FORMA_INVOICE" | "PROFORMA_INVOICE" | "PRO_FORMA" | "FACTURA_PRO_FORMA"
            | "FATURA_PRO_FORMA" => Self::ProForma,
            "RECEIPT" | "RECIBO" => Self::Receipt,
            "INVOICE" | "INVOICE_RECEIPT" | "GLOBAL_INVOICE" | "GENERIC_INVOICE" | "CREDIT_NOTE"
            | "DEBIT_NOTE" | "FACTURA" | "FATURA" | "FACTURA_RECIBO" | "FATURA_RECIBO"
            | "FACTURA_GLOBAL" | "FACTURA_GENERICA" | "NOTA_CREDITO" | "NOTA_DE_CREDITO"
            | "NOTA_DEBITO" | "NOTA_DE_DEBITO" => Self::InvoiceLike,
            "SETTLEMENT_NOTE" | "NOTA_LIQUIDACAO" | "NOTA_DE_LIQUIDACAO" => Self::SettlementNote,
            "PAYROLL_SHEET" | "PAYROLL" | "FOLHA_REMUNERACAO" | "FOLHA_DE_REMUNERACAO" => {
                Self::PayrollSheet
            }
            _ => Self::Other,
        }
    }
}

/// Structured metadata returned by the classifier for one document.
///
/// When `error` is set nothing else in here may drive an archiving decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default, alias = "grupo_documento")]
    pub document_group: DocumentGroup,
    #[serde(default, alias = "tipo_documento")]
    pub document_type: Option<String>,
    #[serde(default, alias = "nif_emitente")]
    pub issuer_tax_id: Option<String>,
    #[serde(default, alias = "nif_cliente")]
    pub client_tax_id: Option<String>,
    #[serde(default, alias = "nif_contribuinte")]
    pub taxpayer_tax_id: Option<String>,
    #[serde(default, alias = "nome_contribuinte")]
    pub taxpayer_name: Option<String>,
    #[serde(default, alias = "nome_emitente")]
    pub vendor_name: Option<String>,
    #[serde(
        default,
        alias = "data_emissao",
        deserialize_with = "deserialize_lenient_date"
    )]
    pub issue_date: Option<NaiveDate>,
    #[serde(default, alias = "numero_documento")]
    pub document_number: Option<String>,
    #[serde(default, alias = "mes_referencia")]
    pub reference_month: Option<String>,
    #[serde(default, alias = "valor_total")]
    pub total_amount: Option<Decimal>,
    #[serde(default, alias = "moeda")]
    pub currency: Option<String>,
    #[serde(default, alias = "notas_triagem")]
    pub triage_notes: Option<String>,
    #[serde(default, alias = "erro")]
    pub error: Option<String>,
}

impl ClassificationResult {
    /// A result carrying only a group; every other field empty.
    pub fn new(document_group: DocumentGroup) -> Self {
        Self {
            document_group,
            document_type: None,
            issuer_tax_id: None,
            client_tax_id: None,
            taxpayer_tax_id: None,
            taxpayer_name: None,
            vendor_name: None,
            issue_date: None,
            document_number: None,
            reference_month: None,
            total_amount: None,
            currency: None,
            triage_notes: None,
            error: None,
        }
    }

    /// A failed classification.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(DocumentGroup::Other)
        }
    }

    /// The classifier error, if any (blank strings do not count).
    pub fn error(&self) -> Option<&str> {
        non_empty(&self.error)
    }

    pub fn document_type(&self) -> Option<&str> {
        non_empty(&self.document_type)
    }

    pub fn kind(&self) -> DocumentKind {
        self.document_type()
            .map(DocumentKind::of)
            .unwrap_or(DocumentKind::Other)
    }

    /// Render as `key: value` lines wrapped at 100 columns, nulls skipped.
    pub fn to_note_text(&self) -> String {
        let value = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return format!("{:?}", self),
        };

        let mut lines = Vec::new();
        for (key, field) in value {
            let rendered = match field {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) if s.trim().is_empty() => continue,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            lines.extend(wrap_line(&format!("{key}: {rendered}"), NOTE_WIDTH));
        }
        lines.join("\n")
    }
}

const NOTE_WIDTH: usize = 100;

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let extra = if current.is_empty() { 0 } else { 1 };
        if !current.is_empty() && current.chars().count() + extra + word.chars().count() > width {
            out.push(std::mem::take(&mut current));
            current.push_str("  ");
        } else if extra == 1 {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn deserialize_lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date))
}

/// Parse the date shapes classifiers tend to emit. Unparseable input is treated as absent.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

// ── Company identity ────────────────────────────────────────────────

/// The company whose archive this is. Read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyIdentity {
    /// Exact-match key against issuer / client / taxpayer ids.
    pub fiscal_id: String,
    /// Compared after legal-form stripping when no fiscal id is present.
    pub display_name: String,
}

impl CompanyIdentity {
    pub fn new(fiscal_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            fiscal_id: fiscal_id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn owns_tax_id(&self, candidate: Option<&str>) -> bool {
        let ours = self.fiscal_id.trim();
        !ours.is_empty() && candidate.map(str::trim) == Some(ours)
    }
}

// ── Folder paths ────────────────────────────────────────────────────

/// Folder-name segments relative to one of the archive roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    /// The root itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// `{year}/{year-month}` for a date.
    pub fn dated(date: NaiveDate) -> Self {
        Self::root()
            .child(format!("{}", date.year()))
            .child(date.format("%Y-%m").to_string())
    }

    /// Parse an untrusted `a/b/c` path. Empty segments from doubled or
    /// trailing slashes are dropped; `.` and `..` are rejected.
    pub fn parse(raw: &str) -> Result<Self, ArchiveError> {
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            if segment == "." || segment == ".." {
                return Err(ArchiveError::InvalidPath {
                    path: raw.to_string(),
                    reason: "relative segments are not allowed".to_string(),
                });
            }
            if segment.chars().any(char::is_control) {
                return Err(ArchiveError::InvalidPath {
                    path: raw.to_string(),
                    reason: "control characters in segment".to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Append one segment. Slashes are replaced so a segment never splits.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        let segment = segment.into().replace(['/', '\\'], "_");
        let segment = segment.trim();
        if !segment.is_empty() {
            self.segments.push(segment.to_string());
        }
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl TryFrom<String> for FolderPath {
    type Error = ArchiveError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<FolderPath> for String {
    fn from(path: FolderPath) -> Self {
        path.to_string()
    }
}

/// Which top-level area a destination is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveRoot {
    Archive,
    Review,
    Unclassified,
}

/// Resolved folder ids of the areas a run works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRoots {
    pub archive: String,
    pub review: String,
    pub unclassified: String,
    pub drop: String,
}

impl ArchiveRoots {
    pub fn id_of(&self, root: ArchiveRoot) -> &str {
        match root {
            ArchiveRoot::Archive => &self.archive,
            ArchiveRoot::Review => &self.review,
            ArchiveRoot::Unclassified => &self.unclassified,
        }
    }
}

// ── Archive actions ─────────────────────────────────────────────────

/// One archiving step. The closed set of effects a planner may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ArchiveAction {
    MoveTo {
        path: FolderPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_name: Option<String>,
    },
    CopyTo {
        path: FolderPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_name: Option<String>,
    },
    MoveToReview {
        path: FolderPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_name: Option<String>,
    },
    MoveToUnclassified {
        reason: String,
    },
}

/// Discriminant of [`ArchiveAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Move,
    Copy,
    Review,
    Unclassified,
}

impl ArchiveAction {
    pub fn unclassified(reason: impl Into<String>) -> Self {
        Self::MoveToUnclassified {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::MoveTo { .. } => ActionKind::Move,
            Self::CopyTo { .. } => ActionKind::Copy,
            Self::MoveToReview { .. } => ActionKind::Review,
            Self::MoveToUnclassified { .. } => ActionKind::Unclassified,
        }
    }

    /// Destination folder. `None` for unclassified, whose folder is fixed.
    pub fn path(&self) -> Option<&FolderPath> {
        match self {
            Self::MoveTo { path, .. }
            | Self::CopyTo { path, .. }
            | Self::MoveToReview { path, .. } => Some(path),
            Self::MoveToUnclassified { .. } => None,
        }
    }

    /// Whether the action changes where the original file lives.
    pub fn relocates(&self) -> bool {
        !matches!(self, Self::CopyTo { .. })
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MoveTo { .. } => "move_to",
            Self::CopyTo { .. } => "copy_to",
            Self::MoveToReview { .. } => "move_to_review",
            Self::MoveToUnclassified { .. } => "move_to_unclassified",
        }
    }
}

impl fmt::Display for ArchiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoveTo { path, new_name }
            | Self::CopyTo { path, new_name }
            | Self::MoveToReview { path, new_name } => {
                write!(f, "{}(\"{}\"", self.label(), path)?;
                if let Some(name) = new_name {
                    write!(f, ", \"{}\"", name)?;
                }
                f.write_str(")")
            }
            Self::MoveToUnclassified { reason } => {
                write!(f, "{}(\"{}\")", self.label(), reason)
            }
        }
    }
}

/// An action a planner asked for, bound to the file it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedAction {
    pub file_id: String,
    pub action: ArchiveAction,
}

// ── Documents and outcomes ──────────────────────────────────────────

/// A file in the storage backend. The core never holds its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Per-document state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Classified,
    Planning,
    Executing,
    Archived,
    Review,
    Unclassified,
    Failed,
}

impl DocumentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Archived | Self::Review | Self::Unclassified | Self::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classified => "classified",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Archived => "archived",
            Self::Review => "review",
            Self::Unclassified => "unclassified",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong while archiving a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    /// The action being executed when the failure happened (`None` for planning failures).
    pub attempted: Option<ArchiveAction>,
    pub error: String,
    /// Set when the move to unclassified also failed.
    pub fallback_error: Option<String>,
}

/// Terminal result for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    pub document: DocumentRef,
    pub state: DocumentState,
    /// Actions that completed, in execution order.
    pub executed: Vec<ArchiveAction>,
    pub incident: Option<Incident>,
}

/// Outcomes of one drop-folder run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<ArchiveOutcome>,
}

impl RunReport {
    pub fn count(&self, state: DocumentState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ArchiveOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == DocumentState::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn group_accepts_english_and_portuguese() {
        assert_eq!(DocumentGroup::parse("COMMERCIAL"), DocumentGroup::Commercial);
        assert_eq!(
            DocumentGroup::parse("documentos_aduaneiros"),
            DocumentGroup::Customs
        );
        assert_eq!(DocumentGroup::parse("DOCUMENTOS_RH"), DocumentGroup::Hr);
        assert_eq!(DocumentGroup::parse("SOMETHING_ELSE"), DocumentGroup::Other);
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(DocumentKind::of("INVOICE"), DocumentKind::InvoiceLike);
        assert_eq!(DocumentKind::of("nota de credito"), DocumentKind::InvoiceLike);
        assert_eq!(DocumentKind::of("RECIBO"), DocumentKind::Receipt);
        assert_eq!(DocumentKind::of("FACTURA_PRO_FORMA"), DocumentKind::ProForma);
        assert_eq!(DocumentKind::of("SETTLEMENT_NOTE"), DocumentKind::SettlementNote);
        assert_eq!(DocumentKind::of("FOLHA_REMUNERACAO"), DocumentKind::PayrollSheet);
        assert_eq!(DocumentKind::of("MEMO"), DocumentKind::Other);
    }

    #[test]
    fn deserializes_original_field_names() {
        let json = serde_json::json!({
            "grupo_documento": "DOCUMENTOS_COMERCIAIS",
            "tipo_documento": "FACTURA",
            "nif_emitente": "5000000000",
            "data_emissao": "2024-01-15",
            "numero_documento": "FT 1/2024",
            "valor_total": "1500.50"
        });
        let result: ClassificationResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.document_group, DocumentGroup::Commercial);
        assert_eq!(result.document_type(), Some("FACTURA"));
        assert_eq!(result.issue_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(result.total_amount, Some(dec!(1500.50)));
        assert!(result.error().is_none());
    }

    #[test]
    fn unparseable_date_is_absent() {
        let json = serde_json::json!({
            "document_group": "BANKING",
            "issue_date": "sometime last spring"
        });
        let result: ClassificationResult = serde_json::from_value(json).unwrap();
        assert!(result.issue_date.is_none());
    }

    #[test]
    fn parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 2);
        assert_eq!(parse_date("2024-03-02"), expected);
        assert_eq!(parse_date("02/03/2024"), expected);
        assert_eq!(parse_date("2024-03-02T10:00:00Z"), expected);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn blank_error_is_not_an_error() {
        let mut result = ClassificationResult::new(DocumentGroup::Tax);
        result.error = Some("   ".into());
        assert!(result.error().is_none());
        assert_eq!(
            ClassificationResult::failed("low confidence").error(),
            Some("low confidence")
        );
    }

    #[test]
    fn note_text_wraps_long_values() {
        let mut result = ClassificationResult::new(DocumentGroup::Other);
        result.triage_notes = Some("word ".repeat(60));
        let text = result.to_note_text();
        assert!(text.contains("document_group: OTHER"));
        assert!(text.lines().all(|l| l.chars().count() <= 100));
        assert!(!text.contains("issuer_tax_id"));
    }

    #[test]
    fn folder_path_parse_and_display() {
        let path = FolderPath::parse("2024//2024-01/Taxes/").unwrap();
        assert_eq!(path.segments(), ["2024", "2024-01", "Taxes"]);
        assert_eq!(path.to_string(), "2024/2024-01/Taxes");
        assert!(FolderPath::parse("").unwrap().is_root());
        assert!(matches!(
            FolderPath::parse("2024/../secrets"),
            Err(ArchiveError::InvalidPath { .. })
        ));
    }

    #[test]
    fn folder_path_child_never_splits() {
        let path = FolderPath::root().child("a/b").child("  ");
        assert_eq!(path.segments(), ["a_b"]);
    }

    #[test]
    fn dated_path() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(FolderPath::dated(date).to_string(), "2024/2024-01");
    }

    #[test]
    fn action_serialization() {
        let action = ArchiveAction::MoveTo {
            path: FolderPath::parse("2024/2024-01/Banking").unwrap(),
            new_name: None,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "move_to");
        assert_eq!(json["path"], "2024/2024-01/Banking");
        assert!(json.get("new_name").is_none());
    }

    #[test]
    fn copy_does_not_relocate() {
        let copy = ArchiveAction::CopyTo {
            path: FolderPath::root(),
            new_name: None,
        };
        assert!(!copy.relocates());
        assert!(ArchiveAction::unclassified("x").relocates());
    }

    #[test]
    fn owns_tax_id_trims() {
        let company = CompanyIdentity::new("5000000000", "Acme, Lda");
        assert!(company.owns_tax_id(Some(" 5000000000 ")));
        assert!(!company.owns_tax_id(Some("5000000001")));
        assert!(!company.owns_tax_id(None));
        assert!(!CompanyIdentity::new("", "x").owns_tax_id(Some("")));
    }

    #[test]
    fn terminal_states() {
        assert!(DocumentState::Archived.is_terminal());
        assert!(DocumentState::Failed.is_terminal());
        assert!(!DocumentState::Planning.is_terminal());
    }
}
