//! Rule table mapping classification metadata to archive actions.
//!
//! Pure and deterministic: the same classification and company identity
//! always produce the same ordered action list. Folder layout:
//!
//! - archive: `{year}/{year-month}/<category>` with a derived filename
//! - review: `{year}/{year-month}` (documents a human must look at)
//! - unclassified: fixed root, original name, companion note

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::archive::types::{
    ActionKind, ArchiveAction, ClassificationResult, CompanyIdentity, DocumentGroup, DocumentKind,
    FolderPath, non_empty,
};
use crate::error::ArchiveError;

/// Category folder names under `{year}/{year-month}`.
pub mod folders {
    pub const INVOICES_CLIENTS: &str = "Invoices - Clients";
    pub const RECEIPTS_CLIENTS: &str = "Receipts - Clients";
    pub const INVOICES_SUPPLIERS: &str = "Invoices - Suppliers";
    pub const RECEIPTS_SUPPLIERS: &str = "Receipts - Suppliers";
    pub const TAXES: &str = "Taxes";
    pub const TAX_SETTLEMENTS: &str = "Taxes - Settlements";
    pub const BANKING: &str = "Banking";
    pub const PAYROLL: &str = "Payroll";
}

/// Activity scope and legal form follow the first comma or spaced dash.
static SCOPE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",|\s+[-–—]\s+").expect("scope separator regex"));

static LEGAL_FORM_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s+\(?(lda|limitada|s\.?\s?a\.?|s\.?\s?u\.?|sarl|ltd|llc|inc|gmbh|e\.?\s?p\.?|unipessoal)\.?\)?\s*$",
    )
    .expect("legal form regex")
});

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("non-alphanumeric regex"));

/// Normalize a company name for comparison.
///
/// 1. lowercase and fold Latin diacritics
/// 2. keep only what precedes the first `,` or ` - `
/// 3. strip trailing legal-form tokens (`Lda`, `S.A.`, `Ltd`, ...) repeatedly
/// 4. turn remaining punctuation into spaces and collapse whitespace
///
/// `"Ubiquus - Representacoes, Lda"` and `"UBIQUUS LDA"` both become `"ubiquus"`.
pub fn normalize_company_name(name: &str) -> String {
    let folded: String = name.to_lowercase().chars().map(fold_diacritic).collect();
    let mut head = SCOPE_SEPARATOR
        .split(&folded)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    loop {
        let stripped = LEGAL_FORM_SUFFIX.replace(&head, "").trim().to_string();
        if stripped == head || stripped.is_empty() {
            break;
        }
        head = stripped;
    }

    NON_ALNUM
        .replace_all(&head, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Replace characters that are invalid in filenames and collapse whitespace.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Declarative archiving policy for one company.
#[derive(Debug, Clone)]
pub struct RuleTable {
    company: CompanyIdentity,
    company_key: String,
}

impl RuleTable {
    pub fn new(company: CompanyIdentity) -> Self {
        let company_key = normalize_company_name(&company.display_name);
        Self {
            company,
            company_key,
        }
    }

    pub fn company(&self) -> &CompanyIdentity {
        &self.company
    }

    /// Whether a counterparty name refers to our company.
    pub fn matches_company_name(&self, candidate: Option<&str>) -> bool {
        match candidate {
            Some(name) => {
                !self.company_key.is_empty() && normalize_company_name(name) == self.company_key
            }
            None => false,
        }
    }

    /// Ordered actions for a classification. Never fails: missing metadata
    /// becomes a move to unclassified carrying the missing field.
    pub fn decide(&self, classification: &ClassificationResult) -> Vec<ArchiveAction> {
        match self.evaluate(classification) {
            Ok(actions) => actions,
            Err(e) => {
                debug!(
                    group = %classification.document_group,
                    error = %e,
                    "Rule could not derive destination"
                );
                vec![ArchiveAction::unclassified(e.to_string())]
            }
        }
    }

    /// Whether a planner may propose `action` for this classification: it
    /// must match one of the decided actions by kind and destination.
    /// Moving to unclassified is always allowed.
    pub fn allows(&self, classification: &ClassificationResult, action: &ArchiveAction) -> bool {
        if action.kind() == ActionKind::Unclassified {
            return true;
        }
        self.decide(classification)
            .iter()
            .any(|decided| decided.kind() == action.kind() && decided.path() == action.path())
    }

    /// Ordered actions, or the metadata error that prevented deriving them.
    pub fn evaluate(
        &self,
        classification: &ClassificationResult,
    ) -> Result<Vec<ArchiveAction>, ArchiveError> {
        if let Some(error) = classification.error() {
            return Ok(vec![ArchiveAction::unclassified(format!(
                "classification failed: {error}"
            ))]);
        }

        match classification.document_group {
            DocumentGroup::Commercial => self.commercial(classification),
            DocumentGroup::Customs => customs(classification),
            DocumentGroup::Tax => self.tax(classification),
            DocumentGroup::Banking => {
                let date = require_date(classification)?;
                Ok(vec![ArchiveAction::MoveTo {
                    path: FolderPath::dated(date).child(folders::BANKING),
                    new_name: Some(standard_name(classification, date)?),
                }])
            }
            DocumentGroup::Freight => Ok(vec![review(classification)]),
            DocumentGroup::Hr => hr(classification),
            DocumentGroup::Other => Ok(vec![ArchiveAction::unclassified(
                "documents in group OTHER are not archived",
            )]),
        }
    }

    fn commercial(
        &self,
        classification: &ClassificationResult,
    ) -> Result<Vec<ArchiveAction>, ArchiveError> {
        let kind = classification.kind();
        if kind == DocumentKind::ProForma {
            return Ok(vec![ArchiveAction::unclassified(
                "pro-forma invoices are not archived",
            )]);
        }

        if self
            .company
            .owns_tax_id(non_empty(&classification.issuer_tax_id))
        {
            let date = require_date(classification)?;
            let category = if kind == DocumentKind::Receipt {
                folders::RECEIPTS_CLIENTS
            } else {
                folders::INVOICES_CLIENTS
            };
            return Ok(vec![ArchiveAction::MoveTo {
                path: FolderPath::dated(date).child(category),
                new_name: Some(standard_name(classification, date)?),
            }]);
        }

        if self
            .company
            .owns_tax_id(non_empty(&classification.client_tax_id))
        {
            let date = require_date(classification)?;
            let category = if kind == DocumentKind::Receipt {
                folders::RECEIPTS_SUPPLIERS
            } else {
                folders::INVOICES_SUPPLIERS
            };
            let vendor = non_empty(&classification.vendor_name)
                .or_else(|| non_empty(&classification.issuer_tax_id))
                .ok_or_else(|| ArchiveError::missing("vendor_name"))?;
            let name = format!(
                "{} - {} - {}.pdf",
                date.format("%Y-%m-%d"),
                vendor,
                type_and_number(classification)?
            );
            return Ok(vec![ArchiveAction::MoveTo {
                path: FolderPath::dated(date).child(category),
                new_name: Some(sanitize_filename(&name)),
            }]);
        }

        Ok(vec![ArchiveAction::unclassified(format!(
            "company {} is neither issuer ({}) nor client ({})",
            self.company.fiscal_id,
            non_empty(&classification.issuer_tax_id).unwrap_or("none"),
            non_empty(&classification.client_tax_id).unwrap_or("none"),
        ))])
    }

    fn tax(
        &self,
        classification: &ClassificationResult,
    ) -> Result<Vec<ArchiveAction>, ArchiveError> {
        let ours = self
            .company
            .owns_tax_id(non_empty(&classification.taxpayer_tax_id))
            || self.matches_company_name(non_empty(&classification.taxpayer_name));

        if !ours {
            return Ok(vec![ArchiveAction::unclassified(format!(
                "taxpayer {} / {} does not match company",
                non_empty(&classification.taxpayer_tax_id).unwrap_or("none"),
                non_empty(&classification.taxpayer_name).unwrap_or("none"),
            ))]);
        }

        let date = require_date(classification)?;
        Ok(vec![ArchiveAction::MoveTo {
            path: FolderPath::dated(date).child(folders::TAXES),
            new_name: Some(standard_name(classification, date)?),
        }])
    }
}

fn customs(classification: &ClassificationResult) -> Result<Vec<ArchiveAction>, ArchiveError> {
    let category = match classification.kind() {
        DocumentKind::SettlementNote => folders::TAXES,
        DocumentKind::Receipt => folders::TAX_SETTLEMENTS,
        _ => return Ok(vec![review(classification)]),
    };

    let date = require_date(classification)?;
    let name = standard_name(classification, date)?;
    // Copy first: once the original has moved the copy would come from the review area.
    Ok(vec![
        ArchiveAction::CopyTo {
            path: FolderPath::dated(date).child(category),
            new_name: Some(name.clone()),
        },
        ArchiveAction::MoveToReview {
            path: FolderPath::dated(date),
            new_name: Some(name),
        },
    ])
}

fn hr(classification: &ClassificationResult) -> Result<Vec<ArchiveAction>, ArchiveError> {
    if classification.kind() != DocumentKind::PayrollSheet {
        return Ok(vec![review(classification)]);
    }

    let date = require_date(classification)?;
    let month = non_empty(&classification.reference_month)
        .ok_or_else(|| ArchiveError::missing("reference_month"))?;
    Ok(vec![ArchiveAction::MoveTo {
        path: FolderPath::dated(date).child(folders::PAYROLL),
        new_name: Some(sanitize_filename(&format!("Payroll {month}.pdf"))),
    }])
}

/// Review moves never fall back to unclassified: without a date the
/// document goes to the review root under its current name.
fn review(classification: &ClassificationResult) -> ArchiveAction {
    match classification.issue_date {
        Some(date) => ArchiveAction::MoveToReview {
            path: FolderPath::dated(date),
            new_name: standard_name(classification, date).ok(),
        },
        None => ArchiveAction::MoveToReview {
            path: FolderPath::root(),
            new_name: None,
        },
    }
}

fn require_date(classification: &ClassificationResult) -> Result<NaiveDate, ArchiveError> {
    classification
        .issue_date
        .ok_or_else(|| ArchiveError::missing("issue_date"))
}

/// `{TYPE}` or `{TYPE} {number}`.
fn type_and_number(classification: &ClassificationResult) -> Result<String, ArchiveError> {
    let doc_type = classification
        .document_type()
        .ok_or_else(|| ArchiveError::missing("document_type"))?
        .to_uppercase();
    Ok(match non_empty(&classification.document_number) {
        Some(number) => format!("{doc_type} {number}"),
        None => doc_type,
    })
}

/// `{date} - {TYPE} {number}.pdf`
fn standard_name(
    classification: &ClassificationResult,
    date: NaiveDate,
) -> Result<String, ArchiveError> {
    Ok(sanitize_filename(&format!(
        "{} - {}.pdf",
        date.format("%Y-%m-%d"),
        type_and_number(classification)?
    )))
}
