//! Planners — produce the tool calls that archive one document.
//!
//! A planner only proposes. Its output goes through the tool registry and
//! the decision protocol before anything touches storage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::archive::rules::{RuleTable, folders};
use crate::archive::types::ClassificationResult;
use crate::context::DocumentContext;
use crate::error::PlannerError;
use crate::llm::{ChatMessage, LlmProvider, Reasoning, TokenUsage, ToolCall, Turn};
use crate::tools::ToolRegistry;

/// Max tool-calling rounds per document.
pub const MAX_PLANNING_ROUNDS: usize = 4;

/// Temperature for planning calls.
const PLANNING_TEMPERATURE: f32 = 0.2;

const PLANNING_MAX_TOKENS: u32 = 1024;

/// Tool result sent back for every call; execution happens after planning.
const QUEUED: &str = "queued";

#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(
        &self,
        ctx: &DocumentContext,
        classification: &ClassificationResult,
    ) -> Result<Vec<ToolCall>, PlannerError>;
}

// ── Rule planner ────────────────────────────────────────────────────

/// Deterministic planner backed by the rule table.
pub struct RulePlanner {
    rules: Arc<RuleTable>,
}

impl RulePlanner {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Planner for RulePlanner {
    fn name(&self) -> &str {
        "rules"
    }

    async fn plan(
        &self,
        ctx: &DocumentContext,
        classification: &ClassificationResult,
    ) -> Result<Vec<ToolCall>, PlannerError> {
        Ok(self
            .rules
            .decide(classification)
            .iter()
            .enumerate()
            .map(|(i, action)| action.to_tool_call(ctx.file_id(), format!("rule_{i}")))
            .collect())
    }
}

// ── LLM planner ─────────────────────────────────────────────────────

/// Planner that asks an LLM to call the archive tools.
pub struct LlmPlanner {
    reasoning: Reasoning,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>, rules: &RuleTable, registry: &ToolRegistry) -> Self {
        let reasoning = Reasoning::new(llm)
            .with_system_prompt(build_planning_system_prompt(rules))
            .with_tools(registry.tool_definitions())
            .with_temperature(PLANNING_TEMPERATURE)
            .with_max_tokens(PLANNING_MAX_TOKENS);
        Self { reasoning }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    fn name(&self) -> &str {
        "llm"
    }

    async fn plan(
        &self,
        ctx: &DocumentContext,
        classification: &ClassificationResult,
    ) -> Result<Vec<ToolCall>, PlannerError> {
        let mut messages = vec![ChatMessage::user(build_planning_user_prompt(
            ctx,
            classification,
        )?)];
        let mut planned = Vec::new();
        let mut usage = TokenUsage::default();

        for round in 1..=MAX_PLANNING_ROUNDS {
            let output = self.reasoning.next_turn(&messages).await?;
            usage += output.usage;

            match output.turn {
                Turn::Done(text) => {
                    debug!(
                        file_id = %ctx.file_id(),
                        round,
                        summary = %text.chars().take(200).collect::<String>(),
                        "Planner finished"
                    );
                    info!(
                        file_id = %ctx.file_id(),
                        model = %self.reasoning.model_name(),
                        calls = planned.len(),
                        tokens = usage.total(),
                        cost = %self.reasoning.cost(usage),
                        "LLM plan ready"
                    );
                    return Ok(planned);
                }
                Turn::Calls { calls, content } => {
                    debug!(file_id = %ctx.file_id(), round, calls = calls.len(), "Planner called tools");
                    messages.push(ChatMessage::assistant_with_tool_calls(content, calls.clone()));
                    for call in &calls {
                        messages.push(ChatMessage::tool_result(&call.id, &call.name, QUEUED));
                    }
                    planned.extend(calls);
                }
            }
        }

        warn!(
            file_id = %ctx.file_id(),
            calls = planned.len(),
            tokens = usage.total(),
            "Planner never finished"
        );
        Err(PlannerError::RoundLimit(MAX_PLANNING_ROUNDS))
    }
}

/// Company identity, archiving policy and tool contract.
pub fn build_planning_system_prompt(rules: &RuleTable) -> String {
    let company = rules.company();
    format!(
        r#"You archive classified business documents for one company.

## Our company
- Fiscal id: {fiscal_id}
- Name: {name}

Compare fiscal ids exactly. Company names may carry an activity scope and a
legal form after a comma or a dash ("Acme - Trading, Lda"); ignore those
when comparing names.

## Folder layout
Archive paths are relative to the archive root: {{year}}/{{year-month}}/<category>.
Review paths are relative to the review root: {{year}}/{{year-month}}.
Dates come from issue_date. {{date}} is YYYY-MM-DD, {{type}} is document_type in
upper case, {{number}} is document_number (omit it when absent).

## Rules by document group
1. COMMERCIAL
   - PRO_FORMA_INVOICE: move to unclassified.
   - issuer_tax_id is ours (we sold it):
     RECEIPT -> "{receipts_clients}", anything else -> "{invoices_clients}".
     Name: "{{date}} - {{type}} {{number}}.pdf"
   - client_tax_id is ours (we bought it):
     RECEIPT -> "{receipts_suppliers}", anything else -> "{invoices_suppliers}".
     Name: "{{date}} - {{vendor_name}} - {{type}} {{number}}.pdf"
   - neither: move to unclassified.
2. CUSTOMS
   - SETTLEMENT_NOTE: copy to "{taxes}", then move to review.
   - RECEIPT: copy to "{tax_settlements}", then move to review.
   - anything else: move to review.
   Name for copies and review: "{{date}} - {{type}} {{number}}.pdf"
3. TAX
   - taxpayer_tax_id is ours or taxpayer_name is our company: move to "{taxes}".
     Name: "{{date}} - {{type}} {{number}}.pdf"
   - otherwise: move to unclassified.
4. BANKING: move to "{banking}". Name: "{{date}} - {{type}} {{number}}.pdf"
5. FREIGHT: move to review. Never unclassified.
   Name: "{{date}} - {{type}} {{number}}.pdf"
6. HR
   - PAYROLL_SHEET: move to "{payroll}". Name: "Payroll {{reference_month}}.pdf"
   - anything else: move to review. Name: "{{date}} - {{type}} {{number}}.pdf"
7. OTHER: move to unclassified.

When metadata needed for a folder or a name is missing, move to unclassified
and say which field is missing.

## Tools
- archive_move_to_folder(file_id, path, new_name): move into the archive.
- archive_copy_to_folder(file_id, path, new_name): copy into the archive; the
  original stays. Always call it before the move, never after.
- archive_move_to_review(file_id, path, new_name): move to the review area.
- archive_move_to_unclassified(file_id, reason): move to unclassified.

Use the file_id given in the user message. Finish every document with exactly
one move. When you are done, reply with a one-line summary and no tool calls."#,
        fiscal_id = company.fiscal_id,
        name = company.display_name,
        receipts_clients = folders::RECEIPTS_CLIENTS,
        invoices_clients = folders::INVOICES_CLIENTS,
        receipts_suppliers = folders::RECEIPTS_SUPPLIERS,
        invoices_suppliers = folders::INVOICES_SUPPLIERS,
        taxes = folders::TAXES,
        tax_settlements = folders::TAX_SETTLEMENTS,
        banking = folders::BANKING,
        payroll = folders::PAYROLL,
    )
}

/// File id and the full classification as JSON.
pub fn build_planning_user_prompt(
    ctx: &DocumentContext,
    classification: &ClassificationResult,
) -> Result<String, PlannerError> {
    let json = serde_json::to_string_pretty(classification)
        .map_err(|e| PlannerError::Failed(format!("could not render classification: {e}")))?;
    Ok(format!(
        "Archive this document.\n\nfile_id: {}\nfile name: {}\n\nClassification:\n{}",
        ctx.file_id(),
        ctx.document.name,
        json
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::types::{
        ArchiveAction, CompanyIdentity, DocumentGroup, DocumentRef, FolderPath,
    };
    use crate::error::LlmError;
    use crate::llm::{
        CompletionRequest, CompletionResponse, FinishReason, ToolCompletionRequest,
        ToolCompletionResponse,
    };
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn rules() -> RuleTable {
        RuleTable::new(CompanyIdentity::new("5000000001", "Acme Trading, Lda"))
    }

    fn ctx() -> DocumentContext {
        DocumentContext::standalone(DocumentRef::new("file-1", "scan.pdf"))
    }

    fn banking() -> ClassificationResult {
        ClassificationResult {
            document_type: Some("BANK_STATEMENT".into()),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            document_number: Some("12".into()),
            ..ClassificationResult::new(DocumentGroup::Banking)
        }
    }

    /// Replays scripted responses and records every request.
    struct ScriptedLlm {
        responses: Mutex<Vec<Result<ToolCompletionResponse, LlmError>>>,
        requests: Mutex<Vec<ToolCompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(mut responses: Vec<Result<ToolCompletionResponse, LlmError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    fn calls(calls: Vec<ToolCall>) -> Result<ToolCompletionResponse, LlmError> {
        Ok(ToolCompletionResponse {
            content: None,
            tool_calls: calls,
            input_tokens: 10,
            output_tokens: 5,
            finish_reason: FinishReason::ToolUse,
            response_id: None,
        })
    }

    fn text(content: &str) -> Result<ToolCompletionResponse, LlmError> {
        Ok(ToolCompletionResponse {
            content: Some(content.into()),
            tool_calls: vec![],
            input_tokens: 10,
            output_tokens: 5,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn cost_per_token(&self) -> (rust_decimal::Decimal, rust_decimal::Decimal) {
            (rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("planner always sends tools")
        }

        async fn complete_with_tools(
            &self,
            request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| text("done"))
        }
    }

    fn move_call(id: &str) -> ToolCall {
        ArchiveAction::MoveTo {
            path: FolderPath::parse("2024/2024-01/Banking").unwrap(),
            new_name: None,
        }
        .to_tool_call("file-1", id)
    }

    #[tokio::test]
    async fn rule_planner_mirrors_rule_table() {
        let rules = Arc::new(rules());
        let planner = RulePlanner::new(rules.clone());
        let plan = planner.plan(&ctx(), &banking()).await.unwrap();

        let expected = rules.decide(&banking());
        assert_eq!(plan.len(), expected.len());
        assert_eq!(plan[0].name, "archive_move_to_folder");
        assert_eq!(plan[0].arguments["file_id"], "file-1");
        assert_eq!(plan[0].id, "rule_0");
    }

    #[tokio::test]
    async fn llm_planner_collects_calls_until_text() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            calls(vec![move_call("tu_1")]),
            text("Archived under Banking."),
        ]));
        let planner = LlmPlanner::new(llm.clone(), &rules(), &ToolRegistry::archive());

        let plan = planner.plan(&ctx(), &banking()).await.unwrap();
        assert_eq!(plan, vec![move_call("tu_1")]);

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 4);
        assert_eq!(requests[0].temperature, Some(PLANNING_TEMPERATURE));
        assert!(requests[0].messages[0].content.contains("5000000001"));
        assert!(requests[0].messages[1].content.contains("file_id: file-1"));

        // Second round sees the tool call acknowledged.
        let second = &requests[1].messages;
        let last = second.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("tu_1"));
        assert_eq!(last.content, QUEUED);
    }

    #[tokio::test]
    async fn llm_planner_is_bounded() {
        let script = (0..MAX_PLANNING_ROUNDS)
            .map(|i| calls(vec![move_call(&format!("tu_{i}"))]))
            .collect();
        let llm = Arc::new(ScriptedLlm::new(script));
        let planner = LlmPlanner::new(llm.clone(), &rules(), &ToolRegistry::archive());

        let result = planner.plan(&ctx(), &banking()).await;
        assert!(matches!(result, Err(PlannerError::RoundLimit(MAX_PLANNING_ROUNDS))));
        assert_eq!(llm.requests.lock().unwrap().len(), MAX_PLANNING_ROUNDS);
    }

    #[tokio::test]
    async fn llm_error_is_planner_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::AuthFailed {
            provider: "scripted".into(),
        })]));
        let planner = LlmPlanner::new(llm, &rules(), &ToolRegistry::archive());

        let result = planner.plan(&ctx(), &banking()).await;
        assert!(matches!(result, Err(PlannerError::Llm(_))));
    }

    #[test]
    fn system_prompt_names_every_category() {
        let prompt = build_planning_system_prompt(&rules());
        for folder in [
            folders::INVOICES_CLIENTS,
            folders::RECEIPTS_SUPPLIERS,
            folders::TAX_SETTLEMENTS,
            folders::PAYROLL,
        ] {
            assert!(prompt.contains(folder), "missing {folder}");
        }
        assert!(prompt.contains("Acme Trading, Lda"));
        assert!(prompt.contains("{year}/{year-month}"));
    }
}
