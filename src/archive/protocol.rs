//! Decision protocol — drives one document from classification to a
//! terminal state.
//!
//! 1. CLASSIFIED: a failed classification goes straight to unclassified.
//! 2. PLANNING: the planner proposes tool calls; the plan is parsed through
//!    the tool registry and validated. An invalid plan executes nothing.
//! 3. EXECUTING: actions run in order. The first failure abandons the rest
//!    and moves the document to unclassified instead.
//! 4. The last relocating action decides the terminal state.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::archive::actions::ActionExecutor;
use crate::archive::planner::Planner;
use crate::archive::rules::RuleTable;
use crate::archive::types::{
    ActionKind, ArchiveAction, ArchiveOutcome, ClassificationResult, DocumentState, Incident,
};
use crate::context::DocumentContext;
use crate::error::{ArchiveError, ClassificationError};
use crate::llm::ToolCall;
use crate::tools::ToolRegistry;

pub struct DecisionProtocol {
    planner: Arc<dyn Planner>,
    rules: Arc<RuleTable>,
    registry: ToolRegistry,
    executor: ActionExecutor,
}

impl DecisionProtocol {
    pub fn new(planner: Arc<dyn Planner>, rules: Arc<RuleTable>, executor: ActionExecutor) -> Self {
        Self {
            planner,
            rules,
            registry: ToolRegistry::archive(),
            executor,
        }
    }

    pub fn planner_name(&self) -> &str {
        self.planner.name()
    }

    /// Archive one document. Never fails: every problem ends in an outcome.
    pub async fn process(
        &self,
        ctx: &DocumentContext,
        classified: Result<ClassificationResult, ClassificationError>,
    ) -> ArchiveOutcome {
        let classification = match classified {
            Ok(c) => c,
            Err(e) => {
                transition(ctx, DocumentState::Classified);
                let reason = format!("classification failed: {e}");
                let payload = ClassificationResult::failed(e.to_string()).to_note_text();
                return self.unclassify(ctx, &payload, reason).await;
            }
        };
        transition(ctx, DocumentState::Classified);

        let payload = classification.to_note_text();
        if let Some(err) = classification.error() {
            let reason = format!("classification failed: {err}");
            return self.unclassify(ctx, &payload, reason).await;
        }

        transition(ctx, DocumentState::Planning);
        let actions = match self.plan(ctx, &classification).await {
            Ok(actions) => actions,
            Err(e) => return self.fall_back(ctx, &payload, Vec::new(), None, e).await,
        };

        transition(ctx, DocumentState::Executing);
        let mut executed = Vec::with_capacity(actions.len());
        for action in &actions {
            debug!(file_id = %ctx.file_id(), action = %action, "Executing action");
            match self.executor.execute(ctx.file_id(), action, &payload).await {
                Ok(placement) => {
                    debug!(
                        file_id = %ctx.file_id(),
                        action = action.label(),
                        folder_id = %placement.folder_id,
                        "Action done"
                    );
                    executed.push(action.clone());
                }
                Err(e) => {
                    return self
                        .fall_back(ctx, &payload, executed, Some(action.clone()), e)
                        .await;
                }
            }
        }

        let state = terminal_state(&actions);
        transition(ctx, state);
        ArchiveOutcome {
            document: ctx.document.clone(),
            state,
            executed,
            incident: None,
        }
    }

    /// Ask the planner and validate its answer. Executes nothing.
    pub async fn plan(
        &self,
        ctx: &DocumentContext,
        classification: &ClassificationResult,
    ) -> Result<Vec<ArchiveAction>, ArchiveError> {
        let calls = self.planner.plan(ctx, classification).await?;
        let actions = self.validate(ctx, classification, &calls)?;
        info!(
            file_id = %ctx.file_id(),
            planner = self.planner.name(),
            plan = %render_plan(&actions),
            "Plan accepted"
        );
        Ok(actions)
    }

    fn validate(
        &self,
        ctx: &DocumentContext,
        classification: &ClassificationResult,
        calls: &[ToolCall],
    ) -> Result<Vec<ArchiveAction>, ArchiveError> {
        let mut actions = Vec::with_capacity(calls.len());

        for call in calls {
            let proposed = self
                .registry
                .parse_call(call)
                .map_err(|e| ArchiveError::ProtocolViolation(format!("{}: {e}", call.name)))?;

            if proposed.file_id != ctx.file_id() {
                return Err(ArchiveError::ProtocolViolation(format!(
                    "{} targets file {} while archiving {}",
                    call.name,
                    proposed.file_id,
                    ctx.file_id()
                )));
            }
            if !self.rules.allows(classification, &proposed.action) {
                let destination = proposed
                    .action
                    .path()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                return Err(ArchiveError::ProtocolViolation(format!(
                    "{} to '{destination}' is not permitted for group {}",
                    proposed.action.label(),
                    classification.document_group
                )));
            }
            actions.push(proposed.action);
        }

        check_plan_shape(&actions)?;
        Ok(actions)
    }

    /// Direct move to unclassified for documents that were never planned.
    async fn unclassify(
        &self,
        ctx: &DocumentContext,
        payload: &str,
        reason: String,
    ) -> ArchiveOutcome {
        transition(ctx, DocumentState::Executing);
        let action = ArchiveAction::unclassified(reason.clone());
        match self
            .executor
            .move_to_unclassified(ctx.file_id(), payload, &reason)
            .await
        {
            Ok(_) => {
                transition(ctx, DocumentState::Unclassified);
                ArchiveOutcome {
                    document: ctx.document.clone(),
                    state: DocumentState::Unclassified,
                    executed: vec![action],
                    incident: None,
                }
            }
            Err(e) => failed(
                ctx,
                Vec::new(),
                Incident {
                    attempted: Some(action),
                    error: reason,
                    fallback_error: Some(e.to_string()),
                },
            ),
        }
    }

    /// Compensate a planning or execution failure.
    async fn fall_back(
        &self,
        ctx: &DocumentContext,
        payload: &str,
        mut executed: Vec<ArchiveAction>,
        attempted: Option<ArchiveAction>,
        cause: ArchiveError,
    ) -> ArchiveOutcome {
        let reason = format!("execution error: {cause}");
        warn!(
            file_id = %ctx.file_id(),
            attempted = attempted.as_ref().map(ArchiveAction::label).unwrap_or("plan"),
            error = %cause,
            "Falling back to unclassified"
        );

        match self
            .executor
            .move_to_unclassified(ctx.file_id(), payload, &reason)
            .await
        {
            Ok(_) => {
                executed.push(ArchiveAction::unclassified(reason));
                transition(ctx, DocumentState::Unclassified);
                ArchiveOutcome {
                    document: ctx.document.clone(),
                    state: DocumentState::Unclassified,
                    executed,
                    incident: Some(Incident {
                        attempted,
                        error: cause.to_string(),
                        fallback_error: None,
                    }),
                }
            }
            Err(e) => failed(
                ctx,
                executed,
                Incident {
                    attempted,
                    error: cause.to_string(),
                    fallback_error: Some(e.to_string()),
                },
            ),
        }
    }
}

fn failed(ctx: &DocumentContext, executed: Vec<ArchiveAction>, incident: Incident) -> ArchiveOutcome {
    error!(
        file_id = %ctx.file_id(),
        name = %ctx.document.name,
        attempted = incident.attempted.as_ref().map(ArchiveAction::label).unwrap_or("plan"),
        error = %incident.error,
        fallback_error = incident.fallback_error.as_deref().unwrap_or(""),
        "Document could not be archived or moved to unclassified"
    );
    ArchiveOutcome {
        document: ctx.document.clone(),
        state: DocumentState::Failed,
        executed,
        incident: Some(incident),
    }
}

fn transition(ctx: &DocumentContext, state: DocumentState) {
    info!(
        run_id = %ctx.run_id,
        file_id = %ctx.file_id(),
        state = %state,
        "Document state"
    );
}

/// A plan is one or more copies followed by exactly one relocating action.
pub fn check_plan_shape(actions: &[ArchiveAction]) -> Result<(), ArchiveError> {
    let Some(last) = actions.last() else {
        return Err(ArchiveError::ProtocolViolation("empty plan".to_string()));
    };

    let mut relocated = false;
    for action in actions {
        if action.relocates() {
            if relocated {
                return Err(ArchiveError::ProtocolViolation(
                    "more than one relocating action".to_string(),
                ));
            }
            relocated = true;
        } else if relocated {
            return Err(ArchiveError::ProtocolViolation(format!(
                "{} after the document was moved",
                action.label()
            )));
        }
    }

    if !last.relocates() {
        return Err(ArchiveError::ProtocolViolation(
            "plan does not end with a move".to_string(),
        ));
    }
    Ok(())
}

/// State implied by the last relocating action of a valid plan.
pub fn terminal_state(actions: &[ArchiveAction]) -> DocumentState {
    match actions.iter().rev().find(|a| a.relocates()).map(ArchiveAction::kind) {
        Some(ActionKind::Move) => DocumentState::Archived,
        Some(ActionKind::Review) => DocumentState::Review,
        Some(ActionKind::Unclassified) => DocumentState::Unclassified,
        Some(ActionKind::Copy) | None => DocumentState::Failed,
    }
}

fn render_plan(actions: &[ArchiveAction]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
