use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::quote::QuoteStatus;
use crate::flows::states::{FlowContext, LifecycleAction, QuoteEvent, TransitionOutcome};

/// The five-state quote lifecycle. Stateless; callers hold the current status.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuoteLifecycle;

impl QuoteLifecycle {
    pub fn initial_state(&self) -> QuoteStatus {
        QuoteStatus::Draft
    }

    pub fn apply(
        &self,
        current: QuoteStatus,
        event: QuoteEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition(current, event, context)
    }
}

impl TransitionOutcome {
    pub fn audit_event(&self, audit: &AuditContext) -> AuditEvent {
        AuditEvent::new(
            audit,
            "lifecycle.transition_applied",
            AuditCategory::Lifecycle,
            AuditOutcome::Success,
        )
        .with_metadata("from", self.from.as_str())
        .with_metadata("to", self.to.map_or("removed", |to| to.as_str()))
        .with_metadata("event", self.event.as_str())
    }
}

impl FlowTransitionError {
    pub fn event(&self) -> QuoteEvent {
        match self {
            Self::InvalidTransition { event, .. } | Self::MissingLineItems { event, .. } => *event,
        }
    }

    pub fn audit_event(&self, audit: &AuditContext) -> AuditEvent {
        AuditEvent::new(
            audit,
            "lifecycle.transition_rejected",
            AuditCategory::Lifecycle,
            AuditOutcome::Rejected,
        )
        .with_metadata("event", self.event().as_str())
        .with_metadata("error", self.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot {} a quote in status {state}", event.as_str())]
    InvalidTransition { state: QuoteStatus, event: QuoteEvent },
    #[error("cannot {} a quote in status {state} without line items", event.as_str())]
    MissingLineItems { state: QuoteStatus, event: QuoteEvent },
}

fn transition(
    current: QuoteStatus,
    event: QuoteEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use LifecycleAction::{
        BookOrder, CascadeDelete, CreditCommission, ReconcileItems, RecomputeTotal,
        SendOrderConfirmation, SendSanctionNotice,
    };
    use QuoteEvent::{AssociateEdit, Delete, ProcessOrder, ReviewEdit, Sanction, Submit};
    use QuoteStatus::{Draft, Ordered, Sanctioned, Submitted, Unresolved};

    let require_items = || {
        if context.line_item_count == 0 {
            Err(FlowTransitionError::MissingLineItems { state: current, event })
        } else {
            Ok(())
        }
    };

    let (to, actions) = match (current, event) {
        (Draft, AssociateEdit) => (Some(Draft), vec![ReconcileItems, RecomputeTotal]),
        (Draft, Submit) => {
            require_items()?;
            (Some(Submitted), Vec::new())
        }
        (Draft, Delete) => (None, vec![CascadeDelete]),
        (Submitted | Unresolved, ReviewEdit) => {
            require_items()?;
            (Some(Unresolved), vec![ReconcileItems, RecomputeTotal])
        }
        (Submitted | Unresolved, Sanction) => {
            require_items()?;
            (Some(Sanctioned), vec![SendSanctionNotice])
        }
        (Sanctioned, ProcessOrder) => {
            (Some(Ordered), vec![BookOrder, CreditCommission, SendOrderConfirmation])
        }
        _ => return Err(FlowTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditSink, InMemoryAuditSink};
    use crate::domain::quote::{QuoteId, QuoteStatus};
    use crate::flows::engine::{FlowTransitionError, QuoteLifecycle};
    use crate::flows::states::{FlowContext, LifecycleAction, QuoteEvent};

    const EVENTS: [QuoteEvent; 6] = [
        QuoteEvent::AssociateEdit,
        QuoteEvent::Submit,
        QuoteEvent::ReviewEdit,
        QuoteEvent::Sanction,
        QuoteEvent::Delete,
        QuoteEvent::ProcessOrder,
    ];

    #[test]
    fn happy_path_reaches_ordered() {
        let lifecycle = QuoteLifecycle;
        let context = FlowContext::with_items(2);
        let mut state = lifecycle.initial_state();

        for event in [QuoteEvent::Submit, QuoteEvent::ReviewEdit, QuoteEvent::Sanction] {
            state = lifecycle
                .apply(state, event, &context)
                .expect("legal transition")
                .to
                .expect("quote survives");
        }
        assert_eq!(state, QuoteStatus::Sanctioned);

        let ordered =
            lifecycle.apply(state, QuoteEvent::ProcessOrder, &context).expect("sanctioned -> ordered");
        assert_eq!(ordered.to, Some(QuoteStatus::Ordered));
        assert!(ordered.actions.contains(&LifecycleAction::CreditCommission));
    }

    #[test]
    fn review_edit_always_lands_in_unresolved() {
        let lifecycle = QuoteLifecycle;
        for from in [QuoteStatus::Submitted, QuoteStatus::Unresolved] {
            let outcome = lifecycle
                .apply(from, QuoteEvent::ReviewEdit, &FlowContext::with_items(1))
                .expect("review edit allowed");
            assert_eq!(outcome.to, Some(QuoteStatus::Unresolved));
        }
    }

    #[test]
    fn process_order_is_only_legal_from_sanctioned() {
        let lifecycle = QuoteLifecycle;
        for status in QuoteStatus::ALL {
            let result =
                lifecycle.apply(status, QuoteEvent::ProcessOrder, &FlowContext::with_items(1));
            assert_eq!(result.is_ok(), status == QuoteStatus::Sanctioned, "status {status}");
        }
    }

    #[test]
    fn ordered_is_terminal() {
        let lifecycle = QuoteLifecycle;
        for event in EVENTS {
            assert!(matches!(
                lifecycle.apply(QuoteStatus::Ordered, event, &FlowContext::with_items(1)),
                Err(FlowTransitionError::InvalidTransition { state: QuoteStatus::Ordered, .. })
            ));
        }
    }

    #[test]
    fn delete_only_from_draft_and_removes_quote() {
        let lifecycle = QuoteLifecycle;
        let outcome = lifecycle
            .apply(QuoteStatus::Draft, QuoteEvent::Delete, &FlowContext::default())
            .expect("draft delete");
        assert_eq!(outcome.to, None);
        assert_eq!(outcome.actions, vec![LifecycleAction::CascadeDelete]);

        for status in [QuoteStatus::Submitted, QuoteStatus::Unresolved, QuoteStatus::Sanctioned] {
            assert!(lifecycle.apply(status, QuoteEvent::Delete, &FlowContext::with_items(1)).is_err());
        }
    }

    #[test]
    fn zero_item_quotes_cannot_submit_or_sanction() {
        let lifecycle = QuoteLifecycle;
        let empty = FlowContext::default();

        assert_eq!(
            lifecycle.apply(QuoteStatus::Draft, QuoteEvent::Submit, &empty),
            Err(FlowTransitionError::MissingLineItems {
                state: QuoteStatus::Draft,
                event: QuoteEvent::Submit
            })
        );
        assert!(matches!(
            lifecycle.apply(QuoteStatus::Submitted, QuoteEvent::Sanction, &empty),
            Err(FlowTransitionError::MissingLineItems { .. })
        ));
    }

    #[test]
    fn associate_edits_are_refused_once_submitted() {
        let lifecycle = QuoteLifecycle;
        assert!(lifecycle
            .apply(QuoteStatus::Submitted, QuoteEvent::AssociateEdit, &FlowContext::with_items(1))
            .is_err());
        assert!(lifecycle
            .apply(QuoteStatus::Sanctioned, QuoteEvent::ReviewEdit, &FlowContext::with_items(1))
            .is_err());
    }

    #[test]
    fn outcomes_render_audit_events() {
        let lifecycle = QuoteLifecycle;
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some(QuoteId(9)), "req-42", "associate:1");

        let applied = lifecycle
            .apply(QuoteStatus::Draft, QuoteEvent::Submit, &FlowContext::with_items(1))
            .expect("submit succeeds");
        sink.emit(applied.audit_event(&audit));
        let rejected = lifecycle
            .apply(QuoteStatus::Ordered, QuoteEvent::Sanction, &FlowContext::with_items(1))
            .expect_err("ordered is terminal");
        sink.emit(rejected.audit_event(&audit));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "lifecycle.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("submitted"));
        assert_eq!(events[1].event_type, "lifecycle.transition_rejected");
        assert_eq!(events[1].metadata.get("event").map(String::as_str), Some("sanction"));
    }
}
