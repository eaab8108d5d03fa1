//! Property-based tests for the conversation state machine
//!
//! Random sequences of intents and completion results are applied to the
//! pure transition function; the invariants below must hold after every step.

#![allow(clippy::single_match_else)]

use super::*;
use crate::completion::CompletionError;
use crate::runtime::testing::test_auth;
use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Operations
// ============================================================================

/// An intent or result, resolved against the current state when applied
#[derive(Debug, Clone)]
enum Op {
    Submit { text: String, authenticated: bool },
    StartNew,
    Select(usize),
    SelectUnknown,
    ClearActive,
    Delete(usize),
    Succeed(String),
    Fail,
    Abandon,
    StaleReply,
    SessionEnded,
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ?!]{1,60}",
        "[ \t\n]{0,4}",
        "[a-zé中 ]{25,40}",
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_text(), prop::bool::weighted(0.9))
            .prop_map(|(text, authenticated)| Op::Submit { text, authenticated }),
        1 => Just(Op::StartNew),
        2 => (0usize..8).prop_map(Op::Select),
        1 => Just(Op::SelectUnknown),
        1 => Just(Op::ClearActive),
        1 => (0usize..8).prop_map(Op::Delete),
        3 => "[a-z ]{1,20}".prop_map(Op::Succeed),
        1 => Just(Op::Fail),
        1 => Just(Op::Abandon),
        1 => Just(Op::StaleReply),
        1 => Just(Op::SessionEnded),
    ]
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

fn pending_or_new(state: &ConversationState) -> RequestId {
    state
        .pending
        .as_ref()
        .map_or_else(RequestId::new, |p| p.request_id)
}

fn nth_id(state: &ConversationState, index: usize) -> ConversationId {
    if state.conversations.is_empty() {
        ConversationId::new()
    } else {
        state.conversations[index % state.conversations.len()].id()
    }
}

fn to_event(state: &ConversationState, op: Op) -> Event {
    match op {
        Op::Submit {
            text,
            authenticated,
        } => Event::Submit {
            text,
            auth: authenticated.then(test_auth),
            request_id: RequestId::new(),
            new_conversation_id: ConversationId::new(),
            now: now(),
        },
        Op::StartNew => Event::StartNew,
        Op::Select(i) => Event::Select {
            id: nth_id(state, i),
        },
        Op::SelectUnknown => Event::Select {
            id: ConversationId::new(),
        },
        Op::ClearActive => Event::ClearActive,
        Op::Delete(i) => Event::Delete {
            id: nth_id(state, i),
        },
        Op::Succeed(reply) => Event::CompletionSucceeded {
            request_id: pending_or_new(state),
            reply,
        },
        Op::Fail => Event::CompletionFailed {
            request_id: pending_or_new(state),
            error: CompletionError::timeout("timed out"),
        },
        Op::Abandon => Event::CompletionAbandoned {
            request_id: pending_or_new(state),
        },
        Op::StaleReply => Event::CompletionSucceeded {
            request_id: RequestId::new(),
            reply: "stale".to_string(),
        },
        Op::SessionEnded => Event::SessionEnded,
    }
}

// ============================================================================
// Invariants
// ============================================================================

fn check_state(state: &ConversationState) -> Result<(), TestCaseError> {
    let ids: HashSet<_> = state.conversations.iter().map(Conversation::id).collect();
    prop_assert_eq!(ids.len(), state.conversations.len(), "Duplicate conversation ids");

    match state.active_conversation() {
        Some(active) => {
            // Visible is the tail of the active history (cleared views are empty)
            prop_assert!(
                active.messages().ends_with(&state.visible),
                "Visible {:?} is not a suffix of {:?}",
                state.visible,
                active.messages()
            );
        }
        None => {
            prop_assert!(state.active.is_none(), "Active points at a missing conversation");
            prop_assert!(state.visible.is_empty(), "Visible without an active conversation");
        }
    }

    if let Some(pending) = &state.pending {
        let conversation = state.conversation(pending.conversation_id);
        prop_assert!(conversation.is_some(), "Pending request for a missing conversation");
        if let Some(conversation) = conversation {
            prop_assert_eq!(
                conversation.messages().last().map(|m| m.role),
                Some(Role::User),
                "Pending conversation must end with the user message"
            );
        }
    }
    Ok(())
}

/// Titles are fixed and histories only grow
fn check_step(before: &ConversationState, after: &ConversationState) -> Result<(), TestCaseError> {
    for old in &before.conversations {
        if let Some(new) = after.conversation(old.id()) {
            prop_assert_eq!(old.title(), new.title());
            prop_assert!(
                new.messages().starts_with(old.messages()),
                "History of {} was rewritten",
                old.id()
            );
            prop_assert!(new.messages().len() <= old.messages().len() + 1);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_invariants_hold_over_any_sequence(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut state = ConversationState::default();
        for op in ops {
            let event = to_event(&state, op);
            match transition(&state, event) {
                Ok(result) => {
                    check_step(&state, &result.new_state)?;
                    state = result.new_state;
                    check_state(&state)?;
                }
                Err(_) => { /* Rejected intents leave the state untouched */ }
            }
        }
    }

    #[test]
    fn prop_submit_while_pending_is_rejected(
        first in "[a-zA-Z]{1,20}",
        second in arb_text(),
        navigate in any::<bool>(),
    ) {
        let state = ConversationState::default();
        let state = transition(&state, to_event(&state, Op::Submit { text: first, authenticated: true }))
            .unwrap()
            .new_state;
        let state = if navigate {
            transition(&state, Event::StartNew).unwrap().new_state
        } else {
            state
        };

        let result = transition(&state, to_event(&state, Op::Submit { text: second, authenticated: true }));
        prop_assert!(result.is_err(), "Second submit accepted while pending");
    }

    #[test]
    fn prop_first_submit_creates_one_conversation_at_head(
        history in 0usize..4,
        text in "[a-zA-Z0-9 ]{0,50}[a-z]",
    ) {
        let mut state = ConversationState::default();
        for i in 0..history {
            let event = to_event(&state, Op::Submit { text: format!("q{i}"), authenticated: true });
            state = transition(&state, event).unwrap().new_state;
            state = transition(&state, to_event(&state, Op::Succeed("a".to_string()))).unwrap().new_state;
            state = transition(&state, Event::StartNew).unwrap().new_state;
        }

        let new_id = ConversationId::new();
        let event = Event::Submit {
            text: text.clone(),
            auth: Some(test_auth()),
            request_id: RequestId::new(),
            new_conversation_id: new_id,
            now: now(),
        };
        let next = transition(&state, event).unwrap().new_state;

        prop_assert_eq!(next.conversations.len(), history + 1);
        prop_assert_eq!(next.conversations[0].id(), new_id);
        prop_assert_eq!(next.conversations[0].title(), derive_title(&text));
        prop_assert_eq!(next.active, Some(new_id));
    }

    #[test]
    fn prop_every_resolution_clears_pending(
        text in "[a-zA-Z]{1,20}",
        succeed in any::<bool>(),
    ) {
        let state = ConversationState::default();
        let state = transition(&state, to_event(&state, Op::Submit { text, authenticated: true }))
            .unwrap()
            .new_state;
        prop_assert!(state.is_pending());

        let op = if succeed { Op::Succeed("reply".to_string()) } else { Op::Fail };
        let result = transition(&state, to_event(&state, op)).unwrap();
        prop_assert!(!result.new_state.is_pending());

        let conversation = &result.new_state.conversations[0];
        let expected_len = if succeed { 2 } else { 1 };
        prop_assert_eq!(conversation.messages().len(), expected_len);
    }
}
