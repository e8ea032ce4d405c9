//! Token-budgeted context windowing
//!
//! Providers accept a bounded prompt, so long histories are cut down to a
//! window before dispatch. Costs use a deliberately cheap heuristic (one
//! token per four characters); the budget is approximate by design and
//! the same heuristic must be applied consistently everywhere.
//!
//! System messages are always included, first and in their original
//! order, regardless of budget. The remaining budget is then spent on
//! the most recent non-system messages: walking backwards from the
//! newest, messages are taken until one does not fit, and the cutoff is
//! final even if an older, smaller message would still fit. This keeps
//! the window a contiguous suffix of the dialogue.

use crate::providers::ChatMessage;
use crate::store::Conversation;

/// Default token budget when the caller supplies none
pub const DEFAULT_CONTEXT_TOKENS: usize = 4000;

/// Estimates the token cost of a piece of text.
///
/// One token per four characters, rounded down. Character count, not
/// byte length, so multi-byte text is not over-charged.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Selects the context window for a conversation under a token budget.
///
/// Returns system messages first (all of them, unconditionally), then the
/// chronological suffix of non-system messages that fits the remaining
/// budget. With `None`, [`DEFAULT_CONTEXT_TOKENS`] applies.
pub fn window_messages(conversation: &Conversation, max_tokens: Option<usize>) -> Vec<ChatMessage> {
    let budget = max_tokens.unwrap_or(DEFAULT_CONTEXT_TOKENS);

    let system: Vec<ChatMessage> = conversation
        .messages
        .iter()
        .filter(|m| m.role == crate::providers::Role::System)
        .map(|m| m.to_chat_message())
        .collect();

    let system_cost: usize = system.iter().map(|m| estimate_tokens(&m.content)).sum();
    let mut remaining = budget.saturating_sub(system_cost);

    let mut recent: Vec<ChatMessage> = Vec::new();
    for message in conversation
        .messages
        .iter()
        .rev()
        .filter(|m| m.role != crate::providers::Role::System)
    {
        let cost = estimate_tokens(&message.content);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        recent.push(message.to_chat_message());
    }
    recent.reverse();

    let mut window = system;
    window.extend(recent);
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;
    use crate::store::StoredMessage;

    fn conversation_with(messages: Vec<(Role, String)>) -> Conversation {
        let mut convo = Conversation::new("alice", Some("test".to_string()));
        for (role, content) in messages {
            convo.messages.push(StoredMessage::new(role, content));
        }
        convo
    }

    #[test]
    fn test_estimate_tokens_rounds_down() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefg"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        // Four 3-byte characters cost one token, not three
        assert_eq!(estimate_tokens("日本語です"), 1);
    }

    #[test]
    fn test_small_history_passes_through() {
        let convo = conversation_with(vec![
            (Role::User, "hi".to_string()),
            (Role::Assistant, "hello".to_string()),
        ]);
        let window = window_messages(&convo, Some(100));
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "hi");
        assert_eq!(window[1].content, "hello");
    }

    #[test]
    fn test_system_messages_always_first() {
        let convo = conversation_with(vec![
            (Role::User, "x".repeat(400)),
            (Role::System, "be brief".to_string()),
            (Role::Assistant, "y".repeat(400)),
        ]);
        let window = window_messages(&convo, Some(1000));
        assert_eq!(window[0].role, Role::System);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_system_included_even_over_budget() {
        let convo = conversation_with(vec![
            (Role::System, "s".repeat(400)), // cost 100
            (Role::User, "u".repeat(40)),    // cost 10
        ]);
        let window = window_messages(&convo, Some(50));
        // System survives; no budget remains for the user message
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].role, Role::System);
    }

    #[test]
    fn test_recency_wins_over_older_messages() {
        let convo = conversation_with(vec![
            (Role::User, "a".repeat(400)),      // cost 100, oldest
            (Role::Assistant, "b".repeat(400)), // cost 100
            (Role::User, "c".repeat(400)),      // cost 100, newest
        ]);
        let window = window_messages(&convo, Some(250));
        assert_eq!(window.len(), 2);
        assert!(window[0].content.starts_with('b'));
        assert!(window[1].content.starts_with('c'));
    }

    #[test]
    fn test_exact_fit_budget_admits_three_most_recent() {
        // System costs 100, five alternating messages cost 50 each; under a
        // budget of 250 the remaining 150 fits exactly the three newest.
        let convo = conversation_with(vec![
            (Role::System, "s".repeat(400)),
            (Role::User, format!("1{}", "u".repeat(199))),
            (Role::Assistant, format!("2{}", "a".repeat(199))),
            (Role::User, format!("3{}", "u".repeat(199))),
            (Role::Assistant, format!("4{}", "a".repeat(199))),
            (Role::User, format!("5{}", "u".repeat(199))),
        ]);
        let window = window_messages(&convo, Some(250));
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].role, Role::System);
        assert!(window[1].content.starts_with('3'));
        assert!(window[2].content.starts_with('4'));
        assert!(window[3].content.starts_with('5'));
    }

    #[test]
    fn test_cutoff_is_final() {
        let convo = conversation_with(vec![
            (Role::User, "tiny".to_string()),   // cost 1, would fit after the break
            (Role::Assistant, "b".repeat(400)), // cost 100, breaks the budget
            (Role::User, "c".repeat(200)),      // cost 50, newest
        ]);
        let window = window_messages(&convo, Some(60));
        // The big message breaks the walk; the older tiny one is not revisited
        assert_eq!(window.len(), 1);
        assert!(window[0].content.starts_with('c'));
    }

    #[test]
    fn test_window_preserves_chronological_order() {
        let convo = conversation_with(vec![
            (Role::User, "first".to_string()),
            (Role::Assistant, "second".to_string()),
            (Role::User, "third".to_string()),
        ]);
        let window = window_messages(&convo, None);
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_conversation_gives_empty_window() {
        let convo = conversation_with(vec![]);
        assert!(window_messages(&convo, Some(100)).is_empty());
    }
}
