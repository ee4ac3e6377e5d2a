//! Conversation store: a bounded, ordered log of turns.
//!
//! System turns are exempt from trimming. Non-system turns are evicted
//! oldest-first once the conversation grows past its turn limit.

mod session;
mod types;

pub use session::ConversationError;
pub use types::{ChatMessage, ConversationSummary, Metadata, Role, Turn};

use std::collections::BTreeSet;

use chrono::{Local, Utc};

use crate::agent::AgentId;
use crate::util::{char_prefix, short_id};

/// Ordered log of turns for one session.
#[derive(Debug, Clone)]
pub struct Conversation {
    session_id: String,
    turns: Vec<Turn>,
    turn_limit: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TURN_LIMIT)
    }
}

impl Conversation {
    pub const DEFAULT_TURN_LIMIT: usize = 100;

    /// Create an empty conversation with a time-derived session id.
    ///
    /// A `turn_limit` of zero is raised to one.
    pub fn new(turn_limit: usize) -> Self {
        Self::with_session_id(Local::now().format("%Y%m%d_%H%M%S").to_string(), turn_limit)
    }

    pub fn with_session_id(session_id: impl Into<String>, turn_limit: usize) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            turn_limit: turn_limit.max(1),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turn_limit(&self) -> usize {
        self.turn_limit
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent `n` turns, oldest first.
    pub fn last_n(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn add_user(&mut self, content: impl Into<String>, metadata: Metadata) {
        self.push(Turn::user(content, metadata));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>, agent: AgentId, metadata: Metadata) {
        self.push(Turn::assistant(content, agent, metadata));
    }

    pub fn add_system(&mut self, content: impl Into<String>) {
        self.push(Turn::system(content));
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.trim();
    }

    /// Enforce `len() <= turn_limit`.
    ///
    /// Keeps every system turn plus the most recent non-system turns that fit.
    /// When system turns alone exceed the limit, only the most recent
    /// `turn_limit` system turns survive and all other turns are dropped.
    pub(crate) fn trim(&mut self) {
        if self.turns.len() <= self.turn_limit {
            return;
        }

        let system_count = self.turns.iter().filter(|t| t.is_system()).count();

        if system_count < self.turn_limit {
            let mut excess = self.turns.len() - self.turn_limit;
            self.turns.retain(|turn| {
                if excess > 0 && !turn.is_system() {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        } else {
            tracing::warn!(
                session_id = %self.session_id,
                system_turns = system_count,
                turn_limit = self.turn_limit,
                "System turns exceed the turn limit; dropping oldest system turns"
            );
            let mut skip = system_count - self.turn_limit;
            self.turns.retain(|turn| {
                if !turn.is_system() {
                    return false;
                }
                if skip > 0 {
                    skip -= 1;
                    return false;
                }
                true
            });
        }
    }

    /// Build the context window sent to `agent`.
    ///
    /// `max_turns` keeps all system turns plus the most recent non-system
    /// turns up to the bound. `max_chars` then evicts non-system turns
    /// oldest-first until the total content length fits or one turn is left.
    /// Relative order of turns is preserved.
    pub fn context_for(
        &self,
        agent: &AgentId,
        max_turns: Option<usize>,
        max_chars: Option<usize>,
    ) -> Vec<ChatMessage> {
        let mut window: Vec<&Turn> = self.turns.iter().collect();

        if let Some(max_turns) = max_turns {
            if window.len() > max_turns {
                let system_count = window.iter().filter(|t| t.is_system()).count();
                let keep = max_turns.saturating_sub(system_count);
                let mut drop = (window.len() - system_count).saturating_sub(keep);
                window.retain(|turn| {
                    if drop > 0 && !turn.is_system() {
                        drop -= 1;
                        false
                    } else {
                        true
                    }
                });
            }
        }

        if let Some(budget) = max_chars {
            let mut total: usize = window.iter().map(|t| t.content().chars().count()).sum();
            while total > budget && window.len() > 1 {
                let Some(idx) = window.iter().position(|t| !t.is_system()) else {
                    break;
                };
                total -= window.remove(idx).content().chars().count();
            }
        }

        tracing::trace!(
            agent = %agent,
            turns = window.len(),
            "Built context window"
        );

        window.into_iter().map(Turn::to_message).collect()
    }

    /// Routing summary of the conversation.
    pub fn summary(&self) -> ConversationSummary {
        let agents_used: BTreeSet<AgentId> =
            self.turns.iter().filter_map(|t| t.agent().cloned()).collect();
        let last_agent = self
            .turns
            .iter()
            .rev()
            .find_map(|t| t.agent().cloned());
        let last_user_excerpt = self
            .turns
            .iter()
            .rev()
            .find(|t| t.role() == Role::User)
            .map(|t| char_prefix(t.content(), 100).to_string());

        ConversationSummary {
            turn_count: self.turns.len(),
            agents_used,
            last_agent,
            last_user_excerpt,
        }
    }

    /// Remove non-system turns, or everything when `keep_system` is false.
    pub fn clear(&mut self, keep_system: bool) {
        if keep_system {
            self.turns.retain(Turn::is_system);
        } else {
            self.turns.clear();
        }
    }

    /// Branch into an independent conversation with a derived session id.
    pub fn fork(&self) -> Conversation {
        let suffix = short_id();
        Conversation {
            session_id: format!(
                "{}_fork_{}_{}",
                self.session_id,
                Utc::now().format("%H%M%S"),
                &suffix[..4]
            ),
            turns: self.turns.clone(),
            turn_limit: self.turn_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> AgentId {
        AgentId::new(id)
    }

    #[test]
    fn appends_in_order_with_attribution() {
        let mut conv = Conversation::new(10);
        conv.add_user("hello", Metadata::new());
        conv.add_assistant("hi", agent("claude-code"), Metadata::new());

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns()[0].role(), Role::User);
        assert!(conv.turns()[0].agent().is_none());
        assert_eq!(conv.turns()[1].agent(), Some(&agent("claude-code")));
    }

    #[test]
    fn session_id_is_time_derived() {
        let conv = Conversation::default();
        let id = conv.session_id();
        assert_eq!(id.len(), 15);
        assert_eq!(&id[8..9], "_");
        assert!(id.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn trim_holds_limit_and_keeps_system_turns() {
        fn system_contents(conv: &Conversation) -> Vec<String> {
            conv.turns()
                .iter()
                .filter(|t| t.role() == Role::System)
                .map(|t| t.content().to_string())
                .collect()
        }

        for limit in 1..8 {
            let mut conv = Conversation::new(limit);
            conv.add_system("rules");
            for i in 0..20 {
                let before = system_contents(&conv);
                if i % 7 == 3 {
                    conv.add_system(format!("note {i}"));
                } else {
                    conv.add_user(format!("msg {i}"), Metadata::new());
                }
                assert!(conv.len() <= limit, "limit {limit} exceeded at append {i}");

                if before.len() < limit {
                    let after = system_contents(&conv);
                    assert!(
                        after.starts_with(&before),
                        "limit {limit}: system turns {before:?} lost at append {i}, left {after:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn trim_evicts_oldest_non_system_first() {
        let mut conv = Conversation::new(3);
        conv.add_system("rules");
        conv.add_user("one", Metadata::new());
        conv.add_user("two", Metadata::new());
        conv.add_user("three", Metadata::new());

        let contents: Vec<&str> = conv.turns().iter().map(Turn::content).collect();
        assert_eq!(contents, vec!["rules", "two", "three"]);
    }

    #[test]
    fn trim_degrades_to_recent_system_turns() {
        let mut conv = Conversation::new(2);
        conv.add_user("u", Metadata::new());
        conv.add_system("s1");
        conv.add_system("s2");
        conv.add_system("s3");

        let contents: Vec<&str> = conv.turns().iter().map(Turn::content).collect();
        assert_eq!(contents, vec!["s2", "s3"]);
    }

    #[test]
    fn context_window_respects_turn_bound() {
        let mut conv = Conversation::new(100);
        conv.add_system("sys");
        for i in 0..10 {
            conv.add_user(format!("u{i}"), Metadata::new());
        }

        let window = conv.context_for(&agent("a"), Some(3), None);
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["sys", "u8", "u9"]);
        assert_eq!(conv.len(), 11);
    }

    #[test]
    fn context_window_char_budget_evicts_oldest_non_system() {
        let mut conv = Conversation::new(100);
        conv.add_system("ssss");
        conv.add_user("aaaa", Metadata::new());
        conv.add_assistant("bbbb", agent("a"), Metadata::new());
        conv.add_user("cccc", Metadata::new());

        let window = conv.context_for(&agent("a"), None, Some(9));
        let contents: Vec<&str> = window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["ssss", "cccc"]);
    }

    #[test]
    fn context_window_char_budget_stops_at_system_only() {
        let mut conv = Conversation::new(100);
        conv.add_system("a very long system prompt");
        conv.add_system("another long system prompt");
        conv.add_user("hi", Metadata::new());

        let window = conv.context_for(&agent("a"), None, Some(1));
        assert_eq!(window.len(), 2);
        assert!(window.iter().all(|m| m.role == Role::System));
    }

    #[test]
    fn context_window_keeps_single_oversized_turn() {
        let mut conv = Conversation::new(100);
        conv.add_user("x".repeat(50), Metadata::new());
        let window = conv.context_for(&agent("a"), None, Some(10));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn summary_reports_agents_and_excerpt() {
        let mut conv = Conversation::new(100);
        conv.add_user("z".repeat(150), Metadata::new());
        conv.add_assistant("r1", agent("senior"), Metadata::new());
        conv.add_assistant("r2", agent("junior"), Metadata::new());

        let summary = conv.summary();
        assert_eq!(summary.turn_count, 3);
        assert_eq!(summary.agents_used.len(), 2);
        assert_eq!(summary.last_agent, Some(agent("junior")));
        assert_eq!(summary.last_user_excerpt.map(|s| s.len()), Some(100));
    }

    #[test]
    fn clear_honors_keep_system() {
        let mut conv = Conversation::new(100);
        conv.add_system("sys");
        conv.add_user("u", Metadata::new());

        conv.clear(true);
        assert_eq!(conv.len(), 1);
        assert!(conv.turns()[0].is_system());

        conv.clear(false);
        assert!(conv.is_empty());
    }

    #[test]
    fn fork_is_a_deep_copy() {
        let mut original = Conversation::new(100);
        original.add_user("shared", Metadata::new());

        let mut fork = original.fork();
        assert!(fork.session_id().starts_with(&format!("{}_fork_", original.session_id())));
        assert_ne!(fork.session_id(), original.session_id());

        fork.add_user("only in fork", Metadata::new());
        assert_eq!(original.len(), 1);

        original.clear(false);
        assert_eq!(fork.len(), 2);
        assert_eq!(fork.turns()[0].content(), "shared");
    }

    #[test]
    fn last_n_returns_tail() {
        let mut conv = Conversation::new(100);
        for i in 0..5 {
            conv.add_user(format!("{i}"), Metadata::new());
        }
        let tail: Vec<&str> = conv.last_n(2).iter().map(Turn::content).collect();
        assert_eq!(tail, vec!["3", "4"]);
        assert_eq!(conv.last_n(50).len(), 5);
    }
}
