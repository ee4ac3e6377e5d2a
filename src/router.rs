//! Deterministic message routing between the senior and junior agents.

use serde::Serialize;
use thiserror::Error;

use crate::agent::{AgentId, AgentRole};
use crate::conversation::ConversationSummary;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Invalid directive token {0:?}: must start with '/' and contain no whitespace")]
    InvalidToken(String),

    #[error("At least one junior directive token is required")]
    NoJuniorTokens,
}

/// Directive tokens recognized in messages and agent replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveTokens {
    junior: Vec<String>,
    senior: Vec<String>,
}

impl Default for DirectiveTokens {
    fn default() -> Self {
        Self {
            junior: vec!["/local".to_string(), "/junior".to_string()],
            senior: vec!["/senior".to_string(), "/claude".to_string()],
        }
    }
}

impl DirectiveTokens {
    pub fn new(junior: Vec<String>, senior: Vec<String>) -> Result<Self, RouterError> {
        if junior.is_empty() {
            return Err(RouterError::NoJuniorTokens);
        }
        for token in junior.iter().chain(senior.iter()) {
            let valid = token.len() > 1
                && token.starts_with('/')
                && !token.chars().any(char::is_whitespace);
            if !valid {
                return Err(RouterError::InvalidToken(token.clone()));
            }
        }
        Ok(Self { junior, senior })
    }

    pub fn junior(&self) -> &[String] {
        &self.junior
    }

    pub fn senior(&self) -> &[String] {
        &self.senior
    }

    /// Token used when addressing the senior agent (first senior token, or `/senior`).
    pub fn senior_address(&self) -> &str {
        self.senior.first().map(String::as_str).unwrap_or("/senior")
    }

    /// Role addressed by a message starting with one of the tokens.
    pub fn addressed_role(&self, text: &str) -> Option<(AgentRole, &str)> {
        if let Some(token) = self.junior.iter().find(|t| starts_with_token(text, t)) {
            return Some((AgentRole::Junior, token));
        }
        self.senior
            .iter()
            .find(|t| starts_with_token(text, t))
            .map(|t| (AgentRole::Senior, t.as_str()))
    }

    pub(crate) fn all(&self) -> impl Iterator<Item = &String> {
        self.junior.iter().chain(self.senior.iter())
    }
}

/// Case-insensitive token prefix that ends at whitespace or end of text.
fn starts_with_token(text: &str, token: &str) -> bool {
    let Some(head) = text.get(..token.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(token)
        && text[token.len()..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub target: AgentId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingRule {
    pub pattern: String,
    pub target: AgentId,
    pub description: String,
}

/// Routes delegation directives to the junior agent and everything else to
/// the senior agent.
#[derive(Debug, Clone)]
pub struct Router {
    senior: AgentId,
    junior: AgentId,
    tokens: DirectiveTokens,
}

impl Router {
    pub fn new(senior: AgentId, junior: AgentId) -> Self {
        Self::with_tokens(senior, junior, DirectiveTokens::default())
    }

    pub fn with_tokens(senior: AgentId, junior: AgentId, tokens: DirectiveTokens) -> Self {
        Self {
            senior,
            junior,
            tokens,
        }
    }

    pub fn tokens(&self) -> &DirectiveTokens {
        &self.tokens
    }

    pub fn senior(&self) -> &AgentId {
        &self.senior
    }

    pub fn junior(&self) -> &AgentId {
        &self.junior
    }

    /// Classify `message`. The summary is accepted for future rules and not
    /// consulted today.
    pub fn route(&self, message: &str, _summary: &ConversationSummary) -> RoutingDecision {
        match self.tokens.addressed_role(message.trim()) {
            Some((AgentRole::Junior, _)) => RoutingDecision {
                target: self.junior.clone(),
                reason: "delegation".to_string(),
            },
            _ => RoutingDecision {
                target: self.senior.clone(),
                reason: "default/senior".to_string(),
            },
        }
    }

    /// Routing table for display.
    pub fn rules(&self) -> Vec<RoutingRule> {
        vec![
            RoutingRule {
                pattern: self.tokens.junior.join(", "),
                target: self.junior.clone(),
                description: "Delegation directives go to the junior agent".to_string(),
            },
            RoutingRule {
                pattern: "*".to_string(),
                target: self.senior.clone(),
                description: format!(
                    "Everything else goes to the senior agent ({} is accepted as a no-op prefix)",
                    self.tokens.senior.join(", ")
                ),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(AgentId::new("claude-code"), AgentId::new("local-model"))
    }

    fn route(message: &str) -> RoutingDecision {
        router().route(message, &ConversationSummary::default())
    }

    #[test]
    fn delegate_tokens_route_to_junior() {
        for message in [
            "/local Refactor this function",
            "  /JUNIOR write tests  ",
            "/Local",
            "/local\nmulti-line instructions",
        ] {
            let decision = route(message);
            assert_eq!(decision.target.as_str(), "local-model", "{message:?}");
            assert_eq!(decision.reason, "delegation");
        }
    }

    #[test]
    fn everything_else_routes_to_senior() {
        for message in [
            "What is 2+2?",
            "/claude review this",
            "/senior hi",
            "/localhost is down",
            "please /local this",
            "",
        ] {
            let decision = route(message);
            assert_eq!(decision.target.as_str(), "claude-code", "{message:?}");
            assert_eq!(decision.reason, "default/senior");
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let router = router();
        let summary = ConversationSummary::default();
        for message in ["/local a", "b", "/claude c"] {
            assert_eq!(router.route(message, &summary), router.route(message, &summary));
        }
    }

    #[test]
    fn custom_tokens_are_validated() {
        assert!(matches!(
            DirectiveTokens::new(vec![], vec![]),
            Err(RouterError::NoJuniorTokens)
        ));
        assert!(matches!(
            DirectiveTokens::new(vec!["local".into()], vec![]),
            Err(RouterError::InvalidToken(_))
        ));
        assert!(matches!(
            DirectiveTokens::new(vec!["/a b".into()], vec![]),
            Err(RouterError::InvalidToken(_))
        ));

        let tokens = DirectiveTokens::new(vec!["/intern".into()], vec!["/lead".into()]).unwrap();
        let router = Router::with_tokens(AgentId::new("s"), AgentId::new("j"), tokens);
        let summary = ConversationSummary::default();
        assert_eq!(router.route("/intern go", &summary).target.as_str(), "j");
        assert_eq!(router.route("/local go", &summary).target.as_str(), "s");
        assert_eq!(router.tokens().senior_address(), "/lead");
    }

    #[test]
    fn multibyte_prefix_does_not_panic() {
        assert_eq!(route("é/local").target.as_str(), "claude-code");
        assert_eq!(route("/lo€al").target.as_str(), "claude-code");
    }

    #[test]
    fn rules_describe_both_targets() {
        let rules = router().rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].pattern, "/local, /junior");
        assert_eq!(rules[1].target.as_str(), "claude-code");
    }
}
