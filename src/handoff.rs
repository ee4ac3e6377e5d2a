//! Detection of agent handoff directives at the end of a reply.
//!
//! A directive is a line starting with a directive token followed by free
//! text, running to the end of the reply:
//!
//! ```text
//! Here is my plan.
//! /local Refactor parse_config to return Result
//! ```

use regex::Regex;

use crate::agent::AgentRole;
use crate::router::DirectiveTokens;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Full directive text including the token; becomes the next hop's message.
    pub command: String,
    pub target: AgentRole,
}

#[derive(Debug, Clone)]
pub struct DirectiveParser {
    pattern: Regex,
    tokens: DirectiveTokens,
}

impl DirectiveParser {
    pub fn new(tokens: DirectiveTokens) -> Result<Self, regex::Error> {
        let alternation = tokens
            .all()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(
            r"(?is)(?:\A|\n)[ \t]*((?:{})\s+\S.*?)\s*\z",
            alternation
        ))?;
        Ok(Self { pattern, tokens })
    }

    /// Split `reply` into the text before the directive and the directive.
    ///
    /// The earliest line that starts with a directive token wins; everything
    /// from that line to the end of the reply is the directive.
    pub fn extract<'a>(&self, reply: &'a str) -> (&'a str, Option<Directive>) {
        let Some(captures) = self.pattern.captures(reply) else {
            return (reply, None);
        };
        let (Some(whole), Some(command)) = (captures.get(0), captures.get(1)) else {
            return (reply, None);
        };

        let command = command.as_str().trim();
        let target = self
            .tokens
            .addressed_role(command)
            .map(|(role, _)| role)
            .unwrap_or(AgentRole::Senior);

        (
            reply[..whole.start()].trim_end(),
            Some(Directive {
                command: command.to_string(),
                target,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> DirectiveParser {
        DirectiveParser::new(DirectiveTokens::default()).unwrap()
    }

    #[test]
    fn extracts_trailing_directive() {
        let (clean, directive) =
            parser().extract("I'll hand this off.\n\n/local Refactor this function");
        assert_eq!(clean, "I'll hand this off.");
        assert_eq!(
            directive,
            Some(Directive {
                command: "/local Refactor this function".to_string(),
                target: AgentRole::Junior,
            })
        );
    }

    #[test]
    fn directive_may_span_lines_to_the_end() {
        let reply = "Plan below.\n/JUNIOR Write tests for:\n- parse\n- render\n";
        let (clean, directive) = parser().extract(reply);
        assert_eq!(clean, "Plan below.");
        let directive = directive.unwrap();
        assert_eq!(directive.command, "/JUNIOR Write tests for:\n- parse\n- render");
        assert_eq!(directive.target, AgentRole::Junior);
    }

    #[test]
    fn senior_directive_targets_senior() {
        let (clean, directive) = parser().extract("Done.\n/claude please review");
        assert_eq!(clean, "Done.");
        assert_eq!(directive.unwrap().target, AgentRole::Senior);
    }

    #[test]
    fn whole_reply_can_be_a_directive() {
        let (clean, directive) = parser().extract("/local do it");
        assert_eq!(clean, "");
        assert_eq!(directive.unwrap().command, "/local do it");
    }

    #[test]
    fn non_directives_are_left_alone() {
        for reply in [
            "The answer is 4.",
            "Use /local for small tasks.",
            "Run it on\n/localhost:8080 please",
            "Ends with a bare token\n/local",
            "Ends with token and spaces\n/local   ",
        ] {
            let (clean, directive) = parser().extract(reply);
            assert_eq!(clean, reply);
            assert!(directive.is_none(), "{reply:?}");
        }
    }
}
