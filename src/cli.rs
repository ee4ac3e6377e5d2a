//! Interactive front end: slash commands and plain-text rendering.

use std::io::Write;

use crate::notepad::NoteFilter;
use crate::orchestrator::{Orchestrator, OrchestratorEvent};
use crate::util::preview;

pub const HELP: &str = "\
All messages go to the senior agent, which delegates to the junior agent as needed.

Commands:
  <message>                 Talk to the senior agent
  /local <message>          Send a message straight to the junior agent
  /agents                   List agents and their availability
  /rules                    Show routing rules
  /history                  Show the last 10 turns
  /export [path]            Export the session (default: session_<id>.json)
  /clear                    Clear the conversation
  /memory                   Shared notepad status
  /memory write <content>   Add a note
  /memory read <id>         Show a note
  /memory list              List recent notes
  /memory delete <id>       Delete a note
  /help                     Show this help
  /quit                     Exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Agents,
    Rules,
    History,
    Export(Option<String>),
    Clear,
    MemoryStatus,
    MemoryWrite(String),
    MemoryRead(String),
    MemoryList,
    MemoryDelete(String),
    /// Known command with a missing argument.
    Usage(&'static str),
    UnknownMemory(String),
}

/// What the REPL should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse a slash command. `None` means the input is a message, including
/// unrecognized slash commands.
pub fn parse_command(input: &str) -> Option<SlashCommand> {
    let input = input.trim();
    if !input.starts_with('/') {
        return None;
    }
    let (cmd, arg) = split_word(input);

    let command = match cmd.to_lowercase().as_str() {
        "/help" => SlashCommand::Help,
        "/quit" | "/exit" | "/q" => SlashCommand::Quit,
        "/agents" => SlashCommand::Agents,
        "/rules" => SlashCommand::Rules,
        "/history" => SlashCommand::History,
        "/export" => SlashCommand::Export((!arg.is_empty()).then(|| arg.to_string())),
        "/clear" => SlashCommand::Clear,
        "/memory" => parse_memory(arg),
        _ => return None,
    };
    Some(command)
}

fn parse_memory(arg: &str) -> SlashCommand {
    if arg.is_empty() {
        return SlashCommand::MemoryStatus;
    }
    let (sub, rest) = split_word(arg);
    let sub = sub.to_lowercase();
    let required = |usage: &'static str, make: fn(String) -> SlashCommand| {
        if rest.is_empty() {
            SlashCommand::Usage(usage)
        } else {
            make(rest.to_string())
        }
    };
    match sub.as_str() {
        "write" => required("/memory write <content>", SlashCommand::MemoryWrite),
        "read" => required("/memory read <note_id>", SlashCommand::MemoryRead),
        "delete" => required("/memory delete <note_id>", SlashCommand::MemoryDelete),
        "list" => SlashCommand::MemoryList,
        _ => SlashCommand::UnknownMemory(sub),
    }
}

fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    }
}

/// Run a slash command against the orchestrator, writing plain text to `out`.
pub async fn execute<W: Write>(
    command: SlashCommand,
    orch: &mut Orchestrator,
    out: &mut W,
) -> anyhow::Result<Flow> {
    match command {
        SlashCommand::Help => writeln!(out, "{}", HELP)?,
        SlashCommand::Quit => {
            writeln!(out, "Goodbye!")?;
            return Ok(Flow::Quit);
        }
        SlashCommand::Agents => {
            for agent in orch.list_agents().await {
                let status = if agent.available { "available" } else { "unavailable" };
                writeln!(out, "{:<8} {:<20} {:<16} {}", agent.role, agent.id, agent.name, status)?;
            }
        }
        SlashCommand::Rules => {
            for rule in orch.router().rules() {
                writeln!(
                    out,
                    "{:<24} -> {:<16} {}",
                    preview(&rule.pattern, 21),
                    rule.target,
                    rule.description
                )?;
            }
        }
        SlashCommand::History => {
            let turns = orch.conversation().last_n(10);
            if turns.is_empty() {
                writeln!(out, "No conversation history")?;
            }
            for turn in turns {
                let agent = turn.agent().map(|a| format!(" [{}]", a)).unwrap_or_default();
                writeln!(out, "{}{}: {}", turn.role(), agent, preview(turn.content(), 100))?;
            }
        }
        SlashCommand::Export(path) => {
            let path = path
                .unwrap_or_else(|| format!("session_{}.json", orch.conversation().session_id()));
            orch.export_session(&path).await?;
            writeln!(out, "Exported to {}", path)?;
        }
        SlashCommand::Clear => {
            orch.clear_conversation(true);
            writeln!(out, "Conversation cleared")?;
        }
        SlashCommand::Usage(usage) => writeln!(out, "Usage: {}", usage)?,
        SlashCommand::UnknownMemory(sub) => writeln!(out, "Unknown memory command: {}", sub)?,
        memory => return execute_memory(memory, orch, out).await,
    }
    Ok(Flow::Continue)
}

async fn execute_memory<W: Write>(
    command: SlashCommand,
    orch: &Orchestrator,
    out: &mut W,
) -> anyhow::Result<Flow> {
    let Some(notepad) = orch.notepad() else {
        writeln!(out, "Shared notepad: not available")?;
        return Ok(Flow::Continue);
    };

    match command {
        SlashCommand::MemoryStatus => {
            let notes = notepad.list(&NoteFilter::recent(5)).await?;
            writeln!(
                out,
                "Shared notepad: {} backend{}",
                notepad.backend_kind(),
                if notepad.is_persistent() { "" } else { " (not persistent)" }
            )?;
            writeln!(out, "Recent notes: {}", notes.len())?;
            for note in notes {
                writeln!(out, "  [{}] {}: {}", note.author, note.id, preview(&note.preview, 50))?;
            }
        }
        SlashCommand::MemoryWrite(content) => {
            let id = notepad.write(&content, None, ["user"]).await?;
            writeln!(out, "Written to shared notepad: {}", id)?;
        }
        SlashCommand::MemoryRead(id) => match notepad.read(&id).await? {
            Some(content) => writeln!(out, "--- Note: {} ---\n{}", id, content)?,
            None => writeln!(out, "Note not found: {}", id)?,
        },
        SlashCommand::MemoryList => {
            let notes = notepad.list(&NoteFilter::recent(20)).await?;
            if notes.is_empty() {
                writeln!(out, "No notes in shared notepad")?;
            }
            for note in notes {
                let tags: Vec<&str> = note.tags.iter().map(String::as_str).collect();
                writeln!(
                    out,
                    "{:<10} {:<14} {:<16} {}",
                    note.id,
                    note.author,
                    tags.join(", "),
                    preview(&note.preview, 40)
                )?;
            }
        }
        SlashCommand::MemoryDelete(id) => {
            if notepad.delete(&id).await? {
                writeln!(out, "Deleted note: {}", id)?;
            } else {
                writeln!(out, "Note not found: {}", id)?;
            }
        }
        _ => {}
    }
    Ok(Flow::Continue)
}

/// Plain-text line for an orchestrator event, if it should be shown.
pub fn render_event(event: &OrchestratorEvent, show_routing: bool) -> Option<String> {
    match event {
        OrchestratorEvent::Routed {
            hop, agent, reason, ..
        } if show_routing => Some(if *hop > 1 {
            format!("-> Agent handoff to {}", agent)
        } else {
            format!("-> Routing to {} ({})", agent, reason)
        }),
        OrchestratorEvent::Reply { agent, content, .. } => {
            Some(format!("\n[{}]\n{}\n", agent, content))
        }
        OrchestratorEvent::Handoff { command, .. } => {
            Some(format!("Agent sending: {}", preview(command, 60)))
        }
        OrchestratorEvent::AutoBounce { .. } => {
            Some("Returning junior reply to the senior agent...".to_string())
        }
        OrchestratorEvent::MaxHops { .. } => {
            Some("Maximum agent hops reached, stopping chain".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::ScriptedAgent;
    use crate::agent::AgentId;
    use crate::notepad::Notepad;
    use crate::orchestrator::OrchestratorConfig;

    fn orchestrator(with_notepad: bool) -> Orchestrator {
        let builder = Orchestrator::builder(OrchestratorConfig::default())
            .agent(ScriptedAgent::senior("claude-code").into_arc())
            .agent(ScriptedAgent::junior("local-model").into_arc());
        let builder = if with_notepad {
            builder.notepad(Notepad::in_memory("user"))
        } else {
            builder
        };
        builder.build().unwrap()
    }

    async fn run(orch: &mut Orchestrator, input: &str) -> (Flow, String) {
        let command = parse_command(input).expect("slash command");
        let mut out = Vec::new();
        let flow = execute(command, orch, &mut out).await.unwrap();
        (flow, String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command("/help"), Some(SlashCommand::Help));
        assert_eq!(parse_command("  /EXIT "), Some(SlashCommand::Quit));
        assert_eq!(parse_command("/q"), Some(SlashCommand::Quit));
        assert_eq!(parse_command("/export"), Some(SlashCommand::Export(None)));
        assert_eq!(
            parse_command("/export out/s.json"),
            Some(SlashCommand::Export(Some("out/s.json".to_string())))
        );
        assert_eq!(parse_command("/memory"), Some(SlashCommand::MemoryStatus));
        assert_eq!(
            parse_command("/memory write remember  this"),
            Some(SlashCommand::MemoryWrite("remember  this".to_string()))
        );
        assert_eq!(
            parse_command("/memory read"),
            Some(SlashCommand::Usage("/memory read <note_id>"))
        );
        assert_eq!(
            parse_command("/memory frobnicate"),
            Some(SlashCommand::UnknownMemory("frobnicate".to_string()))
        );
    }

    #[test]
    fn messages_and_unknown_commands_are_not_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/local write a regex"), None);
        assert_eq!(parse_command("/senior review this"), None);
        assert_eq!(parse_command("/whatever"), None);
    }

    #[tokio::test]
    async fn memory_commands_round_trip() {
        let mut orch = orchestrator(true);

        let (_, written) = run(&mut orch, "/memory write use tokio everywhere").await;
        let id = written.trim().rsplit(' ').next().unwrap().to_string();
        assert!(written.starts_with("Written to shared notepad: "));

        let (_, listed) = run(&mut orch, "/memory list").await;
        assert!(listed.contains(&id));
        assert!(listed.contains("user"));

        let (_, read) = run(&mut orch, &format!("/memory read {}", id)).await;
        assert!(read.contains("use tokio everywhere"));

        let (_, deleted) = run(&mut orch, &format!("/memory delete {}", id)).await;
        assert_eq!(deleted.trim(), format!("Deleted note: {}", id));

        let (_, missing) = run(&mut orch, &format!("/memory read {}", id)).await;
        assert!(missing.contains("Note not found"));
    }

    #[tokio::test]
    async fn memory_without_notepad_reports_unavailable() {
        let mut orch = orchestrator(false);
        let (_, out) = run(&mut orch, "/memory list").await;
        assert_eq!(out.trim(), "Shared notepad: not available");
    }

    #[tokio::test]
    async fn history_export_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(false);

        let (_, empty) = run(&mut orch, "/history").await;
        assert_eq!(empty.trim(), "No conversation history");

        orch.chat("hello there", None).await.unwrap();
        let (_, history) = run(&mut orch, "/history").await;
        assert!(history.contains("user: hello there"));
        assert!(history.contains("assistant [claude-code]: claude-code done"));

        let path = dir.path().join("s.json");
        let (_, exported) = run(&mut orch, &format!("/export {}", path.display())).await;
        assert!(exported.starts_with("Exported to "));
        assert!(path.exists());

        run(&mut orch, "/clear").await;
        assert!(orch.conversation().is_empty());
    }

    #[tokio::test]
    async fn quit_and_agents() {
        let mut orch = orchestrator(false);
        let (flow, _) = run(&mut orch, "/quit").await;
        assert_eq!(flow, Flow::Quit);

        let (flow, agents) = run(&mut orch, "/agents").await;
        assert_eq!(flow, Flow::Continue);
        assert!(agents.contains("claude-code"));
        assert!(agents.contains("available"));

        let (_, rules) = run(&mut orch, "/rules").await;
        assert!(rules.contains("/local, /junior"));
    }

    #[test]
    fn renders_routing_and_handoffs() {
        let routed = OrchestratorEvent::Routed {
            hop: 1,
            agent: AgentId::new("claude-code"),
            reason: "default/senior".to_string(),
            fallback: false,
        };
        assert_eq!(
            render_event(&routed, true).as_deref(),
            Some("-> Routing to claude-code (default/senior)")
        );
        assert_eq!(render_event(&routed, false), None);

        let delta = OrchestratorEvent::TextDelta {
            hop: 1,
            agent: AgentId::new("claude-code"),
            content: "x".to_string(),
        };
        assert_eq!(render_event(&delta, true), None);
    }
}
