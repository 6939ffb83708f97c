//! CLI argument parsing with clap.
//!
//! This module handles parsing command-line arguments and converting them
//! to the core `Invocation` format.

use clap::{ArgGroup, Parser};
use hey_core::input::{Command, ContextSelection, Invocation};
use hey_core::{ContextId, ListRange, Overrides};
use std::io;
use std::path::PathBuf;

const CLI_AFTER_HELP: &str = "\
Examples:
  hey what is a monad          continue the active context (or start one)
  hey --new rust how do I ...  start a context titled 'rust'
  git diff | hey -             send piped stdin as the prompt
  hey --list -5:               the five oldest contexts
  hey --context 3 --history    show context 3 without switching to it";

/// hey - chat with a language model from the command line
#[derive(Parser, Debug)]
#[command(
    name = "hey",
    version,
    about = "Chat with a language model from the command line",
    after_help = CLI_AFTER_HELP
)]
#[command(group(
    ArgGroup::new("command")
        .args(["history", "list", "search", "switch", "delete", "rename", "undo", "retry", "reindex"])
        .multiple(false)
))]
pub struct Cli {
    /// Input message (`-` reads it from stdin)
    #[arg(value_name = "INPUT", conflicts_with = "command")]
    pub inputs: Vec<String>,

    // === Context selection ===
    /// Create and switch to a new context, optionally titled
    #[arg(long, value_name = "TITLE", num_args = 0..=1, default_missing_value = "")]
    pub new: Option<String>,

    /// Operate on context ID for this invocation
    #[arg(long, value_name = "ID", conflicts_with = "new")]
    pub context: Option<ContextId>,

    // === Commands ===
    /// Show the messages of the context
    #[arg(long)]
    pub history: bool,

    /// List contexts, optionally sliced by RANGE ("start:end")
    #[arg(
        long,
        value_name = "RANGE",
        num_args = 0..=1,
        default_missing_value = ":",
        allow_hyphen_values = true
    )]
    pub list: Option<String>,

    /// Search context titles and messages
    #[arg(long, value_name = "KEYWORD")]
    pub search: Option<String>,

    /// Set the active context
    #[arg(long, value_name = "ID", conflicts_with_all = ["new", "context"])]
    pub switch: Option<ContextId>,

    /// Delete the context
    #[arg(long)]
    pub delete: bool,

    /// Rename the context
    #[arg(long, value_name = "TITLE")]
    pub rename: Option<String>,

    /// Drop the last message and its reply
    #[arg(long)]
    pub undo: bool,

    /// Ask again for a reply to the last message
    #[arg(long)]
    pub retry: bool,

    /// Rebuild the context index from the stored contexts
    #[arg(long)]
    pub reindex: bool,

    // === Completion overrides ===
    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature (0.0 to 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Profile name from the config file
    #[arg(long)]
    pub profile: Option<String>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    // === Environment ===
    /// Path to the config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Home directory for contexts and config (default: $HEY_HOME or ~/.hey)
    #[arg(long, value_name = "PATH")]
    pub home: Option<PathBuf>,

    /// Show diagnostic output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Convert to an [`Invocation`].
    ///
    /// `read_stdin` is only called when the prompt comes from stdin: the
    /// input is a lone `-`, or there is no input and stdin is a pipe.
    pub fn to_invocation<F>(&self, stdin_is_pipe: bool, read_stdin: F) -> hey_core::Result<Invocation>
    where
        F: FnOnce() -> io::Result<String>,
    {
        let selection = if let Some(ref title) = self.new {
            let title = title.trim();
            ContextSelection::New {
                title: (!title.is_empty()).then(|| title.to_string()),
            }
        } else if let Some(id) = self.context {
            ContextSelection::Explicit(id)
        } else {
            ContextSelection::Active
        };

        let command = if self.history {
            Command::ShowHistory
        } else if let Some(ref range) = self.list {
            Command::ListContexts {
                range: Some(range.parse::<ListRange>()?),
            }
        } else if let Some(ref keyword) = self.search {
            Command::Search {
                keyword: keyword.clone(),
            }
        } else if let Some(id) = self.switch {
            Command::Switch { id }
        } else if self.delete {
            Command::Delete
        } else if let Some(ref title) = self.rename {
            Command::Rename {
                title: title.clone(),
            }
        } else if self.undo {
            Command::Undo
        } else if self.retry {
            Command::Retry
        } else if self.reindex {
            Command::Reindex
        } else {
            match self.prompt(stdin_is_pipe, read_stdin)? {
                Some(prompt) => Command::SendPrompt { prompt },
                None => Command::NoOp,
            }
        };

        let overrides = Overrides {
            profile: self.profile.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            stream: self.no_stream.then_some(false),
        };

        Ok(Invocation::new(command)
            .with_selection(selection)
            .with_overrides(overrides))
    }

    fn prompt<F>(&self, stdin_is_pipe: bool, read_stdin: F) -> io::Result<Option<String>>
    where
        F: FnOnce() -> io::Result<String>,
    {
        let from_stdin = self.inputs == ["-"] || (self.inputs.is_empty() && stdin_is_pipe);
        let text = if from_stdin {
            read_stdin()?.trim_end().to_string()
        } else {
            self.inputs.join(" ")
        };
        Ok((!text.trim().is_empty()).then_some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hey_core::Error;
    use hey_core::error::StoreError;

    /// Helper to create args from a command string (shell-style parsing)
    fn args(s: &str) -> Vec<String> {
        std::iter::once("hey".to_string())
            .chain(shlex::split(s).unwrap_or_default())
            .collect()
    }

    fn parse_cli(s: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args(s))
    }

    fn parse_invocation(s: &str) -> hey_core::Result<Invocation> {
        let cli = parse_cli(s).unwrap();
        cli.to_invocation(false, || panic!("stdin should not be read"))
    }

    fn no_stdin() -> io::Result<String> {
        Ok(String::new())
    }

    #[test]
    fn test_no_args_is_noop() {
        let invocation = parse_invocation("").unwrap();
        assert_eq!(invocation.command, Command::NoOp);
        assert_eq!(invocation.selection, ContextSelection::Active);
        assert_eq!(invocation.overrides, Overrides::default());
    }

    #[test]
    fn test_inputs_are_joined_with_spaces() {
        let invocation = parse_invocation("what is   'a monad'").unwrap();
        assert_eq!(
            invocation.command,
            Command::SendPrompt {
                prompt: "what is a monad".to_string()
            }
        );
    }

    #[test]
    fn test_dash_reads_stdin() {
        let cli = parse_cli("-").unwrap();
        let invocation = cli
            .to_invocation(false, || Ok("from a file\n".to_string()))
            .unwrap();
        assert_eq!(
            invocation.command,
            Command::SendPrompt {
                prompt: "from a file".to_string()
            }
        );
    }

    #[test]
    fn test_piped_example_in_help_reads_stdin() {
        let example = CLI_AFTER_HELP
            .lines()
            .find_map(|line| line.split_once(" | hey "))
            .map(|(_, rest)| rest.split("  ").next().unwrap_or_default())
            .unwrap();
        let cli = parse_cli(example).unwrap();
        let invocation = cli
            .to_invocation(true, || Ok("diff --git a/x b/x\n".to_string()))
            .unwrap();
        assert_eq!(
            invocation.command,
            Command::SendPrompt {
                prompt: "diff --git a/x b/x".to_string()
            }
        );
    }

    #[test]
    fn test_piped_stdin_without_inputs() {
        let cli = parse_cli("--new notes").unwrap();
        let invocation = cli
            .to_invocation(true, || Ok("summarize this".to_string()))
            .unwrap();
        assert_eq!(
            invocation.command,
            Command::SendPrompt {
                prompt: "summarize this".to_string()
            }
        );

        let cli = parse_cli("").unwrap();
        let invocation = cli.to_invocation(true, no_stdin).unwrap();
        assert_eq!(invocation.command, Command::NoOp);
    }

    #[test]
    fn test_inputs_win_over_piped_stdin() {
        let cli = parse_cli("hello").unwrap();
        let invocation = cli
            .to_invocation(true, || panic!("stdin should not be read"))
            .unwrap();
        assert!(matches!(invocation.command, Command::SendPrompt { .. }));
    }

    #[test]
    fn test_new_with_and_without_title() {
        let invocation = parse_invocation("--new").unwrap();
        assert_eq!(invocation.selection, ContextSelection::New { title: None });
        assert_eq!(invocation.command, Command::NoOp);

        let invocation = parse_invocation("--new rust how do lifetimes work").unwrap();
        assert_eq!(
            invocation.selection,
            ContextSelection::New {
                title: Some("rust".to_string())
            }
        );
        assert_eq!(
            invocation.command,
            Command::SendPrompt {
                prompt: "how do lifetimes work".to_string()
            }
        );
    }

    #[test]
    fn test_explicit_context() {
        let invocation = parse_invocation("--context 3 --history").unwrap();
        assert_eq!(
            invocation.selection,
            ContextSelection::Explicit(ContextId::new(3))
        );
        assert_eq!(invocation.command, Command::ShowHistory);
    }

    #[test]
    fn test_context_rejects_non_numeric_id() {
        assert!(parse_cli("--context work").is_err());
        assert!(parse_cli("--switch x").is_err());
    }

    #[test]
    fn test_list_without_range() {
        let invocation = parse_invocation("--list").unwrap();
        let Command::ListContexts { range: Some(range) } = invocation.command else {
            panic!("expected a listing");
        };
        assert_eq!(range, ListRange::default());
    }

    #[test]
    fn test_list_with_ranges() {
        let invocation = parse_invocation("--list 2:5").unwrap();
        assert_eq!(
            invocation.command,
            Command::ListContexts {
                range: Some(ListRange::new(Some(2), Some(5)))
            }
        );

        let invocation = parse_invocation("--list -3:").unwrap();
        assert_eq!(
            invocation.command,
            Command::ListContexts {
                range: Some(ListRange::new(Some(-3), None))
            }
        );
    }

    #[test]
    fn test_list_with_bad_range() {
        let err = parse_invocation("--list 1:2:3").unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::InvalidRange(_))));
        assert!(parse_invocation("--list five").is_err());
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            parse_invocation("--switch 4").unwrap().command,
            Command::Switch {
                id: ContextId::new(4)
            }
        );
        assert_eq!(
            parse_invocation("--search Tokyo").unwrap().command,
            Command::Search {
                keyword: "Tokyo".to_string()
            }
        );
        assert_eq!(
            parse_invocation("--rename 'Trip Planning'").unwrap().command,
            Command::Rename {
                title: "Trip Planning".to_string()
            }
        );
        assert_eq!(parse_invocation("--delete").unwrap().command, Command::Delete);
        assert_eq!(parse_invocation("--undo").unwrap().command, Command::Undo);
        assert_eq!(parse_invocation("--retry").unwrap().command, Command::Retry);
        assert_eq!(parse_invocation("--reindex").unwrap().command, Command::Reindex);
    }

    #[test]
    fn test_commands_are_mutually_exclusive() {
        assert!(parse_cli("--history --undo").is_err());
        assert!(parse_cli("--delete --list").is_err());
        assert!(parse_cli("--history hello").is_err());
        assert!(parse_cli("--switch 2 --context 1").is_err());
        assert!(parse_cli("--new a --context 1").is_err());
    }

    #[test]
    fn test_overrides() {
        let invocation =
            parse_invocation("--model gpt-4o --temperature 0.2 --profile work --no-stream hi")
                .unwrap();
        assert_eq!(
            invocation.overrides,
            Overrides {
                profile: Some("work".to_string()),
                model: Some("gpt-4o".to_string()),
                temperature: Some(0.2),
                stream: Some(false),
            }
        );
    }

    #[test]
    fn test_environment_flags() {
        let cli = parse_cli("-v --home /tmp/hey --config /tmp/hey.toml").unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/hey")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/hey.toml")));
    }
}
