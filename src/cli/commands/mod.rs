use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// `hostbridge` - crash-safe file bridge between a questionnaire orchestrator
/// and an engine host.
#[derive(Parser, Debug)]
#[command(name = "hostbridge")]
#[command(version = "0.1.0")]
#[command(about = "File and HTTP bridge between a questionnaire orchestrator and an engine host.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full questionnaire session against the consumer
    Run {
        /// Use the legacy state.json / answer.json files
        #[arg(long)]
        json: bool,
    },

    /// Check the bridge document in the configured directory
    Validate,

    /// Post a single test question and wait for its answer
    TestQuestion {
        /// Use the legacy state.json / answer.json files
        #[arg(long)]
        json: bool,
    },

    /// Play the consumer side, answering every question automatically
    Simulate {
        /// Use the legacy state.json / answer.json files
        #[arg(long)]
        json: bool,

        /// Option picked for every question (clamped to the options offered)
        #[arg(long, default_value = "1")]
        answer_index: usize,
    },

    /// Compute the profile checksum of `key=value` dimensions
    Checksum {
        /// Dimensions, e.g. cognitive_density=0.5
        #[arg(required = true)]
        dimensions: Vec<String>,
    },

    /// Parse an `[EXEC:...]` routing anchor
    Anchor {
        text: String,
    },

    /// Talk to the host's remote control endpoint
    Remote {
        #[command(subcommand)]
        remote_command: RemoteCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    /// Query the endpoint's info route
    Info,
    /// Execute a script file on the host and print its result
    Exec {
        file: PathBuf,
    },
    /// Connection, breaker and request metrics
    Health,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_with_index() {
        let cli = Cli::try_parse_from(["hostbridge", "simulate", "--json", "--answer-index", "2"]).unwrap();
        match cli.command {
            Commands::Simulate { json, answer_index } => {
                assert!(json);
                assert_eq!(answer_index, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["hostbridge", "validate", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn checksum_requires_dimensions() {
        assert!(Cli::try_parse_from(["hostbridge", "checksum"]).is_err());
    }

    #[test]
    fn parses_remote_exec() {
        let cli = Cli::try_parse_from(["hostbridge", "remote", "exec", "probe.py"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Remote {
                remote_command: RemoteCommands::Exec { .. }
            }
        ));
    }
}
