use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use hostbridge::codec::{canonical_form, checksum, parse_exec_anchor};
use hostbridge::config::{BridgeMode, Config};
use hostbridge::consumer::{Consumer, simulate};
use hostbridge::document::{BRIDGE_FILE, validate_bridge_state};
use hostbridge::orchestrator::Orchestrator;
use hostbridge::poll::AdaptivePoller;
use hostbridge::profile::sample_question;
use hostbridge::remote::RemoteExecutor;
use hostbridge::store::AtomicStore;

use super::status::{render_health, render_session, render_validation};
use crate::cli::commands::{Cli, Commands, RemoteCommands};

fn mode_for(config: &Config, json: bool) -> BridgeMode {
    if json {
        BridgeMode::LegacyJson
    } else {
        config.bridge.mode
    }
}

/// Split `key=value` arguments into checksum dimensions.
fn parse_dimensions(raw: &[String]) -> Result<Vec<(String, f64)>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected key=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("dimension '{key}' is not a number"))?;
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

pub async fn dispatch(cli: Cli, config: Arc<Config>) -> Result<()> {
    match cli.command {
        Commands::Run { json } => {
            let mode = mode_for(&config, json);
            info!(mode = ?mode, "starting questionnaire session");
            let report = Orchestrator::new(config.as_ref().clone()).run(mode).await?;
            println!("{}", render_session(&report));
            Ok(())
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config.as_ref().clone());
            let path = orchestrator.bridge_dir()?.join(BRIDGE_FILE);
            let report = validate_bridge_state(&AtomicStore::from_config(&config.store), &path);
            println!("{}", render_validation(&report));
            if !report.valid {
                bail!("bridge document at {} is not valid", path.display());
            }
            Ok(())
        }

        Commands::TestQuestion { json } => {
            let orchestrator = Orchestrator::new(config.as_ref().clone());
            let answer = orchestrator
                .ask_single(mode_for(&config, json), &sample_question())
                .await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
            Ok(())
        }

        Commands::Simulate { json, answer_index } => {
            let dir = Orchestrator::new(config.as_ref().clone()).bridge_dir()?;
            let consumer = Consumer::new(
                dir,
                mode_for(&config, json),
                AtomicStore::from_config(&config.store),
            );
            let report = simulate(
                &consumer,
                &AdaptivePoller::from_config(&config.polling),
                answer_index,
                config.bridge.answer_timeout(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Checksum { dimensions } => {
            let dimensions = parse_dimensions(&dimensions)?;
            println!("{}", canonical_form(dimensions.iter().map(|(k, v)| (k.as_str(), *v))));
            println!("{}", checksum(dimensions.iter().map(|(k, v)| (k.as_str(), *v))));
            Ok(())
        }

        Commands::Anchor { text } => match parse_exec_anchor(&text) {
            Some(anchor) => {
                println!("{}", serde_json::to_string_pretty(&anchor)?);
                Ok(())
            }
            None => bail!("no [EXEC:...] anchor with six fields found"),
        },

        Commands::Remote { remote_command } => {
            let executor = RemoteExecutor::new(&config.remote, &config.polling);
            match remote_command {
                RemoteCommands::Info => {
                    let info = executor.client().info().await.map_err(|e| {
                        let hint = e.hint();
                        anyhow::Error::new(e).context(hint)
                    })?;
                    println!("{}", serde_json::to_string_pretty(&info)?);
                }
                RemoteCommands::Exec { file } => {
                    let code = std::fs::read_to_string(&file)
                        .with_context(|| format!("failed to read {}", file.display()))?;
                    let output = executor.execute_script(&code).await.map_err(|e| {
                        let hint = e.hint();
                        anyhow::Error::new(e).context(hint)
                    })?;
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                RemoteCommands::Health => {
                    let health = tokio::time::timeout(
                        Duration::from_secs(config.remote.request_timeout_secs.max(1) * 2),
                        executor.health(),
                    )
                    .await
                    .context("health check timed out")?;
                    println!("{}", render_health(&health));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_parse_pairs() {
        let dims = parse_dimensions(&["a=0.5".into(), " b = 1 ".into()]).unwrap();
        assert_eq!(dims, vec![("a".to_string(), 0.5), ("b".to_string(), 1.0)]);
    }

    #[test]
    fn malformed_dimension_is_rejected() {
        assert!(parse_dimensions(&["a:0.5".into()]).is_err());
        assert!(parse_dimensions(&["a=high".into()]).is_err());
    }

    #[test]
    fn json_flag_forces_legacy_mode() {
        let config = Config::default();
        assert_eq!(mode_for(&config, true), BridgeMode::LegacyJson);
        assert_eq!(mode_for(&config, false), BridgeMode::Document);
    }
}
