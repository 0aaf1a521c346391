use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileEngineConfig, FileWorkspace};
use super::models::{AppConfig, GroupSeed, WorkspaceSeed};
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use algorun::engine::config::EngineConfigBuilder;
use tracing::debug;

/// Merges the pipeline file with command-line overrides.
///
/// Precedence per engine setting: dedicated CLI flags, then `-S` overrides, then the
/// `[engine]` table, then built-in defaults.
pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let file_config = FileConfig::from_file(&args.pipeline)?;
    build_from_file(file_config, args)
}

fn build_from_file(mut file_config: FileConfig, args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let mut engine_file = file_config.engine.take().unwrap_or_default();
    apply_set_values(&mut engine_file, &args.set_values)?;

    let record_history = if args.no_history {
        false
    } else {
        engine_file
            .record_history
            .unwrap_or(defaults.record_history)
    };
    let group_separator = args
        .group_separator
        .or(engine_file.group_separator)
        .unwrap_or(defaults.group_separator);
    let parallel_threshold = engine_file
        .parallel_threshold
        .unwrap_or(defaults.parallel_threshold);

    let engine = EngineConfigBuilder::new()
        .record_history(record_history)
        .group_separator(group_separator)
        .parallel_threshold(parallel_threshold)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    debug!(?engine, "Effective engine configuration");

    let workspaces = file_config
        .workspaces
        .into_iter()
        .map(|w| seed_workspace(w, &defaults))
        .collect();
    let groups = file_config
        .groups
        .into_iter()
        .map(|g| GroupSeed {
            name: g.name,
            members: g.members,
            multiperiod: g.multiperiod,
        })
        .collect();
    let steps = file_config
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| step.into_step(i + 1))
        .collect::<Result<Vec<_>>>()?;

    if steps.is_empty() {
        return Err(CliError::Config(
            "The pipeline defines no `[[steps]]`".to_string(),
        ));
    }

    Ok(AppConfig {
        engine,
        workspaces,
        groups,
        steps,
    })
}

fn seed_workspace(file: FileWorkspace, defaults: &DefaultsConfig) -> WorkspaceSeed {
    WorkspaceSeed {
        title: file.title.unwrap_or_else(|| file.name.clone()),
        name: file.name,
        spectra: file.spectra,
        bins: file.bins,
        fill: file.fill.unwrap_or(defaults.fill),
        first_spectrum_number: file
            .first_spectrum_number
            .unwrap_or(defaults.first_spectrum_number),
    }
}

fn apply_set_values(config: &mut FileEngineConfig, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let (key, value) =
            parser::parse_key_value(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
        let to_config = |e: parser::ParseError| CliError::Config(e.to_string());

        match key {
            "engine.record-history" => {
                config.record_history = Some(parser::parse_bool(key, value).map_err(to_config)?);
            }
            "engine.group-separator" => {
                config.group_separator = Some(parser::parse_char(key, value).map_err(to_config)?);
            }
            "engine.parallel-threshold" => {
                config.parallel_threshold =
                    Some(parser::parse_usize(key, value).map_err(to_config)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(())
}
