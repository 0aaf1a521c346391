use crate::cli::RunArgs;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use algorun::core::models::group::WorkspaceGroup;
use algorun::core::models::workspace::Workspace;
use algorun::core::registry::{RegistryEntry, WorkspaceRegistry};
use algorun::engine::factory::AlgorithmFactory;
use algorun::engine::progress::ProgressReporter;
use algorun::workflows::pipeline;
use itertools::Itertools;
use std::fmt::Write;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Loading pipeline from {:?}", &args.pipeline);
    let app = build_config(&args)?;

    let registry = WorkspaceRegistry::new();
    seed_registry(&registry, &app)?;
    info!(
        "Seeded registry with {} workspace(s) and {} group(s).",
        app.workspaces.len(),
        app.groups.len()
    );

    let factory = AlgorithmFactory::with_builtins();

    if args.dry_run {
        let invocations = pipeline::prepare(&factory, &app.steps)?;
        println!("Dry run: {} step(s) prepared, nothing executed.", invocations.len());
        for (i, invocation) in invocations.iter().enumerate() {
            println!("  {}. {} v{}", i + 1, invocation.name(), invocation.version());
        }
        print!("{}", render_summary(&registry));
        return Ok(());
    }

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Running {} pipeline step(s)...", app.steps.len());
    let outcome = tokio::task::block_in_place(|| {
        pipeline::run(&registry, &factory, &app.steps, &app.engine, &reporter)
    });

    match &outcome {
        Ok(result) => println!(
            "Pipeline complete: {} step(s) in {:.2?}.",
            result.reports.len(),
            result.duration
        ),
        Err(e) => warn!("Pipeline stopped early: {}", e),
    }
    print!("{}", render_summary(&registry));

    outcome?;
    Ok(())
}

fn seed_registry(registry: &WorkspaceRegistry, app: &AppConfig) -> Result<()> {
    for seed in &app.workspaces {
        let workspace = Workspace::filled(
            seed.title.as_str(),
            seed.spectra,
            seed.bins,
            seed.fill,
            seed.first_spectrum_number,
        );
        registry.add_or_replace(&seed.name, workspace)?;
    }
    for seed in &app.groups {
        let members = seed.members.iter().map(String::as_str);
        let group = if seed.multiperiod {
            WorkspaceGroup::multiperiod(members)
        } else {
            WorkspaceGroup::new(members)
        };
        registry.add_group(&seed.name, group)?;
    }
    Ok(())
}

/// One line per registry entry, in name order.
fn render_summary(registry: &WorkspaceRegistry) -> String {
    let mut out = String::from("Registry:\n");
    let entries = registry.entries();
    if entries.is_empty() {
        out.push_str("  (empty)\n");
    }
    for entry in entries {
        let _ = match entry {
            RegistryEntry::Workspace(handle) => {
                let ws = handle.read();
                writeln!(
                    out,
                    "  {:<20} workspace  {}x{}  title={:?}  history={}",
                    handle.name(),
                    ws.size(),
                    ws.bins(),
                    ws.title,
                    ws.history().len()
                )
            }
            RegistryEntry::Group { name, group } => writeln!(
                out,
                "  {:<20} {}  [{}]",
                name,
                if group.is_multiperiod() {
                    "multiperiod group"
                } else {
                    "group"
                },
                group.members().iter().join(", ")
            ),
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{GroupSeed, WorkspaceSeed};
    use algorun::engine::config::EngineConfig;

    fn seed(name: &str, spectra: usize) -> WorkspaceSeed {
        WorkspaceSeed {
            name: name.to_string(),
            title: name.to_uppercase(),
            spectra,
            bins: 2,
            fill: 1.0,
            first_spectrum_number: 1,
        }
    }

    fn app(groups: Vec<GroupSeed>) -> AppConfig {
        AppConfig {
            engine: EngineConfig::default(),
            workspaces: vec![seed("a_1", 2), seed("a_2", 2)],
            groups,
            steps: Vec::new(),
        }
    }

    #[test]
    fn seeding_creates_workspaces_and_groups() {
        let registry = WorkspaceRegistry::new();
        let config = app(vec![GroupSeed {
            name: "a".to_string(),
            members: vec!["a_1".to_string(), "a_2".to_string()],
            multiperiod: true,
        }]);

        seed_registry(&registry, &config).unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.retrieve_group("a").unwrap().is_multiperiod());
        assert_eq!(registry.retrieve("a_2").unwrap().read().title, "A_2");
    }

    #[test]
    fn seeding_rejects_groups_with_unknown_members() {
        let registry = WorkspaceRegistry::new();
        let config = app(vec![GroupSeed {
            name: "b".to_string(),
            members: vec!["b_1".to_string()],
            multiperiod: false,
        }]);

        assert!(seed_registry(&registry, &config).is_err());
    }

    #[test]
    fn summary_lists_every_entry() {
        let registry = WorkspaceRegistry::new();
        seed_registry(
            &registry,
            &app(vec![GroupSeed {
                name: "a".to_string(),
                members: vec!["a_1".to_string(), "a_2".to_string()],
                multiperiod: false,
            }]),
        )
        .unwrap();

        let summary = render_summary(&registry);
        let lines: Vec<&str> = summary.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("group  [a_1, a_2]"));
        assert!(lines[2].contains("workspace  2x2  title=\"A_1\"  history=0"));
    }

    #[test]
    fn empty_registry_is_reported() {
        assert_eq!(
            render_summary(&WorkspaceRegistry::new()),
            "Registry:\n  (empty)\n"
        );
    }

    fn pipeline_args(contents: &str) -> (tempfile::TempDir, RunArgs) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, contents).unwrap();
        let args = RunArgs {
            pipeline: path,
            ..RunArgs::default()
        };
        (dir, args)
    }

    const PIPELINE: &str = r#"
[[workspaces]]
name = "a"
spectra = 2
bins = 1

[[steps]]
algorithm = "Scale"
properties = { InputWorkspace = "a", Factor = 3.0, OutputWorkspace = "a" }
"#;

    #[tokio::test(flavor = "multi_thread")]
    async fn pipeline_runs_end_to_end() {
        let (_dir, args) = pipeline_args(PIPELINE);
        let (sender, _receiver) = mpsc::channel(1024);
        run(args, sender).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dry_run_accepts_steps_without_executing() {
        let (_dir, mut args) = pipeline_args(PIPELINE);
        args.dry_run = true;
        let (sender, _receiver) = mpsc::channel(1);
        run(args, sender).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_step_is_returned_as_error() {
        let (_dir, args) = pipeline_args(
            r#"
[[steps]]
algorithm = "Plus"
properties = { LHSWorkspace = "x", RHSWorkspace = "y", OutputWorkspace = "z" }
"#,
        );
        let (sender, _receiver) = mpsc::channel(1024);
        let err = run(args, sender).await.unwrap_err();
        assert!(err.to_string().starts_with("Step 1 (Plus) failed"));
    }
}
