use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

use procflow_engine::{Layout, NoopRunner, OperationRunner, Scheduler, ShellRunner};
use procflow_types::WorkflowDoc;

fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();
    match matches.subcommand() {
        Some(("validate", sub)) => run_validate(sub),
        Some(("configure", sub)) => run_configure(sub),
        Some(("plan", sub)) => run_plan(sub),
        Some(("run", sub)) => run_execute(sub),
        _ => anyhow::bail!("expected a subcommand"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .try_init();
}

fn build_cli() -> Command {
    let file_arg = Arg::new("file")
        .short('f')
        .long("file")
        .value_name("FILE")
        .default_value("workflow.yaml")
        .help("Workflow document to load");
    let root_arg = Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .default_value(".")
        .help("Run root directory");

    Command::new("procflow")
        .about("Parametric study orchestration over declarative workflows")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("validate")
                .about("Validate unit structure and binding coverage")
                .arg(file_arg.clone()),
        )
        .subcommand(
            Command::new("configure")
                .about("Synchronize the study configuration and report input states")
                .arg(file_arg.clone())
                .arg(root_arg.clone()),
        )
        .subcommand(
            Command::new("plan")
                .about("Preview dataset expansion for every configured study")
                .arg(file_arg.clone())
                .arg(root_arg.clone()),
        )
        .subcommand(
            Command::new("run")
                .about("Execute every configured study, dataset by dataset")
                .arg(file_arg)
                .arg(root_arg)
                .arg(
                    Arg::new("noop")
                        .long("noop")
                        .action(ArgAction::SetTrue)
                        .help("Materialize declared outputs without running unit commands"),
                ),
        )
}

fn load_workflow(matches: &ArgMatches) -> Result<WorkflowDoc> {
    let file = matches.get_one::<String>("file").context("expected --file")?;
    procflow_engine::parse_workflow_file(&PathBuf::from(file))
}

fn layout_from(matches: &ArgMatches) -> Result<Layout> {
    let root = matches.get_one::<String>("root").context("expected --root")?;
    Ok(Layout::new(root))
}

fn run_validate(matches: &ArgMatches) -> Result<()> {
    let doc = load_workflow(matches)?;
    let resolved = procflow_engine::assemble(&doc)?;
    print!("{resolved}");
    println!(
        "workflow '{}' is valid: {} units, {} entries",
        resolved.name,
        doc.units.len(),
        resolved.entries.len()
    );
    Ok(())
}

fn run_configure(matches: &ArgMatches) -> Result<()> {
    let doc = load_workflow(matches)?;
    let resolved = procflow_engine::assemble(&doc)?;
    let layout = layout_from(matches)?;

    let config = procflow_engine::sync_run_config(&layout, &doc.studies, &resolved.interface)?;
    for status in procflow_engine::status_report(&config, &doc.studies) {
        print!("{status}");
    }
    println!("configuration written to {}", layout.run_config_file().display());
    Ok(())
}

fn run_plan(matches: &ArgMatches) -> Result<()> {
    let doc = load_workflow(matches)?;
    let resolved = procflow_engine::assemble(&doc)?;
    let layout = layout_from(matches)?;

    let config = procflow_engine::sync_run_config(&layout, &doc.studies, &resolved.interface)?;
    for study_name in &doc.studies {
        let Some(study) = config.studies.get(study_name) else {
            continue;
        };
        if !study.execute {
            println!("study '{study_name}': skip");
            continue;
        }
        let unresolved = study.unconfigured();
        if !unresolved.is_empty() {
            println!("study '{study_name}': not configured ({})", unresolved.join(", "));
            continue;
        }
        match procflow_engine::expand_study(&layout, study_name, study) {
            Ok(datasets) => {
                println!("study '{study_name}': {} dataset(s)", datasets.len());
                for dataset in datasets {
                    let values: Vec<String> = dataset
                        .params
                        .iter()
                        .map(|(name, value)| format!("{name}={value}"))
                        .chain(dataset.paths.iter().map(|(name, path)| format!("{name}={}", path.display())))
                        .collect();
                    println!("  {}: {}", dataset.id, values.join(", "));
                }
            }
            Err(error) => println!("{error}"),
        }
    }
    Ok(())
}

fn run_execute(matches: &ArgMatches) -> Result<()> {
    let doc = load_workflow(matches)?;
    let resolved = procflow_engine::assemble(&doc)?;
    let layout = layout_from(matches)?;

    let config = procflow_engine::sync_run_config(&layout, &doc.studies, &resolved.interface)?;
    procflow_engine::require_configured(&layout, &config, &doc.studies)?;

    let noop = NoopRunner;
    let shell = ShellRunner;
    let runner: &dyn OperationRunner = if matches.get_flag("noop") { &noop } else { &shell };

    let report = Scheduler::new(layout, runner).run(&doc, &resolved, &config)?;
    print!("{report}");
    if let Some(failure) = report.failure() {
        return Err(failure.into());
    }
    Ok(())
}
