//! `integ-runner` command line

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use integ_core::{
    spawn_event_logger, CdkCliDriver, CliOverrides, EventSink, IntegRunner, Orchestrator,
    RunnerConfig, RunnerOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("integ-runner")
        .version(integ_core::VERSION)
        .about("Snapshot and integration test runner for infrastructure apps")
        .arg(
            Arg::new("tests")
                .num_args(0..)
                .help("Tests to run (default: every discovered test)"),
        )
        .arg(
            Arg::new("directory")
                .long("directory")
                .value_parser(value_parser!(PathBuf))
                .help("Directory searched for tests"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .default_value(integ_core::config::CONFIG_FILE)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file"),
        )
        .arg(
            Arg::new("parallel-regions")
                .long("parallel-regions")
                .value_delimiter(',')
                .num_args(1..)
                .help("Regions to deploy to"),
        )
        .arg(
            Arg::new("profiles")
                .long("profiles")
                .value_delimiter(',')
                .num_args(1..)
                .help("Credential profiles to deploy with"),
        )
        .arg(
            Arg::new("max-workers")
                .long("max-workers")
                .value_parser(value_parser!(usize))
                .help("Snapshot test parallelism"),
        )
        .arg(
            Arg::new("update-on-failed")
                .long("update-on-failed")
                .action(ArgAction::SetTrue)
                .help("Deploy tests whose snapshot comparison failed and rewrite their snapshots"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Deploy every selected test"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Synthesize and rewrite snapshots without deploying"),
        )
        .arg(
            Arg::new("no-clean")
                .long("no-clean")
                .action(ArgAction::SetTrue)
                .help("Leave stacks deployed"),
        )
        .arg(
            Arg::new("disable-update-workflow")
                .long("disable-update-workflow")
                .action(ArgAction::SetTrue)
                .help("Skip deploying the snapshot before the change"),
        )
        .arg(
            Arg::new("inspect-failures")
                .long("inspect-failures")
                .action(ArgAction::SetTrue)
                .help("Keep synth output of failed snapshot tests"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Print repro commands (repeat for more output)"),
        )
        .arg(
            Arg::new("watch")
                .long("watch")
                .action(ArgAction::SetTrue)
                .help("Deploy a single test in watch mode"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List discovered tests and exit"),
        )
        .arg(
            Arg::new("language")
                .long("language")
                .num_args(1..)
                .help("Language presets used for discovery"),
        )
        .arg(
            Arg::new("test-regex")
                .long("test-regex")
                .num_args(1..)
                .help("Custom test file patterns"),
        )
        .arg(Arg::new("app").long("app").help("Custom app command, may contain {filePath}"))
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .num_args(1..)
                .help("Tests to skip"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
}

fn strings(matches: &ArgMatches, id: &str) -> Option<Vec<String>> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
}

fn overrides(matches: &ArgMatches) -> CliOverrides {
    CliOverrides {
        directory: matches.get_one::<PathBuf>("directory").cloned(),
        max_workers: matches.get_one::<usize>("max-workers").copied(),
        parallel_regions: strings(matches, "parallel-regions"),
        profiles: strings(matches, "profiles"),
        no_clean: matches.get_flag("no-clean"),
        dry_run: matches.get_flag("dry-run"),
        disable_update_workflow: matches.get_flag("disable-update-workflow"),
        verbosity: matches.get_count("verbose"),
        inspect_failures: matches.get_flag("inspect-failures"),
        force: matches.get_flag("force"),
        update_on_failed: matches.get_flag("update-on-failed"),
        language: strings(matches, "language"),
        test_regex: strings(matches, "test-regex"),
        app: matches.get_one::<String>("app").cloned(),
        tests: strings(matches, "tests").filter(|t| !t.is_empty()),
        exclude: strings(matches, "exclude"),
    }
}

fn setup_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}

async fn watch(config: &RunnerConfig, driver: Arc<CdkCliDriver>, events: EventSink) -> Result<ExitCode> {
    let units = integ_suite::discover(&config.directory, &config.discovery_options()?)?;
    let [unit] = units.as_slice() else {
        bail!("watch mode needs exactly one test, {} selected", units.len());
    };
    let region = config
        .parallel_regions
        .first()
        .cloned()
        .context("no region configured")?;
    let options = RunnerOptions {
        verbosity: config.verbosity,
        ..RunnerOptions::new(region).with_profile(config.profiles.first().cloned())
    };

    let mut runner = IntegRunner::new(unit.clone(), driver, options, events).await?;
    let cases: Vec<String> = runner.actual_suite().test_cases().keys().cloned().collect();
    let mut code = 0;
    for case in cases {
        let outcome = runner.watch(&case).await?;
        code = code.max(outcome.exit_code.unwrap_or(1));
    }
    Ok(if code == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    setup_logging(matches.get_flag("json-logs"));

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(integ_core::config::CONFIG_FILE));
    let config = RunnerConfig::load(&config_path)?.merge_cli(overrides(&matches));
    config.validate()?;

    if matches.get_flag("list") {
        let units = integ_suite::discover(&config.directory, &config.discovery_options()?)?;
        for unit in units {
            println!("{}", unit.normalized_test_name());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let (events, receiver) = EventSink::channel();
    let logger = spawn_event_logger(receiver);
    let driver = Arc::new(CdkCliDriver::new(config.cdk_cli.clone()));

    let code = if matches.get_flag("watch") {
        watch(&config, driver, events).await?
    } else {
        let units = integ_suite::discover(&config.directory, &config.discovery_options()?)?;
        tracing::info!(tests = units.len(), directory = %config.directory.display(), "discovered tests");

        let orchestrator = Orchestrator::new(driver, config.clone(), events);
        let summary = orchestrator.run(units).await;
        drop(orchestrator);

        for diagnostic in summary.failures() {
            tracing::error!("{diagnostic}");
        }
        for change in summary.destructive_changes() {
            tracing::warn!("destructive change: {change}");
        }
        if config.verbosity > 0 {
            println!("{}", summary.render_metrics());
        }
        if !summary.success() && !config.update_on_failed && !config.force {
            tracing::info!("to deploy failed tests and update their snapshots run: integ-runner --update-on-failed");
        }
        if summary.success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    };

    if let Err(e) = logger.await {
        tracing::debug!(error = %e, "event logger stopped");
    }
    Ok(code)
}
