mod cli;

use dubforge::{app::App, config};
use dubforge_av::ArtifactCleaner;
use dubforge_core::{CapabilityKind, StageStatus, TaskResult, TaskStatus};
use dubforge_pipeline::{ProgressEvent, Reporter};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, TaskArgs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbosity flags
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dubforge=trace,dubforge_pipeline=trace,dubforge_backends=debug,dubforge_av=debug,dubforge_core=debug".to_string()
        } else if cli.quiet {
            "warn".to_string()
        } else {
            "dubforge=info,dubforge_pipeline=info,dubforge_backends=info,dubforge_av=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Dub {
            input,
            output,
            task,
            validate,
            json,
        } => runtime()?.block_on(dub_file(config_path, &input, output, &task, validate, json)),
        Commands::Batch {
            inputs,
            output_dir,
            max_concurrency,
            task,
            json,
        } => runtime()?.block_on(run_batch(
            config_path,
            &inputs,
            &output_dir,
            max_concurrency,
            &task,
            json,
        )),
        Commands::List { kind, json } => list_backends(config_path, kind, json),
        Commands::Info { kind, name } => backend_info(config_path, kind, &name),
        Commands::Validate {
            reference,
            output,
            json,
        } => runtime()?.block_on(validate_output(config_path, &reference, &output, json)),
        Commands::CheckTools => check_tools(config_path),
        Commands::CheckConfig {
            config: explicit,
        } => {
            let path = explicit.or(cli.config);
            check_config(path.as_deref())
        }
        Commands::Version => {
            println!("dubforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn load_app(config_path: Option<&Path>) -> Result<App> {
    let config = config::load_config_or_default(config_path)?;
    App::new(config)
}

/// Log progress events as they happen.
fn log_reporter() -> Arc<Reporter> {
    Arc::new(Reporter::new(|event| match event {
        ProgressEvent::TaskStarted { input } => {
            tracing::info!(input = %input.display(), "task started")
        }
        ProgressEvent::StageFinished { input, record } => tracing::info!(
            input = %input.display(),
            stage = record.stage.as_str(),
            status = ?record.status,
            backend = record.backend.as_deref().unwrap_or("-"),
            "stage finished"
        ),
        ProgressEvent::TaskFinished { input, status, error } => match error {
            Some(error) => tracing::error!(input = %input.display(), %error, "task failed"),
            None => tracing::info!(input = %input.display(), status = ?status, "task finished"),
        },
        ProgressEvent::BatchStarted { total } => tracing::info!(total, "batch started"),
        ProgressEvent::ItemFinished {
            input,
            completed,
            failed,
            total,
            ..
        } => tracing::info!(
            input = %input.display(),
            "[{}/{}] done ({} failed)",
            completed + failed,
            total,
            failed
        ),
        ProgressEvent::BatchFinished { .. } => {}
    }))
}

async fn dub_file(
    config_path: Option<&Path>,
    input: &Path,
    output: Option<PathBuf>,
    args: &TaskArgs,
    validate: bool,
    json: bool,
) -> Result<()> {
    // Verify input file exists
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let app = load_app(config_path)?;
    let output = output.unwrap_or_else(|| app.default_output(input));
    let task = app.build_task(input, &output, &args.options())?;

    tracing::info!("Dubbing {:?} -> {:?}", input, output);
    let orchestrator = app.orchestrator(log_reporter());
    let result = orchestrator.run(task).await;

    if !args.keep_intermediates {
        ArtifactCleaner::new().clean(&result).await;
    }

    let report = match (validate, result.status) {
        (true, TaskStatus::Completed) => Some(app.validator().validate(input, &output).await),
        _ => None,
    };

    if json {
        let value = serde_json::json!({ "result": result, "validation": report });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_result(&result);
        if let Some(report) = &report {
            println!("\n{report}");
        }
    }

    if let Some(error) = &result.error {
        anyhow::bail!("Dubbing failed: {error}");
    }
    Ok(())
}

fn print_result(result: &TaskResult) {
    println!("Input: {}", result.task.input.display());
    for record in &result.stages {
        let mark = match record.status {
            StageStatus::Completed => "✓",
            StageStatus::Skipped => "-",
            StageStatus::Failed => "✗",
        };
        print!("  {} {}", mark, record.stage.as_str());
        if let Some(ref backend) = record.backend {
            print!(" [{}]", backend);
        }
        if let Some(ref detail) = record.detail {
            print!(" ({})", detail);
        }
        println!();
    }
    match (&result.output, result.processing_secs()) {
        (Some(output), Some(secs)) => println!("Output: {} ({:.1}s)", output.display(), secs),
        (Some(output), None) => println!("Output: {}", output.display()),
        _ => {}
    }
}

async fn run_batch(
    config_path: Option<&Path>,
    inputs: &[PathBuf],
    output_dir: &Path,
    max_concurrency: Option<usize>,
    args: &TaskArgs,
    json: bool,
) -> Result<()> {
    let app = load_app(config_path)?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, letting running items finish");
            trigger.cancel();
        }
    });

    let scheduler = app
        .scheduler(log_reporter(), max_concurrency)?
        .with_cancellation(token);

    // A lone directory, or a lone path without an extension, is enumerated.
    let files = match inputs {
        [single] if single.is_dir() || single.extension().is_none() => {
            scheduler.enumerate(single)?
        }
        _ => inputs.to_vec(),
    };

    let Some(first) = files.first() else {
        println!("No media files to process.");
        return Ok(());
    };
    let template = app.build_task(first, &scheduler.output_path(first, output_dir), &args.options())?;

    let result = scheduler.run_files(&files, output_dir, &template).await?;

    if !args.keep_intermediates {
        let cleaner = ArtifactCleaner::new();
        for item in &result.results {
            cleaner.clean(item).await;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for item in &result.results {
            match &item.error {
                Some(error) => println!("✗ {} - {}", item.task.input.display(), error),
                None => println!(
                    "✓ {} -> {}",
                    item.task.input.display(),
                    item.task.output.display()
                ),
            }
        }
        println!(
            "\nProcessed {} files: {} completed, {} failed",
            result.total, result.completed, result.failed
        );
    }

    if result.failed > 0 {
        anyhow::bail!("{} of {} files failed", result.failed, result.total);
    }
    Ok(())
}

fn list_backends(config_path: Option<&Path>, kind: Option<CapabilityKind>, json: bool) -> Result<()> {
    let app = load_app(config_path)?;
    let kinds: Vec<CapabilityKind> = match kind {
        Some(kind) => vec![kind],
        None => CapabilityKind::ALL.to_vec(),
    };

    if json {
        let mut entries = Vec::new();
        for kind in &kinds {
            for desc in app.registry.list(*kind) {
                entries.push(serde_json::json!({
                    "kind": kind.as_str(),
                    "name": desc.name(),
                    "available": desc.is_available(),
                    "description": desc.description(),
                    "languages": desc.languages(),
                    "quality_tiers": desc.quality_tiers(),
                }));
            }
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for kind in kinds {
        println!("{} ({}):", kind.label(), kind.as_str());
        let preferred = app.config.preferences.for_kind(kind);
        for desc in app.registry.list(kind) {
            let status = if desc.is_available() { "✓" } else { "✗" };
            print!("  {} {}", status, desc.name());
            if preferred.first().map(String::as_str) == Some(desc.name()) {
                print!(" [preferred]");
            }
            println!(" - {}", desc.description());
        }
    }
    Ok(())
}

fn backend_info(config_path: Option<&Path>, kind: CapabilityKind, name: &str) -> Result<()> {
    let app = load_app(config_path)?;
    let Some(desc) = app.registry.get(kind, name) else {
        anyhow::bail!("No {} backend named '{}'", kind, name);
    };

    let info = desc.info();
    println!("Name: {}", desc.name());
    println!("Kind: {}", kind.label());
    println!("Description: {}", info.description);
    println!("Available: {}", if desc.is_available() { "yes" } else { "no" });
    if info.languages.is_empty() {
        println!("Languages: any");
    } else {
        let languages: Vec<&str> = info.languages.iter().map(String::as_str).collect();
        println!("Languages: {}", languages.join(", "));
    }
    if !info.quality_tiers.is_empty() {
        let tiers: Vec<&str> = info.quality_tiers.iter().map(|t| t.as_str()).collect();
        println!("Quality tiers: {}", tiers.join(", "));
    }
    if !info.requirements.is_empty() {
        println!("Requirements:");
        for requirement in &info.requirements {
            println!("  - {}", requirement);
        }
    }
    Ok(())
}

async fn validate_output(
    config_path: Option<&Path>,
    reference: &Path,
    output: &Path,
    json: bool,
) -> Result<()> {
    if !reference.exists() {
        anyhow::bail!("Reference file does not exist: {:?}", reference);
    }

    let app = load_app(config_path)?;
    let report = app.validator().validate(reference, output).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if !report.valid {
        anyhow::bail!("Quality validation failed with {} issue(s)", report.issues.len());
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let app = load_app(config_path)?;
    let mut all_ok = true;

    for tool in app.tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all backends.");
    }

    Ok(())
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Max concurrency: {}", config.batch.max_concurrency);
    println!("  Batch extensions: {}", config.batch.extensions.join(", "));
    for kind in CapabilityKind::ALL {
        println!(
            "  {} preference: {}",
            kind.label(),
            config.preferences.for_kind(kind).join(", ")
        );
    }
    for warning in config.validate() {
        println!("  ! {}", warning);
    }

    Ok(())
}
