use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use typeforge::api::{FontApiClient, FontWeight, JobSource};
use typeforge::cli::{Cli, Command};
use typeforge::config::TypeforgeConfig;
use typeforge::notify::Notifier;
use typeforge::orchestrator::{CheckoutOutcome, Orchestrator};
use typeforge::poller::PollOutcome;
use typeforge::store::LocalStore;
use typeforge::ui::{self, JobProgress};

type App = Orchestrator<FontApiClient>;

fn init_tracing(verbose: bool) {
    let default = if verbose { "typeforge=debug" } else { "typeforge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<TypeforgeConfig> {
    let mut config = match &cli.config {
        Some(path) => TypeforgeConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => TypeforgeConfig::load()?,
    };
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
        config.validate()?;
    }
    if let Command::Weights {
        format: Some(format),
        ..
    } = &cli.command
    {
        config.font_format = *format;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let api = FontApiClient::with_timeouts(
        config.api_url.clone(),
        config.connect_timeout(),
        config.request_timeout(),
    )?;
    let store = Arc::new(LocalStore::open(config.state_file.clone()));

    let (notifier, mut notifications) = Notifier::channel();
    let printer = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            eprintln!("{}", ui::format_notification(&notification));
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut app = Orchestrator::new(api, config, store, notifier);
    let result = dispatch(&mut app, cli.command, &cancel).await;
    app.close();
    drop(app);
    let _ = printer.await;
    result
}

async fn dispatch(app: &mut App, command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Generate {
            prompt,
            image,
            detach,
        } => {
            let source = match (prompt, image) {
                (Some(prompt), _) => JobSource::Prompt(prompt),
                (None, Some(path)) => read_image(&path).await?,
                (None, None) => bail!("either --prompt or --image is required"),
            };
            let job_id = app.create_job(source).await?;
            println!("Job {job_id} created");
            if !detach {
                watch(app, cancel).await?;
            }
        }
        Command::Watch { job } => {
            pick_job(app, job)?;
            watch(app, cancel).await?;
        }
        Command::Glyphs { job, text } => {
            pick_job(app, job)?;
            let source = app.refresh_inventory().await?;
            tracing::debug!(?source, "inventory source");
            let inventory = app.inventory();
            match text {
                Some(text) => {
                    let problems: String = inventory.problem_characters_in(&text).into_iter().collect();
                    if problems.is_empty() {
                        println!("Every character of the text is available");
                    } else {
                        println!("Characters needing attention: {problems}");
                    }
                }
                None => ui::print_inventory(&inventory),
            }
        }
        Command::Weights { job, weight, .. } => {
            let job_id = pick_job(app, job)?;
            let weight = weight.unwrap_or(app.config().primary_weight);
            let opened = app.open_job().await?;
            tracing::debug!(loaded = opened.fonts.results.len(), "weights requested");
            let face = app.set_weight(weight).await;
            ui::print_weights(&app.loader().snapshot(), weight, &face);
            if app.is_entitled(&job_id) {
                let url = app.api().font_url(
                    &job_id,
                    weight,
                    app.loader().format(),
                    &app.loader().cache_token(),
                );
                println!("Download: {url}");
            } else {
                println!("Downloads require a purchase (typeforge checkout {job_id} success)");
            }
        }
        Command::Regenerate { job, flag, skip } => {
            pick_job(app, job)?;
            app.refresh_inventory().await?;
            for c in flag.unwrap_or_default().chars().filter(|c| !c.is_whitespace()) {
                if !app.toggle_flag(c) {
                    tracing::warn!(character = %c, "cannot flag a missing or unknown character");
                }
            }
            for c in skip.unwrap_or_default().chars().filter(|c| !c.is_whitespace()) {
                let selected = app.inventory().get(c).is_some_and(|r| r.selected);
                if selected {
                    app.toggle_selected(c);
                }
            }
            regenerate(app, cancel).await?;
        }
        Command::Checkout { job, outcome } => {
            app.record_checkout(&job, outcome)?;
            if outcome == CheckoutOutcome::Success {
                println!("Job {job} unlocked");
            }
        }
        Command::Status => {
            let green = Style::new().green();
            println!("API: {}", app.api().base_url());
            match app.resume_last_job()? {
                Some(job_id) => {
                    let entitled = if app.is_entitled(&job_id) { "purchased" } else { "preview" };
                    println!("Job: {} ({entitled})", green.apply_to(&job_id));
                }
                None => println!("Job: none"),
            }
            let config = app.config();
            println!(
                "Weight: {} {}  poll every {}ms",
                config.primary_weight, config.font_format, config.poll_interval_ms
            );
        }
    }
    Ok(())
}

/// Select the given job, or fall back to the one recorded last session.
fn pick_job(app: &mut App, job: Option<String>) -> Result<String> {
    match job {
        Some(job_id) => {
            app.select_job(&job_id)?;
            Ok(job_id)
        }
        None => app
            .resume_last_job()?
            .context("no job given and no previous job recorded"),
    }
}

async fn read_image(path: &Path) -> Result<JobSource> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.png".to_string());
    Ok(JobSource::Image { file_name, bytes })
}

async fn watch(app: &App, cancel: &CancellationToken) -> Result<()> {
    let job_id = app.current_job().context("no job selected")?;
    let poller = app.poller();
    let mut progress = poller.subscribe();
    let bar = JobProgress::start(&format!("Waiting for job {job_id}"));

    let run = poller.run(&job_id, cancel);
    tokio::pin!(run);
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome?,
            Ok(()) = progress.changed() => bar.update(&progress.borrow_and_update()),
        }
    };
    bar.finish_poll(&outcome);

    if let PollOutcome::Completed(_) = outcome {
        let opened = app.open_job().await?;
        let loaded = app.loader().loaded_count();
        println!(
            "{loaded} of {} weights loaded, {} glyphs missing ({:?})",
            FontWeight::ALL.len(),
            app.inventory().missing().len(),
            opened.inventory_source
        );
    }
    Ok(())
}

async fn regenerate(app: &mut App, cancel: &CancellationToken) -> Result<()> {
    let mut progress = app.regeneration().subscribe_progress();
    let bar = JobProgress::start("Regenerating glyphs");

    let report = {
        let run = app.regenerate(cancel);
        tokio::pin!(run);
        loop {
            tokio::select! {
                report = &mut run => break report,
                Ok(()) = progress.changed() => bar.set_percent(*progress.borrow_and_update()),
            }
        }
    };
    let report = match report {
        Ok(report) => report,
        Err(err) => {
            bar.clear();
            return Err(err.into());
        }
    };
    bar.finish_regeneration(&report);
    report.into_result()?;
    Ok(())
}
