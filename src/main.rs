use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use outreach_pilot::args::CommonArgs;
use outreach_pilot::bridge::StatusView;
use outreach_pilot::config::Config;
use outreach_pilot::control_plane::{ControlPlane, HttpControlPlane};
use outreach_pilot::logging::{self, LogConfig};
use outreach_pilot::store::TaskStore;
use outreach_pilot::tasks::{self, ResponseReport, ResponseStatus};

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "outreach-pilot",
    version,
    about = "Paced, single-flight outreach automation engine"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the engine: poll, open pages, run automations, report outcomes
    Run,
    /// Show the queue and campaign counters
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the activity log, newest first
    Logs {
        /// Maximum number of entries
        #[arg(long, short = 'n', default_value_t = 50)]
        limit: usize,
    },
    /// Empty the activity log
    ClearLogs,
    /// Ask a running engine to check for tasks now
    Check,
    /// Forward an out-of-band response status to the control plane
    Respond {
        #[arg(long, value_name = "ID")]
        campaign: String,
        /// Campaign container (sheet) id
        #[arg(long, value_name = "ID")]
        container: String,
        /// Target profile URL
        #[arg(long, value_name = "URL")]
        url: String,
        #[arg(long, value_enum)]
        status: ResponseStatus,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tasks::init_color(cli.common.no_color);
    logging::init(if cli.common.verbose {
        LogConfig::debug()
    } else {
        LogConfig::from_env()
    });

    let config_path = cli.common.config_path();
    let mut config = Config::load(config_path.clone()).context("Failed to load configuration")?;
    cli.common.apply_overrides(&mut config);

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Status { json } => status(&config, json).await,
        Commands::Logs { limit } => {
            let store = open_store(&config)?;
            let entries = store.logs().await?;
            if entries.is_empty() {
                println!("{}", "No activity yet".dimmed());
            }
            for entry in entries.iter().take(limit) {
                println!("{}", tasks::format_log_line(entry));
            }
            Ok(())
        }
        Commands::ClearLogs => {
            open_store(&config)?.clear_logs().await?;
            println!("{} Activity log cleared", "✓".green());
            Ok(())
        }
        Commands::Check => check(&config).await,
        Commands::Respond {
            campaign,
            container,
            url,
            status,
        } => {
            let report = ResponseReport {
                campaign_id: campaign,
                campaign_sheet_id: container,
                profile_url: url,
                response_status: status,
            };
            respond(&config, report).await
        }
        Commands::InitConfig { force } => {
            let path = config_path.unwrap_or_else(|| config.settings_dir.join("config.toml"));
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let written = Config::default()
                .save(Some(path))
                .context("Failed to write configuration")?;
            println!("{} Wrote {}", "✓".green(), written.display());
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<TaskStore> {
    let path = config.store_path();
    TaskStore::open(&path, config.queue.log_capacity)
        .with_context(|| format!("Failed to open store at {}", path.display()))
}

async fn status(config: &Config, json: bool) -> Result<()> {
    let state = open_store(config)?.snapshot().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&StatusView::from(&state))?);
        return Ok(());
    }
    print!(
        "{}",
        tasks::format_queue_summary(
            state.current_task.as_ref(),
            state.pending_tasks.len(),
            &state.campaign_stats,
        )
    );
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    let url = format!("http://{}/bridge/check", config.dashboard.bind);
    let response = reqwest::Client::new()
        .post(&url)
        .timeout(config.dashboard.ack_timeout * 2)
        .send()
        .await
        .with_context(|| format!("No engine answering on {}", config.dashboard.bind))?;
    let body: serde_json::Value = response.json().await.context("Malformed bridge reply")?;
    match body["type"].as_str() {
        Some("EXTENSION_CHECK_TRIGGERED") => {
            println!("{} Check triggered", "✓".green());
            Ok(())
        }
        _ => bail!("Engine did not acknowledge the check in time"),
    }
}

async fn respond(config: &Config, report: ResponseReport) -> Result<()> {
    let plane = HttpControlPlane::new(&config.control_plane)?;
    plane
        .report_response(&report)
        .await
        .context("Failed to update response status")?;

    let status = report.response_status;
    let campaign = report.campaign_id.clone();
    open_store(config)?
        .update(move |s| {
            s.campaign_stats
                .entry(campaign)
                .or_default()
                .apply_response(status);
        })
        .await?;
    println!("{} Response recorded for {}", "✓".green(), report.profile_url);
    Ok(())
}

#[cfg(feature = "browser")]
async fn run(config: Config) -> Result<()> {
    use outreach_pilot::Controller;
    use std::sync::Arc;
    use outreach_pilot::bridge::{DashboardState, dashboard};
    use outreach_pilot::page::chrome::ChromeHost;
    use tokio_util::sync::CancellationToken;

    let store = open_store(&config)?;
    let plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(&config.control_plane)?);
    if let Err(e) = plane.health().await {
        eprintln!("{} Control plane not reachable yet: {}", "⚠".yellow(), e);
    }
    let host = Arc::new(
        ChromeHost::launch(&config.browser)
            .await
            .context("Failed to launch browser")?,
    );

    let controller = Controller::new(store.clone(), plane, host.clone(), &config);
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_for_signal.cancel();
    });
    #[cfg(unix)]
    {
        let cancel_for_term = cancel.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
                cancel_for_term.cancel();
            }
        });
    }

    let dashboard_task = if config.dashboard.enabled {
        let state = DashboardState {
            store,
            controller: controller.sender(),
            ack_timeout: config.dashboard.ack_timeout,
        };
        let settings = config.dashboard.clone();
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            dashboard::serve(&settings, state, cancel).await
        }))
    } else {
        None
    };

    println!(
        "{} Engine running against {} (Ctrl+C to stop)",
        "✓".green(),
        config.control_plane.base_url
    );
    let result = controller.run(cancel.clone()).await;
    cancel.cancel();
    if let Some(task) = dashboard_task {
        if let Err(e) = task.await? {
            eprintln!("{} Dashboard bridge: {}", "⚠".yellow(), e);
        }
    }
    host.shutdown().await?;
    result?;
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn run(_config: Config) -> Result<()> {
    bail!("`run` needs a browser host; rebuild with `--features browser`")
}
