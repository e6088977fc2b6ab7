//! Compass Replay — drives the journey trigger engine against a page
//! snapshot from the command line.
//!
//! Loads a trigger table and a `{url, dom}` page fixture, replays the given
//! clicks and prints the steps recorded as triggered. Running again with the
//! same storage directory behaves like a page reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use compass_core::config::AppConfig;
use compass_journey::{run, run_with_client, EngineSettings, RunProps, Triggers};
use compass_query::MatchPolicy;
use compass_reporter::{DryRunReporter, ReporterConfig, StepReporter};
use compass_web_sdk::{FileStorage, Page, PageFixture, Selector, Storage};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "compass-replay")]
#[command(about = "Replay page loads and clicks through the journey trigger engine")]
#[command(version)]
struct Cli {
    /// Trigger table exported by the journey builder (JSON)
    #[arg(long)]
    triggers: PathBuf,

    /// Page fixture with `url` and `dom` (JSON)
    #[arg(long)]
    page: PathBuf,

    /// Click the first element matching this selector; repeatable
    #[arg(long = "click")]
    clicks: Vec<String>,

    /// Conversation whose triggered steps are tracked
    #[arg(long, env = "COMPASS__CONVERSATION_ID", default_value = "")]
    conversation_id: String,

    /// Directory for persisted triggered steps (overrides config)
    #[arg(long, env = "COMPASS__STORAGE__DIR")]
    storage_dir: Option<PathBuf>,

    /// Log steps instead of sending them to the tracking backend
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compass=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(dir) = &cli.storage_dir {
        config.storage.dir = dir.display().to_string();
    }

    let triggers_raw = std::fs::read_to_string(&cli.triggers)
        .with_context(|| format!("reading trigger table {}", cli.triggers.display()))?;
    let triggers = Triggers::from_json(&triggers_raw).context("parsing trigger table")?;

    let page_raw = std::fs::read_to_string(&cli.page)
        .with_context(|| format!("reading page fixture {}", cli.page.display()))?;
    let fixture: PageFixture = serde_json::from_str(&page_raw).context("parsing page fixture")?;

    let storage: Arc<dyn Storage> = Arc::new(
        FileStorage::open(&config.storage.dir)
            .with_context(|| format!("opening storage dir {}", config.storage.dir))?,
    );
    let page = Page::from_fixture(&fixture, storage)?;

    info!(
        url = %page.location.href(),
        triggers = triggers.len(),
        clicks = cli.clicks.len(),
        storage_dir = %config.storage.dir,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    let reporter = ReporterConfig {
        api_key: config.reporter.api_key.clone(),
        workspace_id: config.reporter.workspace_id.clone(),
        conversation_id: cli.conversation_id.clone(),
        journey_id: config.reporter.journey_id.clone(),
        language_code: config.reporter.language_code.clone(),
        debug: config.reporter.debug,
        api_url: config.reporter.api_url.clone(),
    };
    let settings = EngineSettings {
        match_policy: MatchPolicy::new(
            config.matcher.attempts,
            Duration::from_millis(config.matcher.interval_ms),
        ),
        ..EngineSettings::default()
    };
    let props = RunProps::new(reporter, triggers)
        .with_settings(settings)
        .on_digression(|_client| warn!("Page is outside the journey"));

    let output = if cli.dry_run {
        let client: Arc<dyn StepReporter> = Arc::new(DryRunReporter);
        run_with_client(props, &page, client)?
    } else {
        run(props, &page)?
    };

    for source in &cli.clicks {
        let selector = Selector::parse(source)?;
        match page.document.read(|tree| selector.query_all(tree).first().copied()) {
            Some(target) => page.document.dispatch_click(target).await,
            None => warn!(selector = %source, "Nothing to click"),
        }
    }

    output.settle().await;
    output.teardown();

    println!("{}", serde_json::to_string(&output.triggered_steps())?);
    Ok(())
}
