use crate::commands::load_catalog;
use crate::providers::sim_registry;
use anyhow::Context as _;
use colored::Colorize;
use driftwood_config::{Settings, parse_duration};
use driftwood_controller::{Context, ControllerManager};
use driftwood_store::{ResourceStore, StateFile};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct RunArgs {
    pub catalog: PathBuf,
    pub manifests: Option<PathBuf>,
    pub state: Option<PathBuf>,
    pub workers: Option<usize>,
    pub resync: Option<String>,
}

pub async fn handle(args: RunArgs) -> anyhow::Result<()> {
    let mut settings =
        driftwood_config::load_settings().context("driftwood.kdl の読み込みに失敗しました")?;
    apply_overrides(&mut settings, &args)?;

    let catalog = load_catalog(&args.catalog)?;
    let store = ResourceStore::new();

    let state_file = args
        .state
        .clone()
        .or_else(|| settings.store.snapshot.clone())
        .map(StateFile::new);
    if let Some(state_file) = &state_file {
        restore(&store, state_file, settings.store.startup_grace).await?;
    }

    if let Some(path) = &args.manifests {
        let resources = driftwood_core::load_manifests(path)
            .with_context(|| format!("マニフェストを読み込めません: {}", path.display()))?;
        let count = resources.len();
        for resource in resources {
            let key = resource.key();
            store
                .apply(resource)
                .await
                .with_context(|| format!("{} を適用できません", key))?;
        }
        println!("{} {}個のマニフェストを適用", "✓".green(), count);
    }

    let registry = sim_registry(&catalog)?;
    let ctx = Context::new(store.clone(), registry, catalog, settings.controller);
    let manager = ControllerManager::new(ctx);

    println!(
        "{} {}",
        "▶ コントローラーを起動:".cyan().bold(),
        manager.kinds().collect::<Vec<_>>().join(", ")
    );
    println!("{}", "  Ctrl-C で停止します".dimmed());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    manager.run(shutdown_rx).await;

    if let Some(state_file) = &state_file {
        let snapshot = store.snapshot().await;
        let count = snapshot.resources.len();
        state_file
            .save(&snapshot)
            .await
            .with_context(|| format!("状態を保存できません: {}", state_file.path().display()))?;
        println!(
            "{} {}個のリソースを保存: {}",
            "✓".green(),
            count,
            state_file.path().display().to_string().cyan()
        );
    }

    println!("{}", "✓ 停止しました".green().bold());
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(workers) = args.workers {
        anyhow::ensure!(workers > 0, "--workers は1以上を指定してください");
        settings.controller.workers = workers;
    }
    if let Some(resync) = &args.resync {
        let interval = parse_duration(resync)?;
        anyhow::ensure!(!interval.is_zero(), "--resync は0より大きい値を指定してください");
        settings.controller.resync_interval = interval;
    }
    Ok(())
}

/// スナップショットを復元する
///
/// 読み込みに失敗しても `grace` が経過するまでは再試行し、
/// それを過ぎたら起動を中止する。
async fn restore(store: &ResourceStore, state_file: &StateFile, grace: Duration) -> anyhow::Result<()> {
    let started = Instant::now();
    loop {
        match state_file.load().await {
            Ok(Some(snapshot)) => {
                let count = snapshot.resources.len();
                store.restore(snapshot).await.context("状態を復元できません")?;
                println!(
                    "{} {}個のリソースを復元: {}",
                    "✓".green(),
                    count,
                    state_file.path().display().to_string().cyan()
                );
                return Ok(());
            }
            Ok(None) => {
                info!(path = %state_file.path().display(), "No snapshot yet, starting empty");
                return Ok(());
            }
            Err(e) if started.elapsed() < grace => {
                warn!(error = %e, path = %state_file.path().display(), "Snapshot unreadable, retrying");
                let remaining = grace.saturating_sub(started.elapsed());
                tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("状態を読み込めません: {}", state_file.path().display())
                });
            }
        }
    }
}
