use std::path::{Path, PathBuf};

use app::consumer::ConsumerManager;
use app::sync::{ExecutorSettings, ScratchSpace, SyncExecutor, SyncOrchestrator};
use storage::{parse_storage_uri, ProviderConfig, StorageError};
use tokio::sync::watch;
use utils::app_config::AppConfig;
use utils::error::{Error, Result};

use crate::SyncArgs;

pub async fn sync_cmd(args: &SyncArgs, log_level: Option<&str>) -> Result<()> {
    AppConfig::merge_config(args.config.as_deref())?;
    apply_overrides(args, log_level)?;

    // 日志级别可能被命令行覆盖，因此在合并配置之后初始化
    let _guard = utils::logger::setup_logging()?;

    let config = AppConfig::fetch()?;
    let source = resolve_location("source", args.source.as_deref(), config.source)?;
    let destination =
        resolve_location("destination", args.destination.as_deref(), config.destination)?;

    let scratch = match &config.sync.scratch_dir {
        Some(dir) => ScratchSpace::new(dir)?,
        None => ScratchSpace::in_temp_dir()?,
    };
    log::debug!("Scratch directory: {}", scratch.root().display());

    // Ctrl-C: 停止分发新的传输，进行中的传输继续完成
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, finishing in-flight transfers");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut consumer_manager = ConsumerManager::new();
    let handles = consumer_manager.start_consumers().await?;

    let executor = SyncExecutor::new(scratch)
        .with_settings(ExecutorSettings::from(&config.sync))
        .with_shutdown(shutdown_rx);
    let orchestrator = SyncOrchestrator::new(executor)
        .with_prefix(config.sync.prefix.clone())
        .with_events(consumer_manager.get_broadcaster());

    log::info!("Starting sync operation...");
    let outcome = if config.sync.dry_run {
        orchestrator
            .preview(&source, &destination)
            .await
            .map(|plan| {
                println!("Dry run, nothing will be copied:\n{}", plan);
                if let Some(path) = &args.report {
                    write_report(path, plan.to_json());
                }
            })
    } else {
        orchestrator
            .run(&source, &destination)
            .await
            .map(|result| report_result(args.report.as_ref(), &result))
    };

    consumer_manager.shutdown().await?;
    for handle in handles {
        match handle.await {
            Ok(Err(e)) => log::warn!("Consumer finished with error: {}", e),
            Err(e) => log::warn!("Consumer task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    outcome.map_err(|e| Error::with_source("Sync failed", Box::new(e)))?;
    log::info!("Sync operation completed");
    Ok(())
}

fn apply_overrides(args: &SyncArgs, log_level: Option<&str>) -> Result<()> {
    if args.verbose {
        AppConfig::set("log.level", "debug")?;
    } else if let Some(level) = log_level {
        AppConfig::set("log.level", level)?;
    }
    if let Some(prefix) = &args.prefix {
        AppConfig::set("sync.prefix", prefix)?;
    }
    if let Some(concurrency) = args.concurrency {
        AppConfig::set("sync.concurrency", &concurrency.to_string())?;
    }
    if let Some(retries) = args.retries {
        AppConfig::set("sync.max_retries", &retries.to_string())?;
    }
    if let Some(dir) = &args.scratch_dir {
        AppConfig::set("sync.scratch_dir", &dir.to_string_lossy())?;
    }
    if args.dry_run {
        AppConfig::set("sync.dry_run", "true")?;
    }
    Ok(())
}

/// 命令行位置优先于配置文件中的同名段
fn resolve_location(
    side: &str, uri: Option<&str>, configured: Option<ProviderConfig>,
) -> Result<ProviderConfig> {
    match (uri, configured) {
        (Some(uri), _) => parse_storage_uri(uri).map_err(|e: StorageError| {
            Error::with_source(format!("Invalid --{} '{}'", side, uri), Box::new(e))
        }),
        (None, Some(configured)) => Ok(configured),
        (None, None) => Err(Error::new(format!(
            "No {} configured; pass --{} or add a [{}] section to the config file",
            side, side, side
        ))),
    }
}

fn report_result(report: Option<&PathBuf>, result: &app::sync::SyncResult) {
    log::info!("Sync result: {}", result);
    for (path, failure) in &result.failed {
        log::warn!("Not synced: {} {}", path, failure);
    }

    if let Some(path) = report {
        write_report(path, result.to_json());
    }
}

/// 报告写入失败只记录日志，不影响同步结果
fn write_report<E: std::fmt::Display>(path: &Path, json: std::result::Result<String, E>) {
    let written = json
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => log::info!("Report written to {}", path.display()),
        Err(e) => log::error!("Failed to write report {}: {}", path.display(), e),
    }
}
