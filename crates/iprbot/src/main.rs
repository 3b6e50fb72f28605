//! iprbot - Main entry point

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use iprbot::{pipeline, BotConfig, Cli, Commands, RunOptions};
use iprbot_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use iprbot_wikibase::HttpKnowledgeBase;
use std::process;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("iprbot")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().merge_env() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("Ignoring invalid logging environment: {:#}", e);
            log_config
        },
    };

    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    let mut config = BotConfig::from_env();

    match &cli.command {
        Commands::Run {
            release,
            source,
            no_write,
            run_one,
            skip_cleanup,
            log_dir,
            run_id,
            cleanup_delay_secs,
        } => {
            source.apply(&mut config);
            if let Some(secs) = cleanup_delay_secs {
                config.cleanup_delay_secs = *secs;
            }
            config.validate().map_err(|e| anyhow!(e))?;

            let kb = HttpKnowledgeBase::new(config.client_config())
                .context("Failed to build HTTP client")?;
            let write = !*no_write;
            if write {
                let (user, pass) = config
                    .credentials()
                    .context("WDUSER and WDPASS must be set unless --no-write is given")?;
                kb.login(user, pass).await.context("Login failed")?;
            }

            let options = RunOptions {
                release: release.clone(),
                taxon: source.taxon.clone(),
                write,
                run_one: *run_one,
                skip_cleanup: *skip_cleanup,
                log_dir: log_dir.clone(),
                run_id: run_id.clone(),
                source_path: config.source_path.clone(),
                cache_dir: config.cache_dir.clone(),
                chunk_size: config.chunk_size,
                cleanup_delay: Duration::from_secs(config.cleanup_delay_secs),
            };

            let report = pipeline::run(&kb, &options).await?;
            info!(
                log = %report.log_path.display(),
                touched = report.batch.touched.len(),
                errors = report.batch.errors.len(),
                "Done"
            );
            Ok(())
        },

        Commands::BuildCache { source } => {
            source.apply(&mut config);
            config.validate().map_err(|e| anyhow!(e))?;

            let kb = HttpKnowledgeBase::new(config.client_config())
                .context("Failed to build HTTP client")?;

            let path = pipeline::build_cache(
                &kb,
                source.taxon.as_ref(),
                &config.source_path,
                &config.cache_dir,
                config.chunk_size,
            )
            .await?;
            info!(path = %path.display(), "Cache file ready");
            Ok(())
        },
    }
}
