use std::sync::Arc;

use mpispawn_core::{
    Action, Orchestrator, Runtime, SpawnOptions, interpret, plan::render_commands, render_help,
    resolve::UNIVERSE_ENV,
};
use mpispawn_exec::LocalRuntime;
use mpispawn_observe::logger_init;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod config;
use config::AppConfig;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(target: "mpispawn", error = %format!("{e:#}"), "fatal");
            eprintln!("mpispawn: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    // 1) Config + logger
    let cfg = AppConfig::from_env()?;
    logger_init(&cfg.logger)?;
    debug!(
        target: "mpispawn",
        wrapper = %cfg.wrapper.program,
        timeout = ?cfg.gather_timeout,
        "configured"
    );

    // 2) Runtime
    let runtime = Arc::new(LocalRuntime::from_env()?);
    info!(
        target: "mpispawn",
        backend = runtime.name(),
        size = runtime.world_size(),
        rank = runtime.rank(),
        "runtime ready"
    );

    // 3) Command line
    let argv: Vec<String> = std::env::args().collect();
    let env_universe = std::env::var(UNIVERSE_ENV).ok();
    let plan = match interpret(&argv, runtime.world_size(), env_universe.as_deref())? {
        Action::Help => {
            print!("{}", render_help());
            return Ok(0);
        }
        Action::PrintCommands(plan) => {
            for line in render_commands(&plan) {
                println!("{line}");
            }
            return Ok(0);
        }
        Action::CheckSpawn(plan) | Action::Launch(plan) => plan,
    };

    // 4) Spawn, with Ctrl+C aborting any pending gather
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(target: "mpispawn", "interrupted; cancelling");
                cancel.cancel();
            }
        }
    });

    let options = SpawnOptions {
        wrapper: cfg.wrapper,
        gather_timeout: cfg.gather_timeout,
    };
    let result = Orchestrator::new(runtime, options)
        .with_cancel(cancel)
        .run(&plan)
        .await;
    watcher.abort();

    let result = result?;
    debug!(target: "mpispawn", status = result.status, propagate = result.propagate, "done");
    Ok(result.exit_status())
}
