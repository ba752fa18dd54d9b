//! Child-side companion of `mpispawn`.
//!
//! Runs its arguments as a command with inherited stdio and exits with the
//! command's exit code, which is what the parent's gather collects.
use anyhow::Context;
use mpispawn_exec::util::exit_code;
use mpispawn_model::SpawnEnv;
use mpispawn_observe::{LoggerConfig, logger_init};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mpispawn-wrapper: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    logger_init(&LoggerConfig::from_env()?)?;

    let mut argv = std::env::args().skip(1);
    let program = argv
        .next()
        .context("usage: mpispawn-wrapper <command> [args...]")?;
    let args: Vec<String> = argv.collect();

    let job = std::env::var(SpawnEnv::JOB_ID).ok();
    let rank = std::env::var(SpawnEnv::RANK).ok();
    trace!(target: "mpispawn.wrapper", %program, ?args, ?job, ?rank, "starting");

    let child = Command::new(&program)
        .args(&args)
        .spawn()
        .with_context(|| format!("failed to execute {program}"))?;
    let code = wait_forwarding(child).await?;

    match job {
        Some(job) => {
            debug!(target: "mpispawn.wrapper", %job, ?rank, code, "reporting exit code to parent")
        }
        None => debug!(target: "mpispawn.wrapper", code, "no parent group"),
    }
    Ok(code)
}

/// Waits for `child`, passing a SIGTERM sent to the wrapper on to it.
#[cfg(unix)]
async fn wait_forwarding(mut child: Child) -> anyhow::Result<i32> {
    use mpispawn_exec::util::kill_graceful;
    use tokio::signal::unix::{SignalKind, signal};

    const GRACE: std::time::Duration = std::time::Duration::from_secs(5);

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        status = child.wait() => Ok(exit_code(status?)),
        _ = term.recv() => {
            debug!(target: "mpispawn.wrapper", "terminated; stopping child");
            kill_graceful(&mut child, GRACE).await?;
            Ok(exit_code(child.wait().await?))
        }
    }
}

#[cfg(not(unix))]
async fn wait_forwarding(mut child: Child) -> anyhow::Result<i32> {
    Ok(exit_code(child.wait().await?))
}
