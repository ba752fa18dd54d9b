use std::{process::ExitStatus, time::Duration};

use mpispawn_model::SpawnEnv;
use tokio::process::{Child, Command};

/// Exit code reported for a status that carries neither a code nor a signal.
pub const UNKNOWN_EXIT: i32 = 1;

pub fn cmd_program(program: &str, args: &[String], env: &SpawnEnv) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    for kv in env.iter() {
        cmd.env(kv.key(), kv.value());
    }
    cmd
}

/// Shell-style exit code: the process code, or `128 + signal` when killed.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    UNKNOWN_EXIT
}

/// SIGTERM, then SIGKILL if the child is still around after `grace`.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if let Some(id) = child.id() {
        // SAFETY: signalling a pid owned by this process; no memory is touched.
        let _ = unsafe { libc::kill(id as libc::pid_t, libc::SIGTERM) };
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return Ok(());
        }
    }
    child.kill().await
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_exit_code() {
        let status = Command::new("sh").args(["-c", "exit 7"]).status().await.unwrap();
        assert_eq!(exit_code(status), 7);
    }

    #[tokio::test]
    async fn signal_maps_to_128_plus() {
        let status = Command::new("sh")
            .args(["-c", "kill -TERM $$"])
            .status()
            .await
            .unwrap();
        assert_eq!(exit_code(status), 128 + libc::SIGTERM);
    }

    #[tokio::test]
    async fn command_carries_spawn_env() {
        let env = SpawnEnv::for_group(4, 2, 3, 2);
        let args = vec!["-c".to_string(), "exit $MPISPAWN_JOB_ID".to_string()];
        let status = cmd_program("sh", &args, &env).status().await.unwrap();
        assert_eq!(exit_code(status), 2);
    }

    #[tokio::test]
    async fn graceful_kill_stops_sleeper() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        kill_graceful(&mut child, Duration::from_secs(2)).await.unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(exit_code(status), 128 + libc::SIGTERM);
    }
}
