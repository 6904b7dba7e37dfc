use crate::error::{Result, UpdaterError};
use tokio::process::Command;
use tracing::{error, info, warn};

/// Validates then reloads, matching the source's two-step protocol: a
/// failing validation aborts the reload and leaves the new file (and the
/// `.bak`) on disk for the operator to inspect.
pub async fn validate_and_reload(validate_command: &[String], reload_command: &[String]) -> Result<()> {
    if !run(validate_command).await? {
        error!("upstream validation command failed, aborting reload");
        return Err(UpdaterError::ValidationFailed);
    }

    if !run(reload_command).await? {
        error!("reload command failed");
        return Err(UpdaterError::ReloadFailed);
    }

    info!("reverse proxy reloaded");
    Ok(())
}

async fn run(argv: &[String]) -> Result<bool> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| UpdaterError::Config("command must not be empty".into()))?;

    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        warn!(
            command = %argv.join(" "),
            code = output.status.code().unwrap_or(-1),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "command exited with non-zero status"
        );
    }
    Ok(output.status.success())
}
