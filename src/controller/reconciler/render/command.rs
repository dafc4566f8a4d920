//! External process invocation shared by git, helm and kustomize.

use super::RenderError;
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

/// stderr longer than this is cut from the front; the tail carries the error
const MAX_STDERR_CHARS: usize = 2048;

/// Failures worth retrying: network, rate limiting, upstream unavailability
static TRANSIENT_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(timed? ?out|deadline exceeded|connection (refused|reset|closed)|temporary failure|try again|no such host|could not resolve host|network is unreachable|tls handshake|unexpected eof|early eof|\b(429|500|502|503|504)\b|too many requests|rate limit|service unavailable|bad gateway)",
    )
    .expect("Failed to compile TRANSIENT_FAILURE pattern - this should never happen")
});

/// Classify a failed command's stderr as transient or terminal
pub fn classify_failure(what: &str, stderr: &str) -> RenderError {
    let message = format!("{what} failed: {}", tail(stderr.trim()));
    if TRANSIENT_FAILURE.is_match(stderr) {
        RenderError::Transient(message)
    } else {
        RenderError::Terminal(message)
    }
}

/// Run a command to completion and return its stdout
///
/// The child is killed if the timeout elapses or the calling future is dropped.
pub(crate) async fn run_command(
    mut command: Command,
    timeout: Duration,
    what: &str,
) -> Result<Vec<u8>, RenderError> {
    command
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RenderError::terminal(format!("{what}: executable not found: {e}"))
        } else {
            RenderError::transient(format!("{what}: failed to start: {e}"))
        }
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => Err(RenderError::transient(format!(
            "{what} timed out after {}s",
            timeout.as_secs()
        ))),
        Ok(Err(e)) => Err(RenderError::transient(format!("{what}: {e}"))),
        Ok(Ok(output)) if output.status.success() => Ok(output.stdout),
        Ok(Ok(output)) => Err(classify_failure(
            what,
            &String::from_utf8_lossy(&output.stderr),
        )),
    }
}

fn tail(text: &str) -> &str {
    let count = text.chars().count();
    if count <= MAX_STDERR_CHARS {
        return text;
    }
    let skip = count - MAX_STDERR_CHARS;
    text.char_indices().nth(skip).map_or(text, |(idx, _)| &text[idx..])
}
