// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Child process execution for the CLI collaborators.

use crate::error::{AirliftError, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished child process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args...` to completion, optionally feeding `stdin`.
///
/// The child is killed if the returned future is dropped before it finishes.
/// A non-zero exit is not an error here; see [`run_checked`].
pub async fn run(program: &str, args: &[String], stdin: Option<&str>) -> Result<ProcessOutput> {
    debug!("Running {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AirliftError::ConfigError(format!("{} not found in PATH", program))
            }
            _ => AirliftError::IoError(e),
        })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await?;
        // Closing the pipe signals EOF to the child
        drop(pipe);
    }

    let output = child.wait_with_output().await?;
    Ok(ProcessOutput {
        success: output.status.success(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Like [`run`], but a non-zero exit becomes [`AirliftError::CommandFailed`]
pub async fn run_checked(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
) -> Result<ProcessOutput> {
    let output = run(program, args, stdin).await?;
    if output.success {
        Ok(output)
    } else {
        Err(AirliftError::CommandFailed {
            program: program.to_string(),
            args: args.join(" "),
            status: output.status,
            stderr: output.stderr,
        })
    }
}

/// Build an owned argument vector from string slices
pub fn args<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
