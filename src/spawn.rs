//! Child process spawning with an explicit stdio policy.
//!
//! Standard output is the pipeline's structured response channel, so no
//! child process may ever write to it. Instead of globally overriding a
//! spawn primitive, every call site threads a [`StdioPolicy`] value into
//! the one spawn helper here.

use std::io;
use std::process::Stdio;
use tokio::process::Command;

/// How a child process connects to the parent's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioPolicy {
    /// Pass all three handles through unchanged.
    InheritAll,
    /// Keep stdin inherited but connect both child output streams to the
    /// parent's *error* stream, leaving stdout clean for the response.
    #[default]
    RedirectStdoutToStderr,
}

/// Applies the policy to a command builder.
pub fn configure(command: &mut Command, policy: StdioPolicy) -> io::Result<()> {
    match policy {
        StdioPolicy::InheritAll => {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }
        StdioPolicy::RedirectStdoutToStderr => {
            command
                .stdin(Stdio::inherit())
                .stdout(dup_stderr()?)
                .stderr(Stdio::inherit());
        }
    }
    Ok(())
}

/// Runs a command to completion under the given policy and returns its
/// exit status.
pub async fn run(mut command: Command, policy: StdioPolicy) -> io::Result<std::process::ExitStatus> {
    configure(&mut command, policy)?;
    command.status().await
}

#[cfg(unix)]
fn dup_stderr() -> io::Result<Stdio> {
    use std::os::fd::AsFd;
    let fd = std::io::stderr().as_fd().try_clone_to_owned()?;
    Ok(Stdio::from(fd))
}

#[cfg(windows)]
fn dup_stderr() -> io::Result<Stdio> {
    use std::os::windows::io::AsHandle;
    let handle = std::io::stderr().as_handle().try_clone_to_owned()?;
    Ok(Stdio::from(handle))
}
