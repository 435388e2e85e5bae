use tokio::process::Child;

/// Result of asking a child to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// A kill signal was delivered and the child reaped
    Signalled,
    /// The child had already exited; nothing to do
    AlreadyExited,
}

/// Kill `child` and reap it. Safe to call any number of times.
pub async fn terminate(child: &mut Child) -> std::io::Result<TerminateOutcome> {
    if child.try_wait()?.is_some() {
        return Ok(TerminateOutcome::AlreadyExited);
    }
    match child.start_kill() {
        Ok(()) => {}
        // Exited between the check and the signal
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
            child.wait().await?;
            return Ok(TerminateOutcome::AlreadyExited);
        }
        Err(e) => return Err(e),
    }
    child.wait().await?;
    Ok(TerminateOutcome::Signalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_terminate_running_then_exited() {
        let mut child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        assert_eq!(terminate(&mut child).await.unwrap(), TerminateOutcome::Signalled);
        assert_eq!(terminate(&mut child).await.unwrap(), TerminateOutcome::AlreadyExited);
    }

    #[tokio::test]
    async fn test_terminate_naturally_exited_child() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();
        assert_eq!(terminate(&mut child).await.unwrap(), TerminateOutcome::AlreadyExited);
    }
}
