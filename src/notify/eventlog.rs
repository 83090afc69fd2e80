//! Windows Event Log channel: emit under an application-specific source.
//! Compiled out on non-Windows targets; calling it there is a fatal
//! notifier error rather than a silent no-op.

#[cfg(windows)]
pub fn send(message: &str) -> anyhow::Result<()> {
    use eventlog::{register, Level};

    const SOURCE: &str = "TempestBridge";
    let _ = register(SOURCE);
    eventlog::log(SOURCE, Level::Warning, 1, message)
        .map_err(|e| anyhow::anyhow!("event log write failed: {e}"))
}

#[cfg(not(windows))]
pub fn send(_message: &str) -> anyhow::Result<()> {
    Err(anyhow::anyhow!(
        "eventlog channel is only available on Windows"
    ))
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(windows))]
    fn unsupported_off_windows() {
        assert!(super::send("hello").is_err());
    }
}
