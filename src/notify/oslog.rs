//! macOS unified log channel: emit under a stable subsystem/category.
//! Compiled out on non-macOS targets.

#[cfg(target_os = "macos")]
pub fn send(message: &str) -> anyhow::Result<()> {
    use oslog::OsLog;

    let logger = OsLog::new("com.tempest-bridge", "alarm");
    logger.with_level(oslog::Level::Error, message);
    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub fn send(_message: &str) -> anyhow::Result<()> {
    Err(anyhow::anyhow!("oslog channel is only available on macOS"))
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_os = "macos"))]
    fn unsupported_off_macos() {
        assert!(super::send("hello").is_err());
    }
}
