//! Syslog channel (POSIX): emit to the system log daemon at a fixed
//! facility/priority appropriate for an alarm notification.

#[cfg(unix)]
pub fn send(message: &str) -> anyhow::Result<()> {
    use ::syslog::{Facility, Formatter3164};

    let formatter = Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "tempest-bridge".into(),
        pid: std::process::id(),
    };

    let mut writer =
        ::syslog::unix(formatter).map_err(|e| anyhow::anyhow!("syslog connection failed: {e}"))?;
    writer
        .notice(message.to_string())
        .map_err(|e| anyhow::anyhow!("syslog send failed: {e}"))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn send(_message: &str) -> anyhow::Result<()> {
    Err(anyhow::anyhow!("syslog is only available on POSIX platforms"))
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(unix))]
    fn unsupported_on_non_unix() {
        assert!(super::send("hello").is_err());
    }
}
