//! SMS channel: POST the templated message to a configured SMS gateway,
//! per spec §4.5.

use crate::alarm::config::{SmsChannelDetail, SmsSettings};

const SMS_TIMEOUT_SECS: u64 = 10;

pub async fn send(
    settings: Option<&SmsSettings>,
    detail: &SmsChannelDetail,
    message: &str,
) -> anyhow::Result<()> {
    let settings = settings.ok_or_else(|| anyhow::anyhow!("no sms settings configured"))?;
    let api_key = settings
        .api_key
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("sms gateway requires api_key"))?;

    let client = reqwest::Client::new();
    let payload = serde_json::json!({
        "from": settings.from,
        "to": detail.to,
        "message": message,
    });

    let response = client
        .post("https://api.sms-gateway.example/v1/messages")
        .bearer_auth(api_key)
        .json(&payload)
        .timeout(std::time::Duration::from_secs(SMS_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("sms gateway request failed: {e}"))?;

    if !response.status().is_success() {
        anyhow::bail!("sms gateway returned {}", response.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_settings_is_an_error() {
        let detail = SmsChannelDetail {
            to: vec!["+15551234567".to_string()],
            message: "hi".to_string(),
        };
        let result = send(None, &detail, "hi").await;
        assert!(result.is_err());
    }
}
