//! Email channel: Microsoft Graph `sendMail` over OAuth2 client-credentials
//! when configured and selected, otherwise SMTP (with optional STARTTLS),
//! per spec §4.5.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, TokenResponse, TokenUrl};

use crate::alarm::config::{EmailChannelDetail, EmailSettings};

const GRAPH_TIMEOUT_SECS: u64 = 10;
const SMTP_TIMEOUT_SECS: u64 = 10;

pub async fn send(
    settings: Option<&EmailSettings>,
    detail: &EmailChannelDetail,
    subject: &str,
    body: &str,
) -> anyhow::Result<()> {
    let settings = settings.ok_or_else(|| anyhow::anyhow!("no email settings configured"))?;

    if settings.use_oauth2 {
        send_via_graph(settings, detail, subject, body).await
    } else {
        send_via_smtp(settings, detail, subject, body).await
    }
}

async fn acquire_graph_token(settings: &EmailSettings) -> anyhow::Result<String> {
    let client_id = settings
        .client_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("oauth2 email requires client_id"))?;
    let client_secret = settings
        .client_secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("oauth2 email requires client_secret"))?;
    let tenant_id = settings
        .tenant_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("oauth2 email requires tenant_id"))?;

    let token_url = TokenUrl::new(format!(
        "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token"
    ))?;
    let auth_url = AuthUrl::new(format!(
        "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/authorize"
    ))?;

    let client = BasicClient::new(
        ClientId::new(client_id),
        Some(ClientSecret::new(client_secret)),
        auth_url,
        Some(token_url),
    );

    let token = tokio::time::timeout(
        std::time::Duration::from_secs(GRAPH_TIMEOUT_SECS),
        client
            .exchange_client_credentials()
            .add_scope(oauth2::Scope::new(
                "https://graph.microsoft.com/.default".to_string(),
            ))
            .request_async(oauth2::reqwest::async_http_client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("oauth2 token request timed out"))?
    .map_err(|e| anyhow::anyhow!("oauth2 token request failed: {e}"))?;

    Ok(token.access_token().secret().clone())
}

async fn send_via_graph(
    settings: &EmailSettings,
    detail: &EmailChannelDetail,
    subject: &str,
    body: &str,
) -> anyhow::Result<()> {
    let token = acquire_graph_token(settings).await?;
    let from = settings
        .from_address
        .clone()
        .ok_or_else(|| anyhow::anyhow!("oauth2 email requires from_address"))?;

    let payload = serde_json::json!({
        "message": {
            "subject": subject,
            "body": { "contentType": "Text", "content": body },
            "toRecipients": detail.to.iter().map(|addr| serde_json::json!({"emailAddress": {"address": addr}})).collect::<Vec<_>>(),
            "ccRecipients": detail.cc.iter().map(|addr| serde_json::json!({"emailAddress": {"address": addr}})).collect::<Vec<_>>(),
        },
        "saveToSentItems": "false",
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!(
            "https://graph.microsoft.com/v1.0/users/{from}/sendMail"
        ))
        .bearer_auth(token)
        .json(&payload)
        .timeout(std::time::Duration::from_secs(GRAPH_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("graph sendMail request failed: {e}"))?;

    if !response.status().is_success() {
        anyhow::bail!("graph sendMail returned {}", response.status());
    }
    Ok(())
}

async fn send_via_smtp(
    settings: &EmailSettings,
    detail: &EmailChannelDetail,
    subject: &str,
    body: &str,
) -> anyhow::Result<()> {
    let host = settings
        .smtp_host
        .clone()
        .ok_or_else(|| anyhow::anyhow!("smtp email requires smtp_host"))?;
    let from_address = settings
        .from_address
        .clone()
        .ok_or_else(|| anyhow::anyhow!("smtp email requires from_address"))?;
    let from_name = settings.from_name.clone().unwrap_or_default();

    let from_mailbox: Mailbox = if from_name.is_empty() {
        from_address.parse()?
    } else {
        format!("{from_name} <{from_address}>").parse()?
    };

    let mut builder = Message::builder().from(from_mailbox).subject(subject);
    for to in &detail.to {
        builder = builder.to(to.parse()?);
    }
    for cc in &detail.cc {
        builder = builder.cc(cc.parse()?);
    }
    let message = builder.body(body.to_string())?;

    let mut transport_builder = if settings.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
    };

    if let Some(port) = settings.smtp_port {
        transport_builder = transport_builder.port(port);
    }
    if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
        transport_builder =
            transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    let transport = transport_builder
        .timeout(Some(std::time::Duration::from_secs(SMTP_TIMEOUT_SECS)))
        .build();

    transport
        .send(message)
        .await
        .map_err(|e| anyhow::anyhow!("smtp send failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_settings_is_an_error() {
        let detail = EmailChannelDetail {
            to: vec!["a@example.com".to_string()],
            cc: vec![],
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        let result = send(None, &detail, "s", "b").await;
        assert!(result.is_err());
    }
}
