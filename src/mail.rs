//! Outbound mail for password resets.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{error, warn};

use crate::config::MailConfig;

pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    base_url: String,
}

impl Mailer {
    /// Build from optional mail settings. A missing or unbuildable transport
    /// leaves the mailer disabled rather than failing startup; callers see
    /// that through `is_configured`.
    pub fn from_config(mail: Option<&MailConfig>, base_url: &str) -> Self {
        let (transport, from) = match mail {
            Some(cfg) => {
                let builder = if cfg.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.server)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                        &cfg.server,
                    ))
                };
                match builder {
                    Ok(builder) => {
                        let transport = builder
                            .port(cfg.port)
                            .credentials(Credentials::new(
                                cfg.username.clone(),
                                cfg.password.clone(),
                            ))
                            .build();
                        (Some(transport), cfg.username.clone())
                    }
                    Err(e) => {
                        warn!("mail transport unavailable ({e}); password reset mail disabled");
                        (None, String::new())
                    }
                }
            }
            None => (None, String::new()),
        };
        Self {
            transport,
            from,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// A mailer that never sends. Used where reset mail is irrelevant.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: String::new(),
            base_url: String::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    /// Send the reset link for `token` to `to`. Errors if the mailer is
    /// disabled or the SMTP send fails.
    pub async fn send_reset_email(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("mail transport not configured"))?;
        let reset_url = format!("{}/reset_password/{}", self.base_url, token);
        let body = format!(
            "To reset your password, visit the following link:\n\n{reset_url}\n\n\
             The link expires in one hour. If you did not request a password reset, \
             simply ignore this email and nothing will change."
        );
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject("Password Reset Request")
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;
        if let Err(e) = transport.send(message).await {
            error!("reset mail to {to} failed: {e}");
            return Err(e.into());
        }
        Ok(())
    }
}
