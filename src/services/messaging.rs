//! Messaging Port
//!
//! Templated SMS/WhatsApp notifications in the user's language.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

use crate::domain::Language;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Whatsapp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKey {
    Otp,
    PaymentReminder,
    LoanApproved,
}

/// Fill a message template. `params` are positional, in template order.
pub fn render_template(key: TemplateKey, params: &[String], language: Language) -> String {
    let get = |i: usize| params.get(i).map(String::as_str).unwrap_or("");
    match (key, language) {
        (TemplateKey::Otp, Language::Hi) => {
            format!("आपका OTP है {}। 10 मिनट में समाप्त हो जाएगा।", get(0))
        }
        (TemplateKey::Otp, Language::Ml) => {
            format!("നിങ്ങളുടെ OTP: {}. 10 മിനിറ്റിനുള്ളിൽ കാലഹരണപ്പെടും.", get(0))
        }
        (TemplateKey::Otp, Language::En) => {
            format!("Your OTP is {}. It expires in 10 minutes.", get(0))
        }
        (TemplateKey::PaymentReminder, Language::Hi) => {
            format!("याद दिलाना: आपकी ₹{} की EMI {} को देय है।", get(0), get(1))
        }
        (TemplateKey::PaymentReminder, Language::Ml) => {
            format!("ഓർമ്മപ്പെടുത്തൽ: ₹{} EMI {} ന് അടയ്ക്കണം.", get(0), get(1))
        }
        (TemplateKey::PaymentReminder, Language::En) => {
            format!("Reminder: your EMI of ₹{} is due on {}.", get(0), get(1))
        }
        (TemplateKey::LoanApproved, Language::Hi) => {
            format!("बधाई हो! आपका ₹{} का लोन मंज़ूर हो गया है।", get(0))
        }
        (TemplateKey::LoanApproved, Language::Ml) => {
            format!("അഭിനന്ദനങ്ങൾ! നിങ്ങളുടെ ₹{} വായ്പ അംഗീകരിച്ചു.", get(0))
        }
        (TemplateKey::LoanApproved, Language::En) => {
            format!("Congratulations! Your loan of ₹{} has been approved.", get(0))
        }
    }
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Send a templated message; returns the provider message id.
    async fn send_templated(
        &self,
        channel: Channel,
        phone: &str,
        key: TemplateKey,
        params: &[String],
        language: Language,
    ) -> Result<String, EngineError>;
}

/// Twilio-backed messaging client.
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        }
    }
}

#[async_trait]
impl MessagingClient for TwilioClient {
    async fn send_templated(
        &self,
        channel: Channel,
        phone: &str,
        key: TemplateKey,
        params: &[String],
        language: Language,
    ) -> Result<String, EngineError> {
        let body = render_template(key, params, language);
        let (from, to) = match channel {
            Channel::Sms => (self.from_number.clone(), phone.to_string()),
            Channel::Whatsapp => (
                format!("whatsapp:{}", self.from_number),
                format!("whatsapp:{phone}"),
            ),
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(Duration::from_secs(15))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", body.as_str())])
            .send()
            .await
            .map_err(|e| EngineError::DependencyFailure {
                name: "messaging",
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(EngineError::DependencyFailure {
                name: "messaging",
                reason: format!("provider returned {}", response.status()),
            });
        }
        let data: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| EngineError::DependencyFailure {
                    name: "messaging",
                    reason: e.to_string(),
                })?;
        Ok(data["sid"].as_str().unwrap_or_default().to_string())
    }
}

/// Logs instead of sending. Used when messaging credentials are absent.
pub struct NullMessaging;

#[async_trait]
impl MessagingClient for NullMessaging {
    async fn send_templated(
        &self,
        _channel: Channel,
        phone: &str,
        key: TemplateKey,
        params: &[String],
        language: Language,
    ) -> Result<String, EngineError> {
        info!(
            phone,
            "messaging not configured, would send: {}",
            render_template(key, params, language)
        );
        Ok("null-message".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_substitute_params() {
        let msg = render_template(
            TemplateKey::LoanApproved,
            &["5000".to_string()],
            Language::En,
        );
        assert!(msg.contains("₹5000"));

        let hi = render_template(
            TemplateKey::PaymentReminder,
            &["550".to_string(), "Friday".to_string()],
            Language::Hi,
        );
        assert!(hi.contains("₹550"));
        assert!(hi.contains("Friday"));
    }

    #[test]
    fn test_missing_params_render_empty() {
        let msg = render_template(TemplateKey::Otp, &[], Language::En);
        assert!(msg.contains("OTP"));
    }
}
