use reqwest::Client;
use serde::Serialize;

/// Outbound transactional mail.
#[axum::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), String>;

    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), String> {
        let html = format!(
            r#"<div style="font-family: sans-serif; max-width: 400px; margin: 0 auto;">
            <h2 style="color: #2563eb;">SportMap</h2>
            <p>Votre code de validation :</p>
            <div style="font-size: 32px; font-weight: bold; text-align: center; letter-spacing: 4px;">{code}</div>
            </div>"#
        );
        let text = format!("Votre code de validation : {code}");

        self.send_email(to, "Votre code de validation SportMap", &html, &text).await
    }

    async fn send_password_reset_link(&self, to: &str, link: &str) -> Result<(), String> {
        let html = format!(
            r#"<div style="font-family: sans-serif; max-width: 400px; margin: 0 auto;">
            <h2 style="color: #2563eb;">Réinitialisation de mot de passe</h2>
            <p><a href="{link}">Réinitialiser mon mot de passe</a></p>
            <p style="font-size: 12px; color: #64748b;">Ce lien expire dans 1 heure.</p>
            </div>"#
        );
        let text = format!("Lien de réinitialisation : {link}");

        self.send_email(to, "Réinitialisation de votre mot de passe SportMap", &html, &text).await
    }
}

#[derive(Clone)]
pub struct BrevoClient {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct Contact {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoRequest {
    sender: Contact,
    to: Vec<Contact>,
    subject: String,
    html_content: String,
    text_content: String,
}

impl BrevoClient {
    pub fn new(api_key: &str, from_email: &str, from_name: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        }
    }
}

#[axum::async_trait]
impl Mailer for BrevoClient {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), String> {
        let request = BrevoRequest {
            sender: Contact {
                email: self.from_email.clone(),
                name: Some(self.from_name.clone()),
            },
            to: vec![Contact {
                email: to.to_string(),
                name: to.split('@').next().map(str::to_string),
            }],
            subject: subject.to_string(),
            html_content: html.to_string(),
            text_content: text.to_string(),
        };

        let response = self.client
            .post("https://api.brevo.com/v3/smtp/email")
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("email send failed: {e}"))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("email API error: {body}"));
        }

        tracing::debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brevo_payload_uses_camel_case_fields() {
        let request = BrevoRequest {
            sender: Contact { email: "noreply@sportmap.fr".into(), name: Some("SportMap".into()) },
            to: vec![Contact { email: "jo@example.com".into(), name: None }],
            subject: "s".into(),
            html_content: "<p>h</p>".into(),
            text_content: "t".into(),
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["htmlContent"], "<p>h</p>");
        assert_eq!(value["textContent"], "t");
        assert_eq!(value["sender"]["name"], "SportMap");
        assert!(value["to"][0].get("name").is_none());
    }
}
