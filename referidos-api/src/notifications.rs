//! Notification emails sent after a referral is stored
//!
//! Two messages: an informative one to the referred party (only when they
//! left an email) and an internal one to the operations mailbox (only when
//! configured). Each outcome is reported on its own; a failed send never
//! affects the stored referral.

use referidos_common::config::EmailSettings;
use referidos_common::Referral;
use tracing::{info, warn};

use crate::mailer::{EmailMessage, Mailer};

/// Which notifications were accepted by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub email_sent: bool,
    pub internal_email_sent: bool,
}

/// Escape text for interpolation into HTML
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

fn or_dash(value: Option<&str>) -> String {
    escape_html(value.unwrap_or("—"))
}

/// Message to the referred party
pub fn referred_message(from: &str, to: &str, referral: &Referral) -> EmailMessage {
    let referrer = referral.referrer_email.as_deref().unwrap_or("una persona");
    let html = format!(
        r#"
      <div style="font-family: Arial, sans-serif; color:#111;">
        <h2 style="margin:0 0 12px 0;">Hola {name},</h2>
        <p style="margin:0 0 12px 0;">
          {referrer} te ha referido a <strong>Verisure</strong>.
        </p>
        <p style="margin:0 0 12px 0;">
          Este es un mensaje informativo. En breve, un asesor de Verisure se pondrá en contacto contigo para continuar la atención.
        </p>
        <p style="margin:18px 0 0 0; font-size:12px; color:#666;">
          Si no esperabas este contacto, puedes ignorar este mensaje.
        </p>
        <p style="margin:10px 0 0 0; font-size:12px; color:#999;">
          © Verisure Perú
        </p>
      </div>
    "#,
        name = escape_html(&referral.referred_name),
        referrer = escape_html(referrer),
    );

    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Te han referido a Verisure".to_string(),
        html,
    }
}

/// Message to the operations mailbox with every captured field
pub fn internal_message(from: &str, to: &str, referral: &Referral) -> EmailMessage {
    let t = &referral.tracking;
    let rows: [(&str, String); 16] = [
        ("ID", escape_html(&referral.id.to_string())),
        ("Fecha", escape_html(&referral.created_at.to_rfc3339())),
        ("Referido", escape_html(&referral.referred_name)),
        ("Email referido", or_dash(referral.referred_email.as_deref())),
        ("Teléfono", escape_html(&referral.referred_phone)),
        ("Referidor (email)", or_dash(referral.referrer_email.as_deref())),
        ("Consentimiento", (if referral.consent { "Sí" } else { "No" }).to_string()),
        ("Status", referral.status.as_str().to_string()),
        ("Camp", or_dash(t.camp.as_deref())),
        ("UTM Source", or_dash(t.utm_source.as_deref())),
        ("UTM Medium", or_dash(t.utm_medium.as_deref())),
        ("UTM Campaign", or_dash(t.utm_campaign.as_deref())),
        ("UTM Term", or_dash(t.utm_term.as_deref())),
        ("UTM Content", or_dash(t.utm_content.as_deref())),
        ("Landing", or_dash(t.landing_path.as_deref())),
        ("Referer", or_dash(t.referer.as_deref())),
    ];

    let table: String = rows
        .iter()
        .map(|(label, value)| format!("<tr><td><b>{}</b></td><td>{}</td></tr>\n", label, value))
        .collect();

    let html = format!(
        r#"
        <div style="font-family: Arial, sans-serif; color:#111;">
          <h2 style="margin:0 0 12px 0;">Nuevo referido registrado</h2>
          <table cellpadding="6" cellspacing="0" style="border-collapse:collapse; font-size:14px;">
{table}          </table>
          <p style="margin:16px 0 0 0; font-size:12px; color:#666;">Enviado automáticamente desde verisure-referidos.</p>
        </div>
      "#
    );

    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!(
            "Nuevo referido: {} ({})",
            referral.referred_name, referral.referred_phone
        ),
        html,
    }
}

/// Send both notifications, capturing each failure on its own
pub async fn dispatch(
    mailer: &dyn Mailer,
    settings: &EmailSettings,
    referral: &Referral,
) -> NotificationOutcome {
    let mut outcome = NotificationOutcome::default();

    if let Some(to) = referral.referred_email.as_deref() {
        let message = referred_message(&settings.from, to, referral);
        match mailer.send(&message).await {
            Ok(()) => outcome.email_sent = true,
            Err(e) => warn!(referral_id = %referral.id, "Referred notification not sent: {}", e),
        }
    }

    if let Some(to) = settings.internal_to.as_deref() {
        let message = internal_message(&settings.from, to, referral);
        match mailer.send(&message).await {
            Ok(()) => outcome.internal_email_sent = true,
            Err(e) => warn!(referral_id = %referral.id, "Internal notification not sent: {}", e),
        }
    }

    info!(
        referral_id = %referral.id,
        email_sent = outcome.email_sent,
        internal_email_sent = outcome.internal_email_sent,
        "Notifications dispatched"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use referidos_common::{ReferralStatus, Tracking};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct Recording {
        sent: Mutex<Vec<EmailMessage>>,
        fail_to: Option<String>,
    }

    #[async_trait]
    impl Mailer for Recording {
        async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
            if self.fail_to.as_deref() == Some(message.to.as_str()) {
                return Err(MailError::Provider(500, "boom".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn referral(email: Option<&str>) -> Referral {
        Referral {
            id: Uuid::nil(),
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap(),
            status: ReferralStatus::Registered,
            referrer_user_id: None,
            referrer_email: Some("maria@example.com".into()),
            referred_name: "Ana <Lopez>".into(),
            referred_email: email.map(str::to_string),
            referred_phone: "987654321".into(),
            consent: true,
            notes: None,
            tracking: Tracking {
                camp: Some("spring".into()),
                ..Default::default()
            },
        }
    }

    fn settings(internal: Option<&str>) -> EmailSettings {
        EmailSettings {
            resend_api_key: None,
            from: "onboarding@resend.dev".into(),
            internal_to: internal.map(str::to_string),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_referred_message_escapes_name() {
        let msg = referred_message("from@x.com", "ana@example.com", &referral(Some("ana@example.com")));
        assert_eq!(msg.subject, "Te han referido a Verisure");
        assert!(msg.html.contains("Hola Ana &lt;Lopez&gt;,"));
        assert!(msg.html.contains("maria@example.com te ha referido"));
    }

    #[test]
    fn test_internal_message_lists_fields() {
        let msg = internal_message("from@x.com", "leads@x.com", &referral(None));
        assert_eq!(msg.subject, "Nuevo referido: Ana <Lopez> (987654321)");
        assert!(msg.html.contains("<tr><td><b>Email referido</b></td><td>—</td></tr>"));
        assert!(msg.html.contains("<tr><td><b>Camp</b></td><td>spring</td></tr>"));
        assert!(msg.html.contains("<tr><td><b>Status</b></td><td>registered</td></tr>"));
    }

    #[tokio::test]
    async fn test_dispatch_skips_missing_recipients() {
        let mailer = Recording { sent: Mutex::new(vec![]), fail_to: None };
        let outcome = dispatch(&mailer, &settings(None), &referral(None)).await;
        assert_eq!(outcome, NotificationOutcome::default());
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_reports_each_send() {
        let mailer = Recording {
            sent: Mutex::new(vec![]),
            fail_to: Some("ana@example.com".into()),
        };
        let outcome = dispatch(&mailer, &settings(Some("leads@x.com")), &referral(Some("ana@example.com"))).await;
        assert!(!outcome.email_sent);
        assert!(outcome.internal_email_sent);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
