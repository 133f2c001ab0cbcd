use crate::domain::{AlertType, CaseType};
use crate::labels::{alert_type_label, case_type_label, label_for_code};
use crate::models::{Alert, Case};

const SUBJECT_SUMMARY_CHARS: usize = 100;

/// Body of an automatically created due-date alert.
pub fn due_alert_message(case: &Case, days_until_due: i64) -> String {
    format!(
        "El caso {} vence en {} días ({}). Recurrente: {}",
        case.rol,
        days_until_due,
        case.due_on.format("%d/%m/%Y"),
        case.claimant
    )
}

/// Description of the movement recorded when a case is opened.
pub fn case_created_movement(case: &Case) -> String {
    let summary: String = case.subject.chars().take(SUBJECT_SUMMARY_CHARS).collect();
    format!(
        "Caso creado: {} - {}",
        label_for_code::<CaseType, _>(&case.case_type, case_type_label),
        summary
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn render_alert_email(
    alert: &Alert,
    case: &Case,
    days_until_due: i64,
    public_base_url: Option<&str>,
) -> RenderedEmail {
    let type_label = label_for_code::<AlertType, _>(&alert.alert_type, alert_type_label);
    let subject = format!("Alerta: {} - {}", type_label, case.rol);
    let case_url = public_base_url.map(|base| format!("{base}/cases/{}", case.id));
    let due = case.due_on.format("%d/%m/%Y").to_string();

    let mut text = format!(
        "{type_label}\n\n{}\n\nCaso: {}\nRecurrente: {}\nMateria: {}\nVencimiento: {} ({} días)\n",
        alert.message, case.rol, case.claimant, case.subject, due, days_until_due
    );
    if let Some(url) = &case_url {
        text.push_str(&format!("\nVer caso: {url}\n"));
    }

    let mut html = format!(
        "<h2>{}</h2>\n<p>{}</p>\n<ul>\n<li><strong>Caso:</strong> {}</li>\n\
         <li><strong>Recurrente:</strong> {}</li>\n<li><strong>Materia:</strong> {}</li>\n\
         <li><strong>Vencimiento:</strong> {} ({} días)</li>\n</ul>\n",
        escape_html(type_label),
        escape_html(&alert.message),
        escape_html(&case.rol),
        escape_html(&case.claimant),
        escape_html(&case.subject),
        due,
        days_until_due
    );
    if let Some(url) = &case_url {
        html.push_str(&format!(
            "<p><a href=\"{0}\">{0}</a></p>\n",
            escape_html(url)
        ));
    }

    RenderedEmail {
        subject,
        html,
        text,
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
