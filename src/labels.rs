//! Human-readable labels for the coded values, used by the API catalog,
//! alert emails and generated movement descriptions.

use serde::Serialize;

use crate::domain::{AlertType, CaseStatus, CaseType, Tribunal};
use crate::urgency::UrgencyTier;

pub fn case_type_label(value: CaseType) -> &'static str {
    match value {
        CaseType::Amparo => "Recurso de Amparo",
        CaseType::Proteccion => "Recurso de Protección",
        CaseType::Cde => "CDE (Contencioso Administrativo)",
    }
}

pub fn case_status_label(value: CaseStatus) -> &'static str {
    match value {
        CaseStatus::InProcess => "En Tramitación",
        CaseStatus::Closed => "Cerrado",
        CaseStatus::Suspended => "Suspendido",
        CaseStatus::OnAppeal => "En Apelación",
    }
}

pub fn tribunal_label(value: Tribunal) -> &'static str {
    match value {
        Tribunal::CorteApelacionesSantiago => "Corte de Apelaciones de Santiago",
        Tribunal::CorteApelacionesValparaiso => "Corte de Apelaciones de Valparaíso",
        Tribunal::CorteApelacionesConcepcion => "Corte de Apelaciones de Concepción",
        Tribunal::CorteSuprema => "Corte Suprema",
        Tribunal::TribunalConstitucional => "Tribunal Constitucional",
        Tribunal::Contraloria => "Contraloría General de la República",
        Tribunal::Otro => "Otro Tribunal",
    }
}

pub fn alert_type_label(value: AlertType) -> &'static str {
    match value {
        AlertType::Vencimiento => "Vencimiento de Plazo",
        AlertType::Audiencia => "Audiencia Programada",
        AlertType::Seguimiento => "Seguimiento General",
        AlertType::Notificacion => "Notificación Recibida",
    }
}

pub fn urgency_label(value: UrgencyTier) -> &'static str {
    match value {
        UrgencyTier::NoDate => "Sin fecha",
        UrgencyTier::Overdue => "Vencido",
        UrgencyTier::Critical => "Crítico",
        UrgencyTier::Warning => "Urgente",
        UrgencyTier::Normal => "Normal",
    }
}

/// Looks up the label for a stored code, falling back to the raw code when
/// the value is not recognised.
pub fn label_for_code<'a, T, F>(code: &'a str, label: F) -> &'a str
where
    T: std::str::FromStr,
    F: Fn(T) -> &'static str,
{
    code.parse::<T>().map(label).unwrap_or(code)
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub code: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub case_types: Vec<Choice>,
    pub case_statuses: Vec<Choice>,
    pub tribunals: Vec<Choice>,
    pub alert_types: Vec<Choice>,
    pub urgency_tiers: Vec<Choice>,
}

pub fn catalog() -> Catalog {
    Catalog {
        case_types: CaseType::ALL
            .iter()
            .map(|value| Choice {
                code: value.as_str(),
                label: case_type_label(*value),
            })
            .collect(),
        case_statuses: CaseStatus::ALL
            .iter()
            .map(|value| Choice {
                code: value.as_str(),
                label: case_status_label(*value),
            })
            .collect(),
        tribunals: Tribunal::ALL
            .iter()
            .map(|value| Choice {
                code: value.as_str(),
                label: tribunal_label(*value),
            })
            .collect(),
        alert_types: AlertType::ALL
            .iter()
            .map(|value| Choice {
                code: value.as_str(),
                label: alert_type_label(*value),
            })
            .collect(),
        urgency_tiers: UrgencyTier::ALL
            .iter()
            .map(|value| Choice {
                code: value.as_str(),
                label: urgency_label(*value),
            })
            .collect(),
    }
}
