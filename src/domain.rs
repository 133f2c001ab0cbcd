//! Tagged values stored as short uppercase codes in the database.
//!
//! Display labels are not part of these types; see [`crate::labels`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub const ROLE_STAFF: &str = "staff";
pub const ROLE_USER: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCode {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownCode {}

macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:tt {
            $($variant:ident => $code:tt),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $code)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownCode;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_uppercase();
                match normalized.as_str() {
                    $($code => Ok($name::$variant),)+
                    _ => Err(UnknownCode {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

coded_enum! {
    /// Kind of legal remedy a case was filed as.
    CaseType, "case type" {
        Amparo => "AMPARO",
        Proteccion => "PROTECCION",
        Cde => "CDE",
    }
}

coded_enum! {
    CaseStatus, "case status" {
        InProcess => "EN_TRAMITACION",
        Closed => "CERRADO",
        Suspended => "SUSPENDIDO",
        OnAppeal => "EN_APELACION",
    }
}

coded_enum! {
    Tribunal, "tribunal" {
        CorteApelacionesSantiago => "CORTE_APELACIONES_SANTIAGO",
        CorteApelacionesValparaiso => "CORTE_APELACIONES_VALPARAISO",
        CorteApelacionesConcepcion => "CORTE_APELACIONES_CONCEPCION",
        CorteSuprema => "CORTE_SUPREMA",
        TribunalConstitucional => "TRIBUNAL_CONSTITUCIONAL",
        Contraloria => "CONTRALORIA",
        Otro => "OTRO",
    }
}

coded_enum! {
    AlertType, "alert type" {
        Vencimiento => "VENCIMIENTO",
        Audiencia => "AUDIENCIA",
        Seguimiento => "SEGUIMIENTO",
        Notificacion => "NOTIFICACION",
    }
}

impl Default for CaseStatus {
    fn default() -> Self {
        CaseStatus::InProcess
    }
}

impl Default for AlertType {
    fn default() -> Self {
        AlertType::Vencimiento
    }
}

pub fn is_staff_role(role: &str) -> bool {
    role == ROLE_STAFF
}
