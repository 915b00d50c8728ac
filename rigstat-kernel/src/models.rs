/**
 * MODÈLES - Payload d'ingestion et enregistrement canonique d'un reporter
 *
 * RÔLE : Décoder le JSON non fiable envoyé par les rigs en un candidat typé
 * (champs optionnels), puis le valider avant de construire un `Report`.
 * Un candidat rejeté ne touche jamais au registre.
 */

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Dernier état connu d'un reporter, tel que servi par /api/stats.
/// L'identifiant (wallet) est la clé du registre, il n'est pas répété ici.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterRecord {
    pub cpu_usage: f64,
    pub uptime: u64,
    pub client_timestamp: i64,
    pub server_timestamp: i64, // seule référence pour la fraîcheur
}

/// Rapport validé, prêt pour `ReporterRegistry::ingest`.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub identifier: String,
    pub cpu_usage: f64,
    pub uptime: u64,
    pub client_timestamp: i64,
}

impl Report {
    pub fn into_record(self, server_timestamp: i64) -> (String, ReporterRecord) {
        let record = ReporterRecord {
            cpu_usage: self.cpu_usage,
            uptime: self.uptime,
            client_timestamp: self.client_timestamp,
            server_timestamp,
        };
        (self.identifier, record)
    }
}

/// Valeur brute d'un champ : nombre, texte, ou n'importe quoi d'autre.
/// `Other` absorbe les types inattendus pour que le décodage de l'objet
/// ne plante pas et que la validation puisse répondre "bad type".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64), // essayé avant Number pour garder les entiers exacts
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

// POST / — payload envoyé par les rigs
#[derive(Debug, Default, Deserialize)]
pub struct StatsIn {
    pub wallet: Option<RawValue>,
    pub cpu_usage: Option<RawValue>,
    pub uptime: Option<RawValue>,
    pub timestamp: Option<RawValue>,
}

impl StatsIn {
    /// Décode le corps d'une requête. Corps vide, `null`, `{}` ou non-objet
    /// → `NoData` ; JSON illisible → `Malformed`.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ValidationError::NoData);
        }
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        if !matches!(&value, serde_json::Value::Object(map) if !map.is_empty()) {
            return Err(ValidationError::NoData);
        }
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Présence d'abord (wallet puis les trois champs numériques), types ensuite.
    pub fn validate(self) -> Result<Report, ValidationError> {
        let identifier = match self.wallet {
            None => return Err(ValidationError::MissingWallet),
            Some(RawValue::Text(s)) if s.is_empty() => return Err(ValidationError::MissingWallet),
            Some(RawValue::Text(s)) => Ok(s),
            Some(_) => Err(ValidationError::BadType { field: "wallet" }),
        };

        let cpu_usage = self.cpu_usage.ok_or(ValidationError::MissingField { field: "cpu_usage" })?;
        let uptime = self.uptime.ok_or(ValidationError::MissingField { field: "uptime" })?;
        let timestamp = self.timestamp.ok_or(ValidationError::MissingField { field: "timestamp" })?;

        let identifier = identifier?;
        let cpu_usage = to_float(&cpu_usage).ok_or(ValidationError::BadType { field: "cpu_usage" })?;
        let uptime = to_uptime(&uptime).ok_or(ValidationError::BadType { field: "uptime" })?;
        let client_timestamp = to_int(&timestamp).ok_or(ValidationError::BadType { field: "timestamp" })?;

        Ok(Report { identifier, cpu_usage, uptime, client_timestamp })
    }
}

fn to_float(raw: &RawValue) -> Option<f64> {
    let v = match raw {
        RawValue::Int(i) => *i as f64,
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        RawValue::Other(_) => return None,
    };
    v.is_finite().then_some(v)
}

// Les flottants sont tronqués vers zéro ; le texte doit être un entier.
fn to_int(raw: &RawValue) -> Option<i64> {
    match raw {
        RawValue::Int(i) => Some(*i),
        RawValue::Number(n) => {
            let t = n.trunc();
            (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
        }
        RawValue::Text(s) => s.trim().parse::<i64>().ok(),
        RawValue::Other(_) => None,
    }
}

// Toute valeur source négative est refusée, même -0.9 qui tronquerait à 0.
fn to_uptime(raw: &RawValue) -> Option<u64> {
    match raw {
        RawValue::Int(i) => u64::try_from(*i).ok(),
        RawValue::Number(n) => {
            let t = n.trunc();
            (n.is_finite() && *n >= 0.0 && t < u64::MAX as f64).then_some(t as u64)
        }
        RawValue::Text(s) => s.trim().parse::<u64>().ok(),
        RawValue::Other(_) => None,
    }
}
