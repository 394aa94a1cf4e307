use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;
use std::fmt;
use uuid::Uuid;

/// Estado de un aporte mensual.
///
/// Transiciones válidas:
/// - `Pending` -> `Confirmed` (conciliación de un pago aprobado)
/// - `Pending` -> `Rejected` (pago rechazado)
/// - `Rejected` -> `Confirmed` (re-aprobación; la aprobación manda)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ContributionStatus {
    pub fn allows(self, next: ContributionStatus) -> bool {
        matches!((self, next),
                 (ContributionStatus::Pending, ContributionStatus::Confirmed)
                 | (ContributionStatus::Pending, ContributionStatus::Rejected)
                 | (ContributionStatus::Rejected, ContributionStatus::Confirmed))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContributionStatus::Pending => "pending",
            ContributionStatus::Confirmed => "confirmed",
            ContributionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(ContributionStatus::Pending),
            "confirmed" => Ok(ContributionStatus::Confirmed),
            "rejected" => Ok(ContributionStatus::Rejected),
            other => Err(DomainError::Validation(format!("estado de aporte desconocido: {other}"))),
        }
    }
}

impl fmt::Display for ContributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Obligación de aporte de un miembro para un período. El planificador las
/// siembra en bloque como `Pending`; solo el conciliador de pagos escribe
/// `Confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    id: Uuid,
    user_id: Uuid,
    group_id: Uuid,
    period: String,
    amount_cents: i64,
    status: ContributionStatus,
    settled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Contribution {
    pub fn new(user_id: Uuid, group_id: Uuid, period: impl Into<String>, amount_cents: i64) -> Result<Self, DomainError> {
        Self::build(user_id, group_id, period, amount_cents, ContributionStatus::Pending, None)
    }

    /// Aporte nacido confirmado: la aprobación llegó antes de la siembra del
    /// período y no debe perderse.
    pub fn new_confirmed(user_id: Uuid,
                         group_id: Uuid,
                         period: impl Into<String>,
                         amount_cents: i64,
                         settled_at: DateTime<Utc>)
                         -> Result<Self, DomainError> {
        Self::build(user_id, group_id, period, amount_cents, ContributionStatus::Confirmed, Some(settled_at))
    }

    fn build(user_id: Uuid,
             group_id: Uuid,
             period: impl Into<String>,
             amount_cents: i64,
             status: ContributionStatus,
             settled_at: Option<DateTime<Utc>>)
             -> Result<Self, DomainError> {
        let period = period.into();
        if amount_cents <= 0 {
            return Err(DomainError::Validation(format!("monto de aporte inválido: {amount_cents}")));
        }
        if period.trim().is_empty() {
            return Err(DomainError::Validation("período de aporte vacío".to_string()));
        }
        Ok(Contribution { id: Uuid::new_v4(),
                          user_id,
                          group_id,
                          period,
                          amount_cents,
                          status,
                          settled_at,
                          created_at: Utc::now() })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(id: Uuid,
                   user_id: Uuid,
                   group_id: Uuid,
                   period: String,
                   amount_cents: i64,
                   status: ContributionStatus,
                   settled_at: Option<DateTime<Utc>>,
                   created_at: DateTime<Utc>)
                   -> Result<Self, DomainError> {
        let mut c = Self::build(user_id, group_id, period, amount_cents, status, settled_at)?;
        c.id = id;
        c.created_at = created_at;
        Ok(c)
    }

    fn transition(&mut self, next: ContributionStatus) -> Result<(), DomainError> {
        if !self.status.allows(next) {
            return Err(DomainError::InvalidTransition { entity: "contribution",
                                                        from: self.status.as_str(),
                                                        to: next.as_str() });
        }
        self.status = next;
        Ok(())
    }

    /// Liquida el aporte con la hora de aprobación.
    pub fn confirm(&mut self, settled_at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ContributionStatus::Confirmed)?;
        self.settled_at = Some(settled_at);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), DomainError> {
        self.transition(ContributionStatus::Rejected)
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn amount_cents(&self) -> i64 {
        self.amount_cents
    }

    pub fn status(&self) -> ContributionStatus {
        self.status
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
