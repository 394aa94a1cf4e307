//! Conciliador de pagos: traduce aprobaciones del flujo externo de pagos a
//! aportes confirmados. Es el único camino hacia `Confirmed`.

use cadena_domain::{Contribution, ContributionStatus};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::store::CircleStore;

/// Pago aprobado por el flujo externo de revisión de comprobantes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedPayment {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub period: String,
    pub amount_cents: i64,
}

/// Concilia una aprobación con su aporte.
///
/// - `Pending` o `Rejected` pasa a `Confirmed` con hora de liquidación (la
///   aprobación es la señal de mayor prioridad).
/// - `Confirmed` se devuelve tal cual: re-aprobar es idempotente.
/// - Sin fila previa (la aprobación ganó la carrera a la siembra del
///   planificador) se inserta directamente como `Confirmed`, sin pasar por
///   `Pending`: la aprobación no puede perderse.
pub fn confirm_payment<S>(store: &S, payment: ApprovedPayment) -> Result<Contribution, CoreError>
    where S: CircleStore
{
    store.transaction(|tx| {
             // bajo el lock del grupo: una conciliación que inserta no debe
             // correr a la par de la siembra del planificador
             tx.lock_group(payment.group_id)?.ok_or(CoreError::GroupNotFound(payment.group_id))?;
             match tx.find_contribution(payment.user_id, payment.group_id, &payment.period)? {
                 Some(contribution) if contribution.status() == ContributionStatus::Confirmed => Ok(contribution),
                 Some(mut contribution) => {
                     contribution.confirm(Utc::now())?;
                     tx.update_contribution(&contribution)?;
                     debug!("confirm_payment: aporte {} confirmado", contribution.id());
                     Ok(contribution)
                 }
                 None => {
                     let contribution = Contribution::new_confirmed(payment.user_id,
                                                                    payment.group_id,
                                                                    payment.period.clone(),
                                                                    payment.amount_cents,
                                                                    Utc::now())?;
                     tx.insert_contribution(&contribution)?;
                     debug!("confirm_payment: aprobación adelantada a la siembra, aporte {} nace confirmado",
                            contribution.id());
                     Ok(contribution)
                 }
             }
         })
}

/// Rechaza el aporte pendiente de un período. Rechazar un aporte ya
/// confirmado es una transición inválida y se reporta.
pub fn reject_payment<S>(store: &S, user_id: Uuid, group_id: Uuid, period: &str) -> Result<Contribution, CoreError>
    where S: CircleStore
{
    store.transaction(|tx| {
             let mut contribution =
                 tx.find_contribution(user_id, group_id, period)?
                   .ok_or_else(|| CoreError::ContributionNotFound { user_id,
                                                                    group_id,
                                                                    period: period.to_string() })?;
             if contribution.status() == ContributionStatus::Rejected {
                 return Ok(contribution);
             }
             contribution.reject()?;
             tx.update_contribution(&contribution)?;
             Ok(contribution)
         })
}
