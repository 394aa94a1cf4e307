//! Planificador de rotación: avanza el ciclo de un grupo corriendo, crea la
//! entrega del turno y siembra las obligaciones de aporte del período.

use cadena_domain::{cycle_label, Contribution, ContributionStatus, Delivery, Group, GroupStatus};
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::store::{CircleStore, StoreTx};

/// Resultado de un avance de ciclo. Cuando `completed` es verdadero el
/// ciclo no avanzó: el grupo pasó a `Completed` y `new_cycle` repite el
/// ciclo final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleAdvance {
    pub group_id: Uuid,
    pub previous_cycle: i32,
    pub new_cycle: i32,
    pub completed: bool,
}

/// Resumen de una corrida por lotes sobre todos los grupos corriendo.
#[derive(Debug, Default)]
pub struct PeriodReport {
    pub advanced: Vec<CycleAdvance>,
    pub failures: Vec<(Uuid, CoreError)>,
}

/// Estado de las obligaciones de un período, para decidir si el ciclo quedó
/// cubierto antes de avanzar el siguiente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodObligations {
    pub group_id: Uuid,
    pub period: String,
    pub confirmed: usize,
    pub pending: usize,
    pub rejected: usize,
}

impl PeriodObligations {
    /// Todas las obligaciones sembradas están liquidadas.
    pub fn settled(&self) -> bool {
        self.pending == 0 && self.rejected == 0 && self.confirmed > 0
    }
}

/// Avanza el ciclo del grupo en una transacción bajo su lock de fila.
///
/// Pasos:
/// 1. `new_cycle = current_cycle + 1`.
/// 2. Si `new_cycle > duration_cycles`: `Running -> Completed`; no se crea
///    entrega ni se siembran aportes.
/// 3. Si no: entrega `Pending` para la membresía con `position == new_cycle`
///    y siembra idempotente de un aporte `Pending` por miembro para el
///    período (re-ejecutar el mismo período no duplica obligaciones).
///
/// El avance de un grupo nunca corre en paralelo consigo mismo (lock de
/// fila); grupos distintos avanzan de forma independiente.
pub fn advance_cycle<S>(store: &S, group_id: Uuid) -> Result<CycleAdvance, CoreError>
    where S: CircleStore
{
    store.transaction(|tx| {
        let mut group = tx.lock_group(group_id)?.ok_or(CoreError::GroupNotFound(group_id))?;
        if group.status() != GroupStatus::Running {
            return Err(CoreError::InvalidGroupState { required: GroupStatus::Running,
                                                      found: group.status() });
        }

        let previous = group.current_cycle();
        let new_cycle = previous + 1;

        if new_cycle > group.duration_cycles() {
            group.complete(Utc::now())?;
            tx.update_group(&group)?;
            debug!("advance_cycle: grupo {group_id} completado tras el ciclo {previous}");
            return Ok(CycleAdvance { group_id,
                                     previous_cycle: previous,
                                     new_cycle: previous,
                                     completed: true });
        }

        open_period(tx, &group, new_cycle)?;

        group.advance_to(new_cycle)?;
        tx.update_group(&group)?;
        Ok(CycleAdvance { group_id,
                          previous_cycle: previous,
                          new_cycle,
                          completed: false })
    })
}

/// Abre las obligaciones de un ciclo: la entrega `Pending` para la
/// membresía con `position == cycle` y un aporte `Pending` por miembro,
/// ambos idempotentes (una fila ya existente para el período no se
/// duplica). Lo invoca el avance de ciclo en cada período y el sorteo para
/// el primer ciclo, siempre dentro de la transacción dueña del lock del
/// grupo.
pub(crate) fn open_period(tx: &mut dyn StoreTx, group: &Group, cycle: i32) -> Result<(), CoreError> {
    let label = cycle_label(cycle);
    let members = tx.memberships_of_group(group.id())?;

    // entrega para quien tiene el turno de este ciclo
    if let Some(recipient) = members.iter().find(|m| m.position() == Some(cycle)) {
        if tx.find_delivery(group.id(), &label)?.is_none() {
            let delivery = Delivery::new(recipient.user_id(), group.id(), label.clone())?;
            tx.insert_delivery(&delivery)?;
            debug!("open_period: entrega {} para usuario {} ({label})",
                   delivery.id(),
                   recipient.user_id());
        }
    }

    // siembra idempotente de obligaciones del período
    for member in &members {
        if tx.find_contribution(member.user_id(), group.id(), &label)?.is_none() {
            let contribution =
                Contribution::new(member.user_id(), group.id(), label.clone(), group.contribution_cents())?;
            tx.insert_contribution(&contribution)?;
        }
    }
    Ok(())
}

/// Corrida por lotes: un período para todos los grupos corriendo. Cada
/// grupo avanza en su propia transacción; el fallo de uno se recolecta y no
/// aborta a los demás.
pub fn run_period<S>(store: &S) -> Result<PeriodReport, CoreError>
    where S: CircleStore
{
    let ids = store.transaction(|tx| tx.running_group_ids())?;
    let mut report = PeriodReport::default();
    for group_id in ids {
        match advance_cycle(store, group_id) {
            Ok(advance) => report.advanced.push(advance),
            Err(e) => {
                warn!("run_period: grupo {group_id} omitido: {e}");
                report.failures.push((group_id, e));
            }
        }
    }
    Ok(report)
}

/// Marca como entregada la entrega de un ciclo. La confirma el flujo
/// administrativo una vez realizado el despacho físico.
pub fn fulfill_delivery<S>(store: &S, group_id: Uuid, cycle: i32) -> Result<Delivery, CoreError>
    where S: CircleStore
{
    let label = cycle_label(cycle);
    store.transaction(|tx| {
             tx.lock_group(group_id)?.ok_or(CoreError::GroupNotFound(group_id))?;
             let mut delivery = tx.find_delivery(group_id, &label)?
                                  .ok_or_else(|| CoreError::DeliveryNotFound { group_id,
                                                                               cycle_label: label.clone() })?;
             delivery.fulfill()?;
             tx.update_delivery(&delivery)?;
             debug!("fulfill_delivery: {} entregada ({label})", delivery.id());
             Ok(delivery)
         })
}

/// Consulta el estado de las obligaciones de un ciclo ya abierto.
pub fn period_obligations<S>(store: &S, group_id: Uuid, cycle: i32) -> Result<PeriodObligations, CoreError>
    where S: CircleStore
{
    let period = cycle_label(cycle);
    store.transaction(|tx| {
             tx.find_group(group_id)?.ok_or(CoreError::GroupNotFound(group_id))?;
             let rows = tx.contributions_of_period(group_id, &period)?;
             let mut obligations = PeriodObligations { group_id,
                                                       period: period.clone(),
                                                       confirmed: 0,
                                                       pending: 0,
                                                       rejected: 0 };
             for c in rows {
                 match c.status() {
                     ContributionStatus::Confirmed => obligations.confirmed += 1,
                     ContributionStatus::Pending => obligations.pending += 1,
                     ContributionStatus::Rejected => obligations.rejected += 1,
                 }
             }
             Ok(obligations)
         })
}
