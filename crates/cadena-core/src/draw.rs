//! Motor de sorteo: computa la permutación final de posiciones para un
//! grupo lleno y la compromete junto con la transición `Full -> Running`.
//!
//! Separación resultado/presentación: `final_positions` se calcula una sola
//! vez con un barajado uniforme y se persiste; `reveal_sequence` es una
//! proyección con retardos crecientes que la capa de presentación puede
//! reproducir o recalcular sin tocar el resultado. La animación jamás
//! decide el orden.

use cadena_domain::{DrawSession, GroupStatus, PositionAssignment, RevealStep};
use chrono::Utc;
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::constants::{REVEAL_BASE_DELAY_MS, REVEAL_STEP_DELAY_MS};
use crate::errors::CoreError;
use crate::event::{DrawStarted, RevealChannel};
use crate::store::CircleStore;

/// Deriva el guion de revelación: la misma permutación, un paso por
/// posición, con retardo estrictamente creciente.
pub fn reveal_sequence_for(final_positions: &[PositionAssignment]) -> Vec<RevealStep> {
    final_positions.iter()
                   .enumerate()
                   .map(|(i, a)| RevealStep { position: a.position,
                                              delay_ms: REVEAL_BASE_DELAY_MS + REVEAL_STEP_DELAY_MS * i as u32 })
                   .collect()
}

/// Sortea y arranca el grupo con el RNG del sistema.
pub fn start_draw<S, C>(store: &S, channel: &C, group_id: Uuid, admin_id: Uuid) -> Result<DrawSession, CoreError>
    where S: CircleStore,
          C: RevealChannel
{
    start_draw_with_rng(store, channel, group_id, admin_id, &mut rand::thread_rng())
}

/// Variante con RNG inyectado (pruebas con semilla fija).
///
/// Una sola transacción: resultado del sorteo, posiciones de las membresías
/// y transición `Full -> Running` confirman juntos. Un crash entre medio no
/// puede dejar un grupo corriendo sin posiciones ni un sorteo comprometido
/// cuyo grupo nunca arrancó.
pub fn start_draw_with_rng<S, C, R>(store: &S,
                                    channel: &C,
                                    group_id: Uuid,
                                    admin_id: Uuid,
                                    rng: &mut R)
                                    -> Result<DrawSession, CoreError>
    where S: CircleStore,
          C: RevealChannel,
          R: Rng + ?Sized
{
    let session = store.transaction(|tx| {
        let mut group = tx.lock_group(group_id)?.ok_or(CoreError::GroupNotFound(group_id))?;
        if group.status() != GroupStatus::Full {
            return Err(CoreError::GroupNotReady(group_id));
        }
        if tx.open_draw_session(group_id)?.is_some() {
            return Err(CoreError::DrawAlreadyInProgress(group_id));
        }

        let mut members = tx.memberships_of_group(group_id)?;
        let capacity = group.duration_cycles();
        if members.len() as i32 != capacity {
            // inalcanzable con el invariante de capacidad; se reporta, no se ajusta
            return Err(CoreError::Storage(format!("grupo {} lleno con {} miembros, capacidad {}",
                                                  group_id,
                                                  members.len(),
                                                  capacity)));
        }

        // barajado Fisher-Yates insesgado de 1..=n
        let mut positions: Vec<i32> = (1..=capacity).collect();
        positions.shuffle(rng);

        let final_positions: Vec<PositionAssignment> =
            members.iter()
                   .zip(positions.iter())
                   .map(|(m, p)| PositionAssignment { user_id: m.user_id(), position: *p })
                   .collect();
        let reveal = reveal_sequence_for(&final_positions);
        let session = DrawSession::new(group_id, admin_id, final_positions, reveal)?;

        for (member, position) in members.iter_mut().zip(positions.iter()) {
            member.assign_position(*position, capacity)?;
            tx.update_membership(member)?;
        }
        tx.insert_draw_session(&session)?;

        group.start(Utc::now())?;
        tx.update_group(&group)?;

        // el sorteo abre el primer período: entrega del turno 1 y siembra
        // de aportes del ciclo 1, en la misma transacción
        crate::rotation::open_period(tx, &group, 1)?;
        debug!("start_draw: grupo {group_id} corriendo, sorteo {}", session.id());
        Ok(session)
    })?;

    // fire-and-forget: el resultado ya es durable; un fallo del canal no
    // revierte nada
    let event = DrawStarted { group_id,
                              draw_id: session.id(),
                              final_positions: session.final_positions().to_vec(),
                              reveal_sequence: session.reveal_sequence().to_vec() };
    if let Err(e) = channel.publish(&event) {
        warn!("start_draw: publicación de DrawStarted falló para {group_id}: {e}");
    }

    Ok(session)
}

/// Avanza un paso la revelación animada. Contabilidad de presentación: el
/// primer avance pasa la sesión a `InProgress`, el último a `Completed`.
pub fn advance_reveal<S>(store: &S, draw_id: Uuid) -> Result<DrawSession, CoreError>
    where S: CircleStore
{
    store.transaction(|tx| {
             let found = tx.find_draw_session(draw_id)?.ok_or(CoreError::DrawNotFound(draw_id))?;
             // disciplina de locks: la fila del grupo sincroniza también sus
             // sorteos; se relee la sesión ya bajo el lock
             tx.lock_group(found.group_id())?
               .ok_or(CoreError::GroupNotFound(found.group_id()))?;
             let mut session = tx.find_draw_session(draw_id)?.ok_or(CoreError::DrawNotFound(draw_id))?;
             session.advance_step()?;
             tx.update_draw_session(&session)?;
             Ok(session)
         })
}
