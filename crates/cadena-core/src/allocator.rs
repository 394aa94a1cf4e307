//! Asignador de membresías: encuentra o crea el grupo abierto de la
//! duración del plan y admite al usuario, sin posición todavía.

use cadena_domain::{Group, GroupStatus, Membership, Plan};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::PlanCatalog;
use crate::errors::CoreError;
use crate::store::CircleStore;

/// Resultado sincrónico de un alta: el grupo asignado y la posición, que
/// queda nula hasta el sorteo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupJoinResult {
    pub group_id: Uuid,
    pub position: Option<i32>,
}

/// Admite a `user_id` en un grupo de la duración del plan.
///
/// Política de empaquetado: a lo sumo un grupo en formación por duración;
/// se llena y se sella antes de abrir otro. Todo ocurre en una transacción
/// bajo el lock del grupo candidato, de modo que dos altas simultáneas
/// nunca observen ambas `count == duration - 1` y desborden la capacidad.
///
/// # Errores
/// - `PlanNotFound` si el plan no existe o está inactivo.
/// - `AlreadyMember` si el usuario ya tiene una membresía activa; nunca se
///   reutiliza la vieja en silencio.
/// - `CapacityExceeded` (defensivo) si el conteo bajo lock ya alcanzó la
///   capacidad: se reporta, no se recorta.
pub fn join<S, C>(store: &S, catalog: &C, user_id: Uuid, plan_id: Uuid) -> Result<GroupJoinResult, CoreError>
    where S: CircleStore,
          C: PlanCatalog
{
    let plan: Plan = catalog.active_plan(plan_id)?.ok_or(CoreError::PlanNotFound(plan_id))?;
    store.transaction(|tx| {
             if let Some(existing) = tx.active_membership_of_user(user_id)? {
                 return Err(CoreError::AlreadyMember { user_id, group_id: existing.group_id() });
             }

             let mut group = match tx.lock_forming_group(plan.duration_cycles())? {
                 Some(g) => g,
                 None => {
                     let g = Group::new(plan.duration_cycles(), plan.price_cents())?;
                     tx.insert_group(&g)?;
                     debug!("join: grupo nuevo {} para duración {}", g.id(), g.duration_cycles());
                     g
                 }
             };

             let count_before = tx.member_count(group.id())?;
             if count_before >= group.duration_cycles() as i64 {
                 return Err(CoreError::CapacityExceeded(group.id()));
             }

             let membership = Membership::new(user_id, group.id());
             tx.insert_membership(&membership)?;

             // sellar en la misma transacción si el alta completó la capacidad
             if count_before + 1 == group.duration_cycles() as i64 {
                 group.seal()?;
                 tx.update_group(&group)?;
                 debug!("join: grupo {} sellado ({} miembros)", group.id(), group.duration_cycles());
             }

             Ok(GroupJoinResult { group_id: group.id(), position: None })
         })
}

/// Baja voluntaria: solo mientras el grupo sigue en formación. Una vez
/// sellado o sorteado, la membresía queda comprometida con la rotación.
pub fn leave<S>(store: &S, user_id: Uuid, group_id: Uuid) -> Result<(), CoreError>
    where S: CircleStore
{
    store.transaction(|tx| {
             let group = tx.lock_group(group_id)?.ok_or(CoreError::GroupNotFound(group_id))?;
             if group.status() != GroupStatus::Forming {
                 return Err(CoreError::InvalidGroupState { required: GroupStatus::Forming,
                                                           found: group.status() });
             }
             let membership = tx.memberships_of_group(group_id)?
                                .into_iter()
                                .find(|m| m.user_id() == user_id)
                                .ok_or(CoreError::NotMember { user_id, group_id })?;
             tx.delete_membership(membership.id())?;
             debug!("leave: usuario {user_id} fuera del grupo {group_id}");
             Ok(())
         })
}
