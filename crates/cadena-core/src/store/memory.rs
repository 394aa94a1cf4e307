//! Backend en memoria con paridad de comportamiento respecto al backend
//! Postgres: mismas reglas de unicidad y mismo aislamiento observable.
//!
//! Un mutex global linealiza las transacciones (equivale al lock de fila:
//! dos `join` concurrentes sobre la misma duración nunca ven el mismo
//! conteo). El rollback se implementa restaurando un snapshot del estado
//! cuando el cierre devuelve `Err`.

use cadena_domain::{Contribution, Delivery, DrawSession, Group, GroupStatus, Membership};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{CircleStore, StoreTx};
use crate::errors::CoreError;

#[derive(Default, Clone)]
struct MemState {
    groups: HashMap<Uuid, Group>,
    memberships: HashMap<Uuid, Membership>,
    draw_sessions: HashMap<Uuid, DrawSession>,
    contributions: HashMap<Uuid, Contribution>,
    deliveries: HashMap<Uuid, Delivery>,
}

/// Almacenamiento en memoria para pruebas y para el driver de escenarios.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemTx<'a> {
    state: &'a mut MemState,
}

impl CircleStore for InMemoryStore {
    fn transaction<T, F>(&self, mut f: F) -> Result<T, CoreError>
        where F: FnMut(&mut dyn StoreTx) -> Result<T, CoreError>
    {
        let mut guard = self.state
                            .lock()
                            .map_err(|_| CoreError::Storage("estado en memoria envenenado".to_string()))?;
        let snapshot = guard.clone();
        let mut tx = MemTx { state: &mut *guard };
        match f(&mut tx) {
            Ok(value) => Ok(value),
            Err(e) => {
                *guard = snapshot;
                Err(e)
            }
        }
    }
}

impl StoreTx for MemTx<'_> {
    fn find_group(&mut self, group_id: Uuid) -> Result<Option<Group>, CoreError> {
        Ok(self.state.groups.get(&group_id).cloned())
    }

    // El mutex de la transacción ya retiene todo el estado; bloquear una
    // fila concreta es un no-op con la misma semántica observable.
    fn lock_group(&mut self, group_id: Uuid) -> Result<Option<Group>, CoreError> {
        self.find_group(group_id)
    }

    fn lock_forming_group(&mut self, duration_cycles: i32) -> Result<Option<Group>, CoreError> {
        Ok(self.state
               .groups
               .values()
               .filter(|g| g.status() == GroupStatus::Forming && g.duration_cycles() == duration_cycles)
               .min_by_key(|g| g.created_at())
               .cloned())
    }

    fn insert_group(&mut self, group: &Group) -> Result<(), CoreError> {
        if self.state.groups.contains_key(&group.id()) {
            return Err(CoreError::Storage(format!("grupo duplicado: {}", group.id())));
        }
        self.state.groups.insert(group.id(), group.clone());
        Ok(())
    }

    fn update_group(&mut self, group: &Group) -> Result<(), CoreError> {
        match self.state.groups.get_mut(&group.id()) {
            Some(slot) => {
                *slot = group.clone();
                Ok(())
            }
            None => Err(CoreError::GroupNotFound(group.id())),
        }
    }

    fn running_group_ids(&mut self) -> Result<Vec<Uuid>, CoreError> {
        let mut running: Vec<&Group> =
            self.state.groups.values().filter(|g| g.status() == GroupStatus::Running).collect();
        running.sort_by_key(|g| g.created_at());
        Ok(running.into_iter().map(|g| g.id()).collect())
    }

    fn insert_membership(&mut self, membership: &Membership) -> Result<(), CoreError> {
        let duplicate = self.state
                            .memberships
                            .values()
                            .any(|m| m.user_id() == membership.user_id() && m.group_id() == membership.group_id());
        if duplicate {
            return Err(CoreError::Storage(format!("membresía duplicada: usuario {} en grupo {}",
                                                  membership.user_id(),
                                                  membership.group_id())));
        }
        self.state.memberships.insert(membership.id(), membership.clone());
        Ok(())
    }

    fn update_membership(&mut self, membership: &Membership) -> Result<(), CoreError> {
        // unicidad de posición por grupo entre posiciones ya asignadas
        if let Some(p) = membership.position() {
            let taken = self.state
                            .memberships
                            .values()
                            .any(|m| {
                                m.group_id() == membership.group_id()
                                && m.id() != membership.id()
                                && m.position() == Some(p)
                            });
            if taken {
                return Err(CoreError::Storage(format!("posición {p} ya asignada en grupo {}",
                                                      membership.group_id())));
            }
        }
        match self.state.memberships.get_mut(&membership.id()) {
            Some(slot) => {
                *slot = membership.clone();
                Ok(())
            }
            None => Err(CoreError::Storage(format!("membresía no encontrada: {}", membership.id()))),
        }
    }

    fn delete_membership(&mut self, membership_id: Uuid) -> Result<(), CoreError> {
        self.state
            .memberships
            .remove(&membership_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::Storage(format!("membresía no encontrada: {membership_id}")))
    }

    fn member_count(&mut self, group_id: Uuid) -> Result<i64, CoreError> {
        Ok(self.state.memberships.values().filter(|m| m.group_id() == group_id).count() as i64)
    }

    fn memberships_of_group(&mut self, group_id: Uuid) -> Result<Vec<Membership>, CoreError> {
        let mut members: Vec<Membership> =
            self.state.memberships.values().filter(|m| m.group_id() == group_id).cloned().collect();
        members.sort_by_key(|m| m.joined_at());
        Ok(members)
    }

    fn active_membership_of_user(&mut self, user_id: Uuid) -> Result<Option<Membership>, CoreError> {
        let groups = &self.state.groups;
        Ok(self.state
               .memberships
               .values()
               .find(|m| {
                   m.user_id() == user_id
                   && groups.get(&m.group_id())
                            .map(|g| g.status() != GroupStatus::Completed)
                            .unwrap_or(false)
               })
               .cloned())
    }

    fn insert_draw_session(&mut self, session: &DrawSession) -> Result<(), CoreError> {
        let open = self.state
                       .draw_sessions
                       .values()
                       .any(|s| s.group_id() == session.group_id() && !s.status().is_terminal());
        if open {
            return Err(CoreError::DrawAlreadyInProgress(session.group_id()));
        }
        self.state.draw_sessions.insert(session.id(), session.clone());
        Ok(())
    }

    fn update_draw_session(&mut self, session: &DrawSession) -> Result<(), CoreError> {
        match self.state.draw_sessions.get_mut(&session.id()) {
            Some(slot) => {
                *slot = session.clone();
                Ok(())
            }
            None => Err(CoreError::DrawNotFound(session.id())),
        }
    }

    fn find_draw_session(&mut self, draw_id: Uuid) -> Result<Option<DrawSession>, CoreError> {
        Ok(self.state.draw_sessions.get(&draw_id).cloned())
    }

    fn open_draw_session(&mut self, group_id: Uuid) -> Result<Option<DrawSession>, CoreError> {
        Ok(self.state
               .draw_sessions
               .values()
               .find(|s| s.group_id() == group_id && !s.status().is_terminal())
               .cloned())
    }

    fn insert_contribution(&mut self, contribution: &Contribution) -> Result<(), CoreError> {
        let duplicate = self.state.contributions.values().any(|c| {
                            c.user_id() == contribution.user_id()
                            && c.group_id() == contribution.group_id()
                            && c.period() == contribution.period()
                        });
        if duplicate {
            return Err(CoreError::Storage(format!("aporte duplicado: {} / {} / {}",
                                                  contribution.user_id(),
                                                  contribution.group_id(),
                                                  contribution.period())));
        }
        self.state.contributions.insert(contribution.id(), contribution.clone());
        Ok(())
    }

    fn update_contribution(&mut self, contribution: &Contribution) -> Result<(), CoreError> {
        match self.state.contributions.get_mut(&contribution.id()) {
            Some(slot) => {
                *slot = contribution.clone();
                Ok(())
            }
            None => Err(CoreError::Storage(format!("aporte no encontrado: {}", contribution.id()))),
        }
    }

    fn find_contribution(&mut self, user_id: Uuid, group_id: Uuid, period: &str)
                         -> Result<Option<Contribution>, CoreError> {
        Ok(self.state
               .contributions
               .values()
               .find(|c| c.user_id() == user_id && c.group_id() == group_id && c.period() == period)
               .cloned())
    }

    fn contributions_of_period(&mut self, group_id: Uuid, period: &str) -> Result<Vec<Contribution>, CoreError> {
        let mut rows: Vec<Contribution> = self.state
                                              .contributions
                                              .values()
                                              .filter(|c| c.group_id() == group_id && c.period() == period)
                                              .cloned()
                                              .collect();
        rows.sort_by_key(|c| c.created_at());
        Ok(rows)
    }

    fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), CoreError> {
        let duplicate = self.state
                            .deliveries
                            .values()
                            .any(|d| d.group_id() == delivery.group_id() && d.cycle_label() == delivery.cycle_label());
        if duplicate {
            return Err(CoreError::Storage(format!("entrega duplicada: grupo {} ciclo {}",
                                                  delivery.group_id(),
                                                  delivery.cycle_label())));
        }
        self.state.deliveries.insert(delivery.id(), delivery.clone());
        Ok(())
    }

    fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), CoreError> {
        match self.state.deliveries.get_mut(&delivery.id()) {
            Some(slot) => {
                *slot = delivery.clone();
                Ok(())
            }
            None => Err(CoreError::Storage(format!("entrega no encontrada: {}", delivery.id()))),
        }
    }

    fn find_delivery(&mut self, group_id: Uuid, cycle_label: &str) -> Result<Option<Delivery>, CoreError> {
        Ok(self.state
               .deliveries
               .values()
               .find(|d| d.group_id() == group_id && d.cycle_label() == cycle_label)
               .cloned())
    }

    fn deliveries_of_group(&mut self, group_id: Uuid) -> Result<Vec<Delivery>, CoreError> {
        let mut rows: Vec<Delivery> =
            self.state.deliveries.values().filter(|d| d.group_id() == group_id).cloned().collect();
        rows.sort_by_key(|d| d.created_at());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = InMemoryStore::new();
        let group = Group::new(3, 5000).unwrap();
        let gid = group.id();
        let result: Result<(), CoreError> = store.transaction(|tx| {
                                                     tx.insert_group(&group)?;
                                                     Err(CoreError::Storage("fallo inducido".to_string()))
                                                 });
        assert!(result.is_err());
        let found = store.transaction(|tx| tx.find_group(gid)).unwrap();
        assert!(found.is_none(), "el insert debió revertirse");
    }

    #[test]
    fn duplicate_contribution_rejected() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        store.transaction(|tx| {
                 let c = Contribution::new(user, group, "ciclo-01", 100).unwrap();
                 tx.insert_contribution(&c)
             })
             .unwrap();
        let dup = store.transaction(|tx| {
                           let c = Contribution::new(user, group, "ciclo-01", 100).unwrap();
                           tx.insert_contribution(&c)
                       });
        assert!(dup.is_err());
    }
}
