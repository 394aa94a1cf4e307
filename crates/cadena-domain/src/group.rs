use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;
use std::fmt;
use uuid::Uuid;

/// Estado del ciclo de vida de un grupo.
///
/// Las transiciones válidas son:
/// - `Forming` -> `Full` (automática, al llenarse la capacidad)
/// - `Full` -> `Running` (disparada por el sorteo)
/// - `Running` -> `Completed` (automática, al agotarse los ciclos)
///
/// No se permiten saltos ni reversiones; `Completed` es terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    /// El grupo acepta miembros.
    Forming,
    /// Capacidad completa; espera el sorteo.
    Full,
    /// Rotación en curso.
    Running,
    /// Rotación terminada.
    Completed,
}

impl GroupStatus {
    /// Tabla de transiciones cerrada: cualquier par no listado se rechaza.
    pub fn allows(self, next: GroupStatus) -> bool {
        matches!((self, next),
                 (GroupStatus::Forming, GroupStatus::Full)
                 | (GroupStatus::Full, GroupStatus::Running)
                 | (GroupStatus::Running, GroupStatus::Completed))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Forming => "forming",
            GroupStatus::Full => "full",
            GroupStatus::Running => "running",
            GroupStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "forming" => Ok(GroupStatus::Forming),
            "full" => Ok(GroupStatus::Full),
            "running" => Ok(GroupStatus::Running),
            "completed" => Ok(GroupStatus::Completed),
            other => Err(DomainError::Validation(format!("estado de grupo desconocido: {other}"))),
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Etiqueta de ciclo compartida por entregas y aportes de un mismo período.
pub fn cycle_label(cycle: i32) -> String {
    format!("ciclo-{cycle:02}")
}

/// Grupo de ahorro rotativo: una cadena de `duration_cycles` miembros donde
/// cada ciclo uno recibe la entrega y todos aportan.
///
/// Invariante de capacidad: el número de membresías nunca supera
/// `duration_cycles`; la igualdad dispara `Forming -> Full`. El conteo se
/// decide siempre bajo el lock de la fila del grupo, nunca con una lectura
/// desfasada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: Uuid,
    duration_cycles: i32,
    contribution_cents: i64,
    status: GroupStatus,
    current_cycle: i32,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Group {
    /// Crea un grupo en formación para la duración dada. La cuota por ciclo
    /// se congela al crear el grupo, tomada del plan que lo originó.
    pub fn new(duration_cycles: i32, contribution_cents: i64) -> Result<Self, DomainError> {
        if duration_cycles < 1 {
            return Err(DomainError::Validation(format!("duración de grupo inválida: {duration_cycles}")));
        }
        if contribution_cents <= 0 {
            return Err(DomainError::Validation(format!("cuota de grupo inválida: {contribution_cents}")));
        }
        Ok(Group { id: Uuid::new_v4(),
                   duration_cycles,
                   contribution_cents,
                   status: GroupStatus::Forming,
                   current_cycle: 0,
                   started_at: None,
                   ended_at: None,
                   created_at: Utc::now() })
    }

    /// Rehidrata un grupo desde almacenamiento.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(id: Uuid,
                   duration_cycles: i32,
                   contribution_cents: i64,
                   status: GroupStatus,
                   current_cycle: i32,
                   started_at: Option<DateTime<Utc>>,
                   ended_at: Option<DateTime<Utc>>,
                   created_at: DateTime<Utc>)
                   -> Result<Self, DomainError> {
        if duration_cycles < 1 {
            return Err(DomainError::Validation(format!("duración de grupo inválida: {duration_cycles}")));
        }
        if current_cycle < 0 || current_cycle > duration_cycles + 1 {
            return Err(DomainError::Validation(format!("ciclo fuera de rango: {current_cycle}")));
        }
        Ok(Group { id,
                   duration_cycles,
                   contribution_cents,
                   status,
                   current_cycle,
                   started_at,
                   ended_at,
                   created_at })
    }

    fn transition(&mut self, next: GroupStatus) -> Result<(), DomainError> {
        if !self.status.allows(next) {
            return Err(DomainError::InvalidTransition { entity: "group",
                                                        from: self.status.as_str(),
                                                        to: next.as_str() });
        }
        self.status = next;
        Ok(())
    }

    /// `Forming -> Full`: el asignador la dispara cuando el conteo de
    /// miembros alcanza la capacidad.
    pub fn seal(&mut self) -> Result<(), DomainError> {
        self.transition(GroupStatus::Full)
    }

    /// `Full -> Running`: inseparable del sorteo; fija `started_at` y abre
    /// el primer ciclo.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(GroupStatus::Running)?;
        self.started_at = Some(now);
        self.current_cycle = 1;
        Ok(())
    }

    /// Avanza al ciclo indicado. Solo admite incrementos de exactamente 1
    /// dentro del rango de la rotación.
    pub fn advance_to(&mut self, new_cycle: i32) -> Result<(), DomainError> {
        if self.status != GroupStatus::Running {
            return Err(DomainError::InvalidTransition { entity: "group",
                                                        from: self.status.as_str(),
                                                        to: "running" });
        }
        if new_cycle != self.current_cycle + 1 || new_cycle > self.duration_cycles {
            return Err(DomainError::Validation(format!("avance de ciclo inválido: {} -> {new_cycle}",
                                                       self.current_cycle)));
        }
        self.current_cycle = new_cycle;
        Ok(())
    }

    /// `Running -> Completed`: fija `ended_at`. Terminal.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(GroupStatus::Completed)?;
        self.ended_at = Some(now);
        Ok(())
    }

    /// Capacidad restante dado un conteo de miembros tomado bajo el lock.
    pub fn remaining_capacity(&self, member_count: i64) -> i64 {
        (self.duration_cycles as i64 - member_count).max(0)
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn duration_cycles(&self) -> i32 {
        self.duration_cycles
    }

    /// Cuota por ciclo que aporta cada miembro.
    pub fn contribution_cents(&self) -> i64 {
        self.contribution_cents
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn current_cycle(&self) -> i32 {
        self.current_cycle
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
               "Group({}, {} ciclos, {}, ciclo {})",
               self.id,
               self.duration_cycles,
               self.status.as_str(),
               self.current_cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_in_order() {
        let mut g = Group::new(3, 5000).unwrap();
        assert_eq!(g.status(), GroupStatus::Forming);
        g.seal().unwrap();
        g.start(Utc::now()).unwrap();
        assert_eq!(g.current_cycle(), 1);
        assert!(g.started_at().is_some());
        g.advance_to(2).unwrap();
        g.advance_to(3).unwrap();
        g.complete(Utc::now()).unwrap();
        assert!(g.ended_at().is_some());
    }

    #[test]
    fn no_transition_skips_states() {
        let mut g = Group::new(3, 5000).unwrap();
        assert!(g.start(Utc::now()).is_err());
        assert!(g.complete(Utc::now()).is_err());
        g.seal().unwrap();
        assert!(g.seal().is_err());
        assert!(g.complete(Utc::now()).is_err());
    }

    #[test]
    fn advance_only_by_one() {
        let mut g = Group::new(3, 5000).unwrap();
        g.seal().unwrap();
        g.start(Utc::now()).unwrap();
        assert!(g.advance_to(3).is_err());
        assert!(g.advance_to(1).is_err());
        g.advance_to(2).unwrap();
    }

    #[test]
    fn zero_duration_rejected() {
        assert!(Group::new(0, 5000).is_err());
    }

    #[test]
    fn non_positive_quota_rejected() {
        assert!(Group::new(3, 0).is_err());
    }
}
