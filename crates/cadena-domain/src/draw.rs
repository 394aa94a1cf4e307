use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;
use std::fmt;
use std::collections::HashSet;
use uuid::Uuid;

/// Estado de una sesión de sorteo.
///
/// Transiciones válidas:
/// - `Pending` -> `InProgress` (al arrancar la revelación animada)
/// - `InProgress` -> `Completed` (al revelarse el último paso)
///
/// Solo puede existir una sesión no terminal por grupo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawStatus {
    Pending,
    InProgress,
    Completed,
}

impl DrawStatus {
    pub fn allows(self, next: DrawStatus) -> bool {
        matches!((self, next),
                 (DrawStatus::Pending, DrawStatus::InProgress)
                 | (DrawStatus::InProgress, DrawStatus::Completed))
    }

    pub fn is_terminal(self) -> bool {
        self == DrawStatus::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DrawStatus::Pending => "pending",
            DrawStatus::InProgress => "in_progress",
            DrawStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(DrawStatus::Pending),
            "in_progress" => Ok(DrawStatus::InProgress),
            "completed" => Ok(DrawStatus::Completed),
            other => Err(DomainError::Validation(format!("estado de sorteo desconocido: {other}"))),
        }
    }
}

impl fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Posición final sorteada para un miembro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionAssignment {
    pub user_id: Uuid,
    pub position: i32,
}

/// Paso de la secuencia de revelación: qué posición se muestra y con qué
/// retardo. Proyección puramente cosmética del resultado ya comprometido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealStep {
    pub position: i32,
    pub delay_ms: u32,
}

/// Sesión de sorteo de un grupo lleno.
///
/// `final_positions` se computa una sola vez, de forma síncrona y atómica
/// con la transición `Full -> Running`; es inmutable una vez escrita. La
/// `reveal_sequence` deriva de ella y puede recalcularse o reproducirse sin
/// tocar el estado almacenado: el retardo de la animación jamás decide el
/// resultado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawSession {
    id: Uuid,
    group_id: Uuid,
    initiated_by: Uuid,
    status: DrawStatus,
    final_positions: Vec<PositionAssignment>,
    reveal_sequence: Vec<RevealStep>,
    current_step: i32,
    total_steps: i32,
    created_at: DateTime<Utc>,
}

impl DrawSession {
    /// Crea una sesión con el resultado ya sorteado.
    ///
    /// # Errores
    /// `DomainError::Validation` si las posiciones no son una permutación de
    /// `1..=n` sin huecos ni duplicados, si hay usuarios repetidos, o si la
    /// secuencia de revelación no cubre las mismas posiciones con retardos
    /// estrictamente crecientes.
    pub fn new(group_id: Uuid,
               initiated_by: Uuid,
               final_positions: Vec<PositionAssignment>,
               reveal_sequence: Vec<RevealStep>)
               -> Result<Self, DomainError> {
        let n = final_positions.len() as i32;
        if n < 1 {
            return Err(DomainError::Validation("sorteo sin participantes".to_string()));
        }
        Self::check_permutation(&final_positions, n)?;
        Self::check_reveal(&reveal_sequence, n)?;
        Ok(DrawSession { id: Uuid::new_v4(),
                         group_id,
                         initiated_by,
                         status: DrawStatus::Pending,
                         final_positions,
                         reveal_sequence,
                         current_step: 0,
                         total_steps: n,
                         created_at: Utc::now() })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(id: Uuid,
                   group_id: Uuid,
                   initiated_by: Uuid,
                   status: DrawStatus,
                   final_positions: Vec<PositionAssignment>,
                   reveal_sequence: Vec<RevealStep>,
                   current_step: i32,
                   total_steps: i32,
                   created_at: DateTime<Utc>)
                   -> Result<Self, DomainError> {
        Self::check_permutation(&final_positions, total_steps)?;
        if current_step < 0 || current_step > total_steps {
            return Err(DomainError::Validation(format!("paso de revelación fuera de rango: {current_step}")));
        }
        Ok(DrawSession { id,
                         group_id,
                         initiated_by,
                         status,
                         final_positions,
                         reveal_sequence,
                         current_step,
                         total_steps,
                         created_at })
    }

    fn check_permutation(assignments: &[PositionAssignment], n: i32) -> Result<(), DomainError> {
        if assignments.len() as i32 != n {
            return Err(DomainError::Validation(format!("se esperaban {n} posiciones, hay {}", assignments.len())));
        }
        let mut positions = HashSet::new();
        let mut users = HashSet::new();
        for a in assignments {
            if a.position < 1 || a.position > n {
                return Err(DomainError::Validation(format!("posición fuera de rango: {}", a.position)));
            }
            if !positions.insert(a.position) {
                return Err(DomainError::Validation(format!("posición duplicada: {}", a.position)));
            }
            if !users.insert(a.user_id) {
                return Err(DomainError::Validation(format!("usuario duplicado en sorteo: {}", a.user_id)));
            }
        }
        Ok(())
    }

    fn check_reveal(sequence: &[RevealStep], n: i32) -> Result<(), DomainError> {
        if sequence.len() as i32 != n {
            return Err(DomainError::Validation(format!("la revelación debe tener {n} pasos, tiene {}", sequence.len())));
        }
        let mut covered = HashSet::new();
        let mut last_delay: Option<u32> = None;
        for step in sequence {
            if !covered.insert(step.position) {
                return Err(DomainError::Validation(format!("posición repetida en revelación: {}", step.position)));
            }
            if let Some(prev) = last_delay {
                if step.delay_ms <= prev {
                    return Err(DomainError::Validation("los retardos de revelación deben ser crecientes".to_string()));
                }
            }
            last_delay = Some(step.delay_ms);
        }
        Ok(())
    }

    fn transition(&mut self, next: DrawStatus) -> Result<(), DomainError> {
        if !self.status.allows(next) {
            return Err(DomainError::InvalidTransition { entity: "draw_session",
                                                        from: self.status.as_str(),
                                                        to: next.as_str() });
        }
        self.status = next;
        Ok(())
    }

    /// Revela el siguiente paso. El primer avance arranca la sesión
    /// (`Pending -> InProgress`); el último la cierra
    /// (`InProgress -> Completed`). Contabilidad de presentación: las
    /// posiciones ya son durables desde la creación.
    pub fn advance_step(&mut self) -> Result<(), DomainError> {
        match self.status {
            DrawStatus::Pending => self.transition(DrawStatus::InProgress)?,
            DrawStatus::InProgress => {}
            DrawStatus::Completed => {
                return Err(DomainError::InvalidTransition { entity: "draw_session",
                                                            from: self.status.as_str(),
                                                            to: "in_progress" })
            }
        }
        self.current_step += 1;
        if self.current_step >= self.total_steps {
            self.transition(DrawStatus::Completed)?;
        }
        Ok(())
    }

    /// Posición sorteada de un usuario, si participó.
    pub fn position_of(&self, user_id: Uuid) -> Option<i32> {
        self.final_positions
            .iter()
            .find(|a| a.user_id == user_id)
            .map(|a| a.position)
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    pub fn initiated_by(&self) -> Uuid {
        self.initiated_by
    }

    pub fn status(&self) -> DrawStatus {
        self.status
    }

    pub fn final_positions(&self) -> &[PositionAssignment] {
        &self.final_positions
    }

    pub fn reveal_sequence(&self) -> &[RevealStep] {
        &self.reveal_sequence
    }

    pub fn current_step(&self) -> i32 {
        self.current_step
    }

    pub fn total_steps(&self) -> i32 {
        self.total_steps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignments(n: i32) -> Vec<PositionAssignment> {
        (1..=n).map(|p| PositionAssignment { user_id: Uuid::new_v4(), position: p }).collect()
    }

    fn reveal(n: i32) -> Vec<RevealStep> {
        (1..=n).map(|p| RevealStep { position: p, delay_ms: 500 * p as u32 }).collect()
    }

    #[test]
    fn accepts_valid_permutation() {
        let s = DrawSession::new(Uuid::new_v4(), Uuid::new_v4(), assignments(3), reveal(3)).unwrap();
        assert_eq!(s.total_steps(), 3);
        assert_eq!(s.status(), DrawStatus::Pending);
    }

    #[test]
    fn rejects_duplicate_position() {
        let mut bad = assignments(3);
        bad[2].position = 1;
        assert!(DrawSession::new(Uuid::new_v4(), Uuid::new_v4(), bad, reveal(3)).is_err());
    }

    #[test]
    fn rejects_gap_in_positions() {
        let mut bad = assignments(3);
        bad[2].position = 5;
        assert!(DrawSession::new(Uuid::new_v4(), Uuid::new_v4(), bad, reveal(3)).is_err());
    }

    #[test]
    fn rejects_non_increasing_delays() {
        let mut seq = reveal(3);
        seq[2].delay_ms = seq[1].delay_ms;
        assert!(DrawSession::new(Uuid::new_v4(), Uuid::new_v4(), assignments(3), seq).is_err());
    }

    #[test]
    fn reveal_walks_pending_to_completed() {
        let mut s = DrawSession::new(Uuid::new_v4(), Uuid::new_v4(), assignments(2), reveal(2)).unwrap();
        s.advance_step().unwrap();
        assert_eq!(s.status(), DrawStatus::InProgress);
        assert_eq!(s.current_step(), 1);
        s.advance_step().unwrap();
        assert_eq!(s.status(), DrawStatus::Completed);
        assert!(s.advance_step().is_err());
    }

    #[test]
    fn single_member_draw() {
        let mut s = DrawSession::new(Uuid::new_v4(), Uuid::new_v4(), assignments(1), reveal(1)).unwrap();
        s.advance_step().unwrap();
        assert_eq!(s.status(), DrawStatus::Completed);
    }
}
