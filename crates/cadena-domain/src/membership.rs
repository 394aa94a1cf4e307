use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;
use uuid::Uuid;

/// Membresía de un usuario dentro de un grupo. La posición queda nula hasta
/// que el sorteo publica el orden final, y una vez asignada es inmutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    id: Uuid,
    user_id: Uuid,
    group_id: Uuid,
    position: Option<i32>,
    joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: Uuid, group_id: Uuid) -> Self {
        Membership { id: Uuid::new_v4(),
                     user_id,
                     group_id,
                     position: None,
                     joined_at: Utc::now() }
    }

    pub fn restore(id: Uuid,
                   user_id: Uuid,
                   group_id: Uuid,
                   position: Option<i32>,
                   joined_at: DateTime<Utc>)
                   -> Result<Self, DomainError> {
        if let Some(p) = position {
            if p < 1 {
                return Err(DomainError::Validation(format!("posición inválida: {p}")));
            }
        }
        Ok(Membership { id, user_id, group_id, position, joined_at })
    }

    /// Asigna la posición sorteada. Rechaza reasignaciones: el resultado del
    /// sorteo se escribe una sola vez.
    pub fn assign_position(&mut self, position: i32, capacity: i32) -> Result<(), DomainError> {
        if self.position.is_some() {
            return Err(DomainError::Validation(format!("la membresía {} ya tiene posición", self.id)));
        }
        if position < 1 || position > capacity {
            return Err(DomainError::Validation(format!("posición fuera de rango: {position} (capacidad {capacity})")));
        }
        self.position = Some(position);
        Ok(())
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

    pub fn position(&self) -> Option<i32> {
        self.position
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }
}
