use serde::{Deserialize, Serialize};

use crate::DomainError;
use std::fmt;
use uuid::Uuid;

/// Plan del catálogo de productos: su duración en ciclos fija la capacidad
/// del grupo (un miembro por turno de entrega).
///
/// El catálogo es de solo lectura para el motor; los planes llegan ya
/// aprobados desde el colaborador externo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    id: Uuid,
    name: String,
    duration_cycles: i32,
    price_cents: i64,
    active: bool,
}

impl Plan {
    /// Crea un plan validando duración y precio.
    ///
    /// # Errores
    /// Retorna `DomainError::Validation` si `duration_cycles < 1` o si el
    /// precio no es positivo.
    pub fn new(name: impl Into<String>, duration_cycles: i32, price_cents: i64) -> Result<Self, DomainError> {
        let name = name.into();
        if duration_cycles < 1 {
            return Err(DomainError::Validation(format!("duración de plan inválida: {duration_cycles}")));
        }
        if price_cents <= 0 {
            return Err(DomainError::Validation(format!("precio de plan inválido: {price_cents}")));
        }
        if name.trim().is_empty() {
            return Err(DomainError::Validation("nombre de plan vacío".to_string()));
        }
        Ok(Plan { id: Uuid::new_v4(),
                  name,
                  duration_cycles,
                  price_cents,
                  active: true })
    }

    /// Rehidrata un plan desde almacenamiento sin regenerar el id.
    pub fn restore(id: Uuid,
                   name: impl Into<String>,
                   duration_cycles: i32,
                   price_cents: i64,
                   active: bool)
                   -> Result<Self, DomainError> {
        let mut plan = Plan::new(name, duration_cycles, price_cents)?;
        plan.id = id;
        plan.active = active;
        Ok(plan)
    }

    /// Marca el plan como retirado del catálogo.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    // Getters
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duración en ciclos; también es la capacidad del grupo.
    pub fn duration_cycles(&self) -> i32 {
        self.duration_cycles
    }

    pub fn price_cents(&self) -> i64 {
        self.price_cents
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plan({}, {} ciclos, {} cts)", self.name, self.duration_cycles, self.price_cents)
    }
}
