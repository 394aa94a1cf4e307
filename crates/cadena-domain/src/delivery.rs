use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;
use std::fmt;
use uuid::Uuid;

/// Estado de una entrega: pendiente o entregada. Sin reversiones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Entregado,
}

impl DeliveryStatus {
    pub fn allows(self, next: DeliveryStatus) -> bool {
        matches!((self, next), (DeliveryStatus::Pending, DeliveryStatus::Entregado))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Entregado => "entregado",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "entregado" => Ok(DeliveryStatus::Entregado),
            other => Err(DomainError::Validation(format!("estado de entrega desconocido: {other}"))),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entrega del producto al miembro cuyo turno coincide con el ciclo en
/// curso. Exactamente una por grupo y ciclo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    id: Uuid,
    user_id: Uuid,
    group_id: Uuid,
    cycle_label: String,
    status: DeliveryStatus,
    created_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(user_id: Uuid, group_id: Uuid, cycle_label: impl Into<String>) -> Result<Self, DomainError> {
        let cycle_label = cycle_label.into();
        if cycle_label.trim().is_empty() {
            return Err(DomainError::Validation("etiqueta de ciclo vacía".to_string()));
        }
        Ok(Delivery { id: Uuid::new_v4(),
                      user_id,
                      group_id,
                      cycle_label,
                      status: DeliveryStatus::Pending,
                      created_at: Utc::now() })
    }

    pub fn restore(id: Uuid,
                   user_id: Uuid,
                   group_id: Uuid,
                   cycle_label: String,
                   status: DeliveryStatus,
                   created_at: DateTime<Utc>)
                   -> Result<Self, DomainError> {
        let mut d = Delivery::new(user_id, group_id, cycle_label)?;
        d.id = id;
        d.status = status;
        d.created_at = created_at;
        Ok(d)
    }

    /// Marca la entrega como realizada.
    pub fn fulfill(&mut self) -> Result<(), DomainError> {
        if !self.status.allows(DeliveryStatus::Entregado) {
            return Err(DomainError::InvalidTransition { entity: "delivery",
                                                        from: self.status.as_str(),
                                                        to: DeliveryStatus::Entregado.as_str() });
        }
        self.status = DeliveryStatus::Entregado;
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

    pub fn cycle_label(&self) -> &str {
        &self.cycle_label
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfill_once() {
        let mut d = Delivery::new(Uuid::new_v4(), Uuid::new_v4(), "ciclo-01").unwrap();
        d.fulfill().unwrap();
        assert_eq!(d.status(), DeliveryStatus::Entregado);
        assert!(d.fulfill().is_err());
    }
}
