//! Errores del motor.
//!
//! Los conflictos de estado se detectan dentro de la transacción dueña y
//! provocan rollback limpio: el llamador recibe la variante tipada, nunca
//! una escritura parcial. Los errores de validación viven en
//! `cadena_domain::DomainError` y llegan envueltos en `Domain`.

use cadena_domain::{DomainError, GroupStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// El usuario ya tiene una membresía activa; no se reutiliza en silencio.
    #[error("el usuario {user_id} ya pertenece al grupo {group_id}")]
    AlreadyMember { user_id: Uuid, group_id: Uuid },
    #[error("plan no encontrado o inactivo: {0}")]
    PlanNotFound(Uuid),
    #[error("grupo no encontrado: {0}")]
    GroupNotFound(Uuid),
    /// Transición o comando fuera de orden; nunca se ignora ni se reintenta
    /// en silencio (un reintento silencioso podría avanzar un ciclo dos
    /// veces).
    #[error("estado de grupo inválido: se requiere {required}, hay {found}")]
    InvalidGroupState { required: GroupStatus, found: GroupStatus },
    #[error("el grupo {0} aún no está lleno")]
    GroupNotReady(Uuid),
    #[error("ya existe un sorteo en curso para el grupo {0}")]
    DrawAlreadyInProgress(Uuid),
    #[error("sorteo no encontrado: {0}")]
    DrawNotFound(Uuid),
    /// Defensivo: inalcanzable con la disciplina de locks, pero se verifica
    /// y se reporta en lugar de recortar el exceso.
    #[error("capacidad del grupo {0} excedida")]
    CapacityExceeded(Uuid),
    #[error("el usuario {user_id} no es miembro del grupo {group_id}")]
    NotMember { user_id: Uuid, group_id: Uuid },
    #[error("no existe aporte de {user_id} en {group_id} para {period}")]
    ContributionNotFound { user_id: Uuid, group_id: Uuid, period: String },
    #[error("no existe entrega de {group_id} para {cycle_label}")]
    DeliveryNotFound { group_id: Uuid, cycle_label: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("error de almacenamiento: {0}")]
    Storage(String),
}
