//! Errores de la capa de persistencia.
//!
//! Traduce los errores de Diesel a variantes con semántica propia: las
//! violaciones de restricción delatan un invariante roto aguas arriba; los
//! conflictos de serialización y los fallos de conexión son reintentables.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("violación de unicidad: {0}")]
    UniqueViolation(String),
    #[error("violación de restricción: {0}")]
    ConstraintViolation(String),
    #[error("fila no encontrada")]
    NotFound,
    #[error("conflicto de serialización (reintentable)")]
    SerializationConflict,
    #[error("fallo transitorio de conexión (reintentable): {0}")]
    TransientIo(String),
    #[error("error de base de datos: {0}")]
    Database(String),
}

impl PersistenceError {
    /// Conviene reintentar con backoff; nunca aplica a errores de negocio.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::SerializationConflict | PersistenceError::TransientIo(_))
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::UniqueViolation(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info)
            | DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info)
            | DieselError::DatabaseError(DatabaseErrorKind::NotNullViolation, info) => {
                Self::ConstraintViolation(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => Self::SerializationConflict,
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                Self::TransientIo(info.message().to_string())
            }
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}
