//! Costura transaccional entre el motor y el almacenamiento.
//!
//! Contrato de concurrencia:
//! - Cada operación del motor corre entera dentro de `transaction`: o
//!   confirma todo o revierte todo.
//! - La fila del grupo es el único punto de sincronización de sus
//!   membresías, sorteos, aportes y entregas: `lock_group` /
//!   `lock_forming_group` deben retener la fila hasta el commit
//!   (`SELECT ... FOR UPDATE` en el backend Postgres; el backend en memoria
//!   linealiza detrás de un mutex).
//! - Las restricciones de unicidad (posición por grupo, aporte por
//!   usuario/grupo/período, entrega por grupo/ciclo, un sorteo no terminal
//!   por grupo) se refuerzan además a nivel de esquema.

pub mod memory;

use cadena_domain::{Contribution, Delivery, DrawSession, Group, Membership};
use uuid::Uuid;

use crate::errors::CoreError;

pub use memory::InMemoryStore;

/// Operaciones disponibles dentro de una transacción. Las variantes `lock_*`
/// adquieren la fila para lo que resta de la transacción.
pub trait StoreTx {
    // -- grupos --
    fn find_group(&mut self, group_id: Uuid) -> Result<Option<Group>, CoreError>;
    fn lock_group(&mut self, group_id: Uuid) -> Result<Option<Group>, CoreError>;
    /// Bloquea el único grupo en formación para la duración dada, si existe.
    /// Política de empaquetado: a lo sumo un grupo abierto por duración.
    fn lock_forming_group(&mut self, duration_cycles: i32) -> Result<Option<Group>, CoreError>;
    fn insert_group(&mut self, group: &Group) -> Result<(), CoreError>;
    fn update_group(&mut self, group: &Group) -> Result<(), CoreError>;
    fn running_group_ids(&mut self) -> Result<Vec<Uuid>, CoreError>;

    // -- membresías --
    fn insert_membership(&mut self, membership: &Membership) -> Result<(), CoreError>;
    fn update_membership(&mut self, membership: &Membership) -> Result<(), CoreError>;
    fn delete_membership(&mut self, membership_id: Uuid) -> Result<(), CoreError>;
    /// Conteo consistente bajo el lock del grupo; jamás una lectura desfasada.
    fn member_count(&mut self, group_id: Uuid) -> Result<i64, CoreError>;
    fn memberships_of_group(&mut self, group_id: Uuid) -> Result<Vec<Membership>, CoreError>;
    /// Membresía del usuario en algún grupo no completado, si la hay.
    fn active_membership_of_user(&mut self, user_id: Uuid) -> Result<Option<Membership>, CoreError>;

    // -- sorteos --
    fn insert_draw_session(&mut self, session: &DrawSession) -> Result<(), CoreError>;
    fn update_draw_session(&mut self, session: &DrawSession) -> Result<(), CoreError>;
    fn find_draw_session(&mut self, draw_id: Uuid) -> Result<Option<DrawSession>, CoreError>;
    /// Sesión no terminal (pending / in_progress) del grupo, si existe.
    fn open_draw_session(&mut self, group_id: Uuid) -> Result<Option<DrawSession>, CoreError>;

    // -- aportes --
    fn insert_contribution(&mut self, contribution: &Contribution) -> Result<(), CoreError>;
    fn update_contribution(&mut self, contribution: &Contribution) -> Result<(), CoreError>;
    fn find_contribution(&mut self, user_id: Uuid, group_id: Uuid, period: &str)
                         -> Result<Option<Contribution>, CoreError>;
    fn contributions_of_period(&mut self, group_id: Uuid, period: &str) -> Result<Vec<Contribution>, CoreError>;

    // -- entregas --
    fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), CoreError>;
    fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), CoreError>;
    fn find_delivery(&mut self, group_id: Uuid, cycle_label: &str) -> Result<Option<Delivery>, CoreError>;
    fn deliveries_of_group(&mut self, group_id: Uuid) -> Result<Vec<Delivery>, CoreError>;
}

/// Almacenamiento del motor. `transaction` ejecuta la unidad de trabajo con
/// semántica todo-o-nada; un `Err` del cierre revierte cualquier escritura.
///
/// El cierre es `FnMut`: un backend puede reintentar la unidad completa
/// ante conflictos de serialización o fallos transitorios. El cierre debe
/// ser re-ejecutable (todo su estado sale de `StoreTx`, no de capturas
/// consumidas).
pub trait CircleStore {
    fn transaction<T, F>(&self, f: F) -> Result<T, CoreError>
        where F: FnMut(&mut dyn StoreTx) -> Result<T, CoreError>;
}
