//! Evento saliente del sorteo y canal de publicación en tiempo real.
//!
//! Rol en el flujo:
//! - Al confirmarse un sorteo, el motor empuja `DrawStarted` al canal para
//!   que la capa de presentación reproduzca la revelación animada.
//! - La publicación es fire-and-forget: el resultado ya es durable en el
//!   almacenamiento, así que un fallo de entrega jamás revierte el sorteo.
//! - Entregas y aportes no requieren bus propio: los lectores consultan las
//!   filas persistidas.

use cadena_domain::{PositionAssignment, RevealStep};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Carga publicada al canal en tiempo real cuando un sorteo queda
/// comprometido. `final_positions` es la verdad; `reveal_sequence` es solo
/// guion de presentación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawStarted {
    pub group_id: Uuid,
    pub draw_id: Uuid,
    pub final_positions: Vec<PositionAssignment>,
    pub reveal_sequence: Vec<RevealStep>,
}

/// Canal de empuje hacia los espectadores del sorteo. El transporte real
/// (websockets, etc.) es un colaborador externo; aquí solo está la costura.
pub trait RevealChannel {
    fn publish(&self, event: &DrawStarted) -> Result<(), String>;
}

/// Canal que descarta todo. Útil para jobs por lotes sin espectadores.
#[derive(Default)]
pub struct NoopRevealChannel;

impl RevealChannel for NoopRevealChannel {
    fn publish(&self, _event: &DrawStarted) -> Result<(), String> {
        Ok(())
    }
}

/// Canal en memoria que acumula lo publicado, para inspección en pruebas.
#[derive(Default)]
pub struct InMemoryRevealChannel {
    published: Mutex<Vec<DrawStarted>>,
}

impl InMemoryRevealChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<DrawStarted> {
        self.published.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl RevealChannel for InMemoryRevealChannel {
    fn publish(&self, event: &DrawStarted) -> Result<(), String> {
        self.published
            .lock()
            .map_err(|_| "canal de revelación envenenado".to_string())?
            .push(event.clone());
        Ok(())
    }
}
