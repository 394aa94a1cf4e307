//! Fachada del motor: agrupa almacenamiento, catálogo y canal de
//! revelación, y expone las operaciones de los cinco componentes.

use cadena_domain::{Contribution, Delivery, DrawSession};
use rand::Rng;
use uuid::Uuid;

use crate::allocator::{self, GroupJoinResult};
use crate::catalog::PlanCatalog;
use crate::draw;
use crate::errors::CoreError;
use crate::event::RevealChannel;
use crate::ledger::{self, ApprovedPayment};
use crate::rotation::{self, CycleAdvance, PeriodObligations, PeriodReport};
use crate::store::CircleStore;

/// Motor de formación de grupos, sorteo y rotación.
///
/// Cada operación corre en su propia transacción del almacenamiento; el
/// motor en sí no guarda estado mutable, de modo que varias instancias (o
/// varios procesos) pueden operar sobre el mismo almacenamiento a la vez.
pub struct CircleEngine<S, C, R>
    where S: CircleStore,
          C: PlanCatalog,
          R: RevealChannel
{
    store: S,
    catalog: C,
    reveal_channel: R,
}

impl<S, C, R> CircleEngine<S, C, R>
    where S: CircleStore,
          C: PlanCatalog,
          R: RevealChannel
{
    pub fn new(store: S, catalog: C, reveal_channel: R) -> Self {
        Self { store, catalog, reveal_channel }
    }

    /// Acceso al almacenamiento subyacente (pruebas, drivers).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Acceso al canal de revelación (pruebas, drivers).
    pub fn reveal_channel(&self) -> &R {
        &self.reveal_channel
    }

    // -- asignador --

    /// Alta de un usuario en un grupo de la duración del plan.
    pub fn join(&self, user_id: Uuid, plan_id: Uuid) -> Result<GroupJoinResult, CoreError> {
        allocator::join(&self.store, &self.catalog, user_id, plan_id)
    }

    /// Baja voluntaria mientras el grupo sigue en formación.
    pub fn leave(&self, user_id: Uuid, group_id: Uuid) -> Result<(), CoreError> {
        allocator::leave(&self.store, user_id, group_id)
    }

    // -- sorteo --

    /// Sortea posiciones y arranca el grupo (`Full -> Running`).
    pub fn start_draw(&self, group_id: Uuid, admin_id: Uuid) -> Result<DrawSession, CoreError> {
        draw::start_draw(&self.store, &self.reveal_channel, group_id, admin_id)
    }

    /// Variante con RNG inyectado para pruebas reproducibles.
    pub fn start_draw_with_rng<G>(&self, group_id: Uuid, admin_id: Uuid, rng: &mut G) -> Result<DrawSession, CoreError>
        where G: Rng + ?Sized
    {
        draw::start_draw_with_rng(&self.store, &self.reveal_channel, group_id, admin_id, rng)
    }

    /// Avanza un paso de la revelación animada.
    pub fn advance_reveal(&self, draw_id: Uuid) -> Result<DrawSession, CoreError> {
        draw::advance_reveal(&self.store, draw_id)
    }

    // -- rotación --

    /// Avanza el ciclo de un grupo corriendo.
    pub fn advance_cycle(&self, group_id: Uuid) -> Result<CycleAdvance, CoreError> {
        rotation::advance_cycle(&self.store, group_id)
    }

    /// Avanza el período de todos los grupos corriendo, aislando fallos.
    pub fn run_period(&self) -> Result<PeriodReport, CoreError> {
        rotation::run_period(&self.store)
    }

    /// Estado de las obligaciones de un ciclo.
    pub fn period_obligations(&self, group_id: Uuid, cycle: i32) -> Result<PeriodObligations, CoreError> {
        rotation::period_obligations(&self.store, group_id, cycle)
    }

    /// Marca como entregada la entrega de un ciclo.
    pub fn fulfill_delivery(&self, group_id: Uuid, cycle: i32) -> Result<Delivery, CoreError> {
        rotation::fulfill_delivery(&self.store, group_id, cycle)
    }

    // -- conciliación --

    /// Concilia un pago aprobado con su aporte.
    pub fn confirm_payment(&self, payment: ApprovedPayment) -> Result<Contribution, CoreError> {
        ledger::confirm_payment(&self.store, payment)
    }

    /// Rechaza el aporte pendiente de un período.
    pub fn reject_payment(&self, user_id: Uuid, group_id: Uuid, period: &str) -> Result<Contribution, CoreError> {
        ledger::reject_payment(&self.store, user_id, group_id, period)
    }
}
