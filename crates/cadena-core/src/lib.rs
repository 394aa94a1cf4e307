//! cadena-core: motor de formación de grupos, sorteo y rotación.
pub mod allocator;
pub mod catalog;
pub mod constants;
pub mod draw;
pub mod engine;
pub mod errors;
pub mod event;
pub mod ledger;
pub mod rotation;
pub mod store;

pub use allocator::GroupJoinResult;
pub use catalog::{InMemoryPlanCatalog, PlanCatalog};
pub use engine::CircleEngine;
pub use errors::CoreError;
pub use event::{DrawStarted, InMemoryRevealChannel, NoopRevealChannel, RevealChannel};
pub use ledger::ApprovedPayment;
pub use rotation::{CycleAdvance, PeriodObligations, PeriodReport};
pub use store::{CircleStore, InMemoryStore, StoreTx};
