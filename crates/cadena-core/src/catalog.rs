//! Lector del catálogo de planes: colaborador externo, solo lectura.

use cadena_domain::Plan;
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::CoreError;

/// Acceso de solo lectura a los planes activos. El CRUD del catálogo vive
/// fuera del motor; aquí solo se consulta.
pub trait PlanCatalog {
    /// Devuelve el plan si existe y está activo; `None` en caso contrario.
    fn active_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, CoreError>;
}

/// Catálogo en memoria para pruebas y para el driver de escenarios.
#[derive(Default)]
pub struct InMemoryPlanCatalog {
    plans: HashMap<Uuid, Plan>,
}

impl InMemoryPlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans<I>(plans: I) -> Self
        where I: IntoIterator<Item = Plan>
    {
        Self { plans: plans.into_iter().map(|p| (p.id(), p)).collect() }
    }

    pub fn add(&mut self, plan: Plan) {
        self.plans.insert(plan.id(), plan);
    }
}

impl PlanCatalog for InMemoryPlanCatalog {
    fn active_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, CoreError> {
        Ok(self.plans.get(&plan_id).filter(|p| p.is_active()).cloned())
    }
}
