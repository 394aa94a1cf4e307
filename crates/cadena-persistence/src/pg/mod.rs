//! Implementación Postgres (Diesel) de la costura `CircleStore`.
//!
//! Objetivos del módulo:
//! - Paridad de comportamiento 1:1 con el backend en memoria de
//!   `cadena-core`: mismos invariantes, mismo aislamiento observable.
//! - La fila de `savings_groups` es el único punto de sincronización de un
//!   grupo: las variantes `lock_*` emiten `SELECT ... FOR UPDATE`, de modo
//!   que altas, sorteo y avance de ciclo del mismo grupo se linealizan
//!   aunque corran en procesos distintos.
//! - Las restricciones de unicidad del esquema respaldan lo que el motor
//!   verifica bajo el lock; una violación aquí delata un invariante roto y
//!   se reporta, nunca se recorta.
//! - Reintento con backoff solo para conflictos de serialización y fallos
//!   transitorios de conexión; los errores de negocio jamás se reintentan.

use cadena_core::{CircleStore, CoreError, PlanCatalog, StoreTx};
use cadena_domain::{Contribution, ContributionStatus, Delivery, DeliveryStatus, DomainError, DrawSession, DrawStatus,
                    Group, GroupStatus, Membership, Plan, PositionAssignment, RevealStep};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::config;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{contributions, deliveries, draw_sessions, memberships, plans, savings_groups};

/// Pool r2d2 de conexiones Postgres. Al construirlo se corren las
/// migraciones pendientes una sola vez.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones, para inyectar un pool real o
/// simularlo en pruebas unitarias sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Proveedor respaldado por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Filas
// ---------------------------------------------------------------------------

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = plans)]
struct PlanRow {
    id: Uuid,
    name: String,
    duration_cycles: i32,
    price_cents: i64,
    active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = savings_groups)]
struct GroupRow {
    id: Uuid,
    duration_cycles: i32,
    contribution_cents: i64,
    status: String,
    current_cycle: i32,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = memberships)]
struct MembershipRow {
    id: Uuid,
    user_id: Uuid,
    group_id: Uuid,
    position: Option<i32>,
    joined_at: DateTime<Utc>,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = draw_sessions)]
struct DrawSessionRow {
    id: Uuid,
    group_id: Uuid,
    initiated_by: Uuid,
    status: String,
    final_positions: Value,
    reveal_sequence: Value,
    current_step: i32,
    total_steps: i32,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = contributions)]
struct ContributionRow {
    id: Uuid,
    user_id: Uuid,
    group_id: Uuid,
    period: String,
    amount_cents: i64,
    status: String,
    settled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = deliveries)]
struct DeliveryRow {
    id: Uuid,
    user_id: Uuid,
    group_id: Uuid,
    cycle_label: String,
    status: String,
    created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mapeo fila <-> dominio
// ---------------------------------------------------------------------------

/// Una fila que no pasa la validación del dominio delata corrupción o una
/// migración a medias; se reporta como error de almacenamiento.
fn corrupt(e: DomainError) -> CoreError {
    CoreError::Storage(format!("fila inconsistente: {e}"))
}

fn db_err(e: diesel::result::Error) -> CoreError {
    CoreError::Storage(PersistenceError::from(e).to_string())
}

fn json_err(e: serde_json::Error) -> CoreError {
    CoreError::Storage(format!("payload JSON inválido: {e}"))
}

impl GroupRow {
    fn from_domain(group: &Group) -> Self {
        GroupRow { id: group.id(),
                   duration_cycles: group.duration_cycles(),
                   contribution_cents: group.contribution_cents(),
                   status: group.status().as_str().to_string(),
                   current_cycle: group.current_cycle(),
                   started_at: group.started_at(),
                   ended_at: group.ended_at(),
                   created_at: group.created_at() }
    }

    fn into_domain(self) -> Result<Group, CoreError> {
        let status = GroupStatus::parse(&self.status).map_err(corrupt)?;
        Group::restore(self.id,
                       self.duration_cycles,
                       self.contribution_cents,
                       status,
                       self.current_cycle,
                       self.started_at,
                       self.ended_at,
                       self.created_at).map_err(corrupt)
    }
}

impl MembershipRow {
    fn from_domain(m: &Membership) -> Self {
        MembershipRow { id: m.id(),
                        user_id: m.user_id(),
                        group_id: m.group_id(),
                        position: m.position(),
                        joined_at: m.joined_at() }
    }

    fn into_domain(self) -> Result<Membership, CoreError> {
        Membership::restore(self.id, self.user_id, self.group_id, self.position, self.joined_at).map_err(corrupt)
    }
}

impl DrawSessionRow {
    fn from_domain(s: &DrawSession) -> Result<Self, CoreError> {
        Ok(DrawSessionRow { id: s.id(),
                            group_id: s.group_id(),
                            initiated_by: s.initiated_by(),
                            status: s.status().as_str().to_string(),
                            final_positions: serde_json::to_value(s.final_positions()).map_err(json_err)?,
                            reveal_sequence: serde_json::to_value(s.reveal_sequence()).map_err(json_err)?,
                            current_step: s.current_step(),
                            total_steps: s.total_steps(),
                            created_at: s.created_at() })
    }

    fn into_domain(self) -> Result<DrawSession, CoreError> {
        let status = DrawStatus::parse(&self.status).map_err(corrupt)?;
        let final_positions: Vec<PositionAssignment> =
            serde_json::from_value(self.final_positions).map_err(json_err)?;
        let reveal_sequence: Vec<RevealStep> = serde_json::from_value(self.reveal_sequence).map_err(json_err)?;
        DrawSession::restore(self.id,
                             self.group_id,
                             self.initiated_by,
                             status,
                             final_positions,
                             reveal_sequence,
                             self.current_step,
                             self.total_steps,
                             self.created_at).map_err(corrupt)
    }
}

impl ContributionRow {
    fn from_domain(c: &Contribution) -> Self {
        ContributionRow { id: c.id(),
                          user_id: c.user_id(),
                          group_id: c.group_id(),
                          period: c.period().to_string(),
                          amount_cents: c.amount_cents(),
                          status: c.status().as_str().to_string(),
                          settled_at: c.settled_at(),
                          created_at: c.created_at() }
    }

    fn into_domain(self) -> Result<Contribution, CoreError> {
        let status = ContributionStatus::parse(&self.status).map_err(corrupt)?;
        Contribution::restore(self.id,
                              self.user_id,
                              self.group_id,
                              self.period,
                              self.amount_cents,
                              status,
                              self.settled_at,
                              self.created_at).map_err(corrupt)
    }
}

impl DeliveryRow {
    fn from_domain(d: &Delivery) -> Self {
        DeliveryRow { id: d.id(),
                      user_id: d.user_id(),
                      group_id: d.group_id(),
                      cycle_label: d.cycle_label().to_string(),
                      status: d.status().as_str().to_string(),
                      created_at: d.created_at() }
    }

    fn into_domain(self) -> Result<Delivery, CoreError> {
        let status = DeliveryStatus::parse(&self.status).map_err(corrupt)?;
        Delivery::restore(self.id, self.user_id, self.group_id, self.cycle_label, status, self.created_at)
            .map_err(corrupt)
    }
}

// ---------------------------------------------------------------------------
// Transacciones
// ---------------------------------------------------------------------------

enum TxError {
    Core(CoreError),
    Db(PersistenceError),
}

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        TxError::Db(PersistenceError::from(e))
    }
}

fn tx_retryable(e: &TxError) -> bool {
    match e {
        TxError::Db(p) => p.is_retryable(),
        // errores de Diesel traducidos dentro del cierre conservan la marca
        TxError::Core(CoreError::Storage(msg)) => msg.contains("reintentable"),
        TxError::Core(_) => false,
    }
}

const MAX_TX_ATTEMPTS: u32 = 3;

/// Implementación Postgres de `CircleStore`.
pub struct PgCircleStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgCircleStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl PgCircleStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> CircleStore for PgCircleStore<P> {
    fn transaction<T, F>(&self, mut f: F) -> Result<T, CoreError>
        where F: FnMut(&mut dyn StoreTx) -> Result<T, CoreError>
    {
        let mut attempts = 0;
        loop {
            let outcome = self.provider
                              .connection()
                              .map_err(TxError::Db)
                              .and_then(|mut conn| {
                                  conn.build_transaction().read_write().run(|tx_conn| {
                                          let mut tx = PgStoreTx { conn: tx_conn };
                                          f(&mut tx).map_err(TxError::Core)
                                      })
                              });
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if tx_retryable(&e) && attempts < MAX_TX_ATTEMPTS => {
                    attempts += 1;
                    let delay_ms = 15 * u64::from(attempts);
                    warn!("transacción reintentable (intento {attempts}) -> backoff {delay_ms}ms");
                    std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                }
                Err(TxError::Core(e)) => return Err(e),
                Err(TxError::Db(p)) => return Err(CoreError::Storage(p.to_string())),
            }
        }
    }
}

struct PgStoreTx<'a> {
    conn: &'a mut PgConnection,
}

impl StoreTx for PgStoreTx<'_> {
    fn find_group(&mut self, group_id: Uuid) -> Result<Option<Group>, CoreError> {
        savings_groups::table.find(group_id)
                             .first::<GroupRow>(self.conn)
                             .optional()
                             .map_err(db_err)?
                             .map(GroupRow::into_domain)
                             .transpose()
    }

    fn lock_group(&mut self, group_id: Uuid) -> Result<Option<Group>, CoreError> {
        savings_groups::table.find(group_id)
                             .for_update()
                             .first::<GroupRow>(self.conn)
                             .optional()
                             .map_err(db_err)?
                             .map(GroupRow::into_domain)
                             .transpose()
    }

    fn lock_forming_group(&mut self, duration_cycles: i32) -> Result<Option<Group>, CoreError> {
        savings_groups::table.filter(savings_groups::status.eq(GroupStatus::Forming.as_str()))
                             .filter(savings_groups::duration_cycles.eq(duration_cycles))
                             .order(savings_groups::created_at.asc())
                             .for_update()
                             .first::<GroupRow>(self.conn)
                             .optional()
                             .map_err(db_err)?
                             .map(GroupRow::into_domain)
                             .transpose()
    }

    fn insert_group(&mut self, group: &Group) -> Result<(), CoreError> {
        diesel::insert_into(savings_groups::table).values(GroupRow::from_domain(group))
                                                  .execute(self.conn)
                                                  .map_err(|e| match PersistenceError::from(e) {
                                                      // carrera de creación: otro proceso ya abrió el grupo en
                                                      // formación de esta duración; la transacción se reintenta
                                                      // y encuentra esa fila para bloquearla
                                                      PersistenceError::UniqueViolation(msg) => {
                                                          CoreError::Storage(format!("grupo en formación duplicado \
                                                                                      (reintentable): {msg}"))
                                                      }
                                                      other => CoreError::Storage(other.to_string()),
                                                  })?;
        debug!("insert_group: {}", group.id());
        Ok(())
    }

    fn update_group(&mut self, group: &Group) -> Result<(), CoreError> {
        let updated = diesel::update(savings_groups::table.find(group.id()))
            .set(GroupRow::from_domain(group))
            .execute(self.conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(CoreError::GroupNotFound(group.id()));
        }
        Ok(())
    }

    fn running_group_ids(&mut self) -> Result<Vec<Uuid>, CoreError> {
        savings_groups::table.filter(savings_groups::status.eq(GroupStatus::Running.as_str()))
                             .order(savings_groups::created_at.asc())
                             .select(savings_groups::id)
                             .load(self.conn)
                             .map_err(db_err)
    }

    fn insert_membership(&mut self, membership: &Membership) -> Result<(), CoreError> {
        diesel::insert_into(memberships::table).values(MembershipRow::from_domain(membership))
                                               .execute(self.conn)
                                               .map_err(db_err)?;
        Ok(())
    }

    fn update_membership(&mut self, membership: &Membership) -> Result<(), CoreError> {
        let updated = diesel::update(memberships::table.find(membership.id()))
            .set(MembershipRow::from_domain(membership))
            .execute(self.conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(CoreError::Storage(format!("membresía no encontrada: {}", membership.id())));
        }
        Ok(())
    }

    fn delete_membership(&mut self, membership_id: Uuid) -> Result<(), CoreError> {
        let deleted = diesel::delete(memberships::table.find(membership_id)).execute(self.conn)
                                                                            .map_err(db_err)?;
        if deleted == 0 {
            return Err(CoreError::Storage(format!("membresía no encontrada: {membership_id}")));
        }
        Ok(())
    }

    fn member_count(&mut self, group_id: Uuid) -> Result<i64, CoreError> {
        memberships::table.filter(memberships::group_id.eq(group_id))
                          .count()
                          .get_result(self.conn)
                          .map_err(db_err)
    }

    fn memberships_of_group(&mut self, group_id: Uuid) -> Result<Vec<Membership>, CoreError> {
        memberships::table.filter(memberships::group_id.eq(group_id))
                          .order(memberships::joined_at.asc())
                          .load::<MembershipRow>(self.conn)
                          .map_err(db_err)?
                          .into_iter()
                          .map(MembershipRow::into_domain)
                          .collect()
    }

    fn active_membership_of_user(&mut self, user_id: Uuid) -> Result<Option<Membership>, CoreError> {
        memberships::table.inner_join(savings_groups::table)
                          .filter(memberships::user_id.eq(user_id))
                          .filter(savings_groups::status.ne(GroupStatus::Completed.as_str()))
                          .select((memberships::id,
                                   memberships::user_id,
                                   memberships::group_id,
                                   memberships::position,
                                   memberships::joined_at))
                          .first::<MembershipRow>(self.conn)
                          .optional()
                          .map_err(db_err)?
                          .map(MembershipRow::into_domain)
                          .transpose()
    }

    fn insert_draw_session(&mut self, session: &DrawSession) -> Result<(), CoreError> {
        let row = DrawSessionRow::from_domain(session)?;
        diesel::insert_into(draw_sessions::table).values(row)
                                                 .execute(self.conn)
                                                 .map_err(|e| match PersistenceError::from(e) {
                                                     // el índice parcial respalda el invariante de sesión única
                                                     PersistenceError::UniqueViolation(_) => {
                                                         CoreError::DrawAlreadyInProgress(session.group_id())
                                                     }
                                                     other => CoreError::Storage(other.to_string()),
                                                 })?;
        debug!("insert_draw_session: {} para grupo {}", session.id(), session.group_id());
        Ok(())
    }

    fn update_draw_session(&mut self, session: &DrawSession) -> Result<(), CoreError> {
        let row = DrawSessionRow::from_domain(session)?;
        let updated = diesel::update(draw_sessions::table.find(session.id())).set(row)
                                                                             .execute(self.conn)
                                                                             .map_err(db_err)?;
        if updated == 0 {
            return Err(CoreError::DrawNotFound(session.id()));
        }
        Ok(())
    }

    fn find_draw_session(&mut self, draw_id: Uuid) -> Result<Option<DrawSession>, CoreError> {
        draw_sessions::table.find(draw_id)
                            .first::<DrawSessionRow>(self.conn)
                            .optional()
                            .map_err(db_err)?
                            .map(DrawSessionRow::into_domain)
                            .transpose()
    }

    fn open_draw_session(&mut self, group_id: Uuid) -> Result<Option<DrawSession>, CoreError> {
        draw_sessions::table.filter(draw_sessions::group_id.eq(group_id))
                            .filter(draw_sessions::status.ne(DrawStatus::Completed.as_str()))
                            .first::<DrawSessionRow>(self.conn)
                            .optional()
                            .map_err(db_err)?
                            .map(DrawSessionRow::into_domain)
                            .transpose()
    }

    fn insert_contribution(&mut self, contribution: &Contribution) -> Result<(), CoreError> {
        diesel::insert_into(contributions::table).values(ContributionRow::from_domain(contribution))
                                                 .execute(self.conn)
                                                 .map_err(db_err)?;
        Ok(())
    }

    fn update_contribution(&mut self, contribution: &Contribution) -> Result<(), CoreError> {
        let updated = diesel::update(contributions::table.find(contribution.id()))
            .set(ContributionRow::from_domain(contribution))
            .execute(self.conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(CoreError::Storage(format!("aporte no encontrado: {}", contribution.id())));
        }
        Ok(())
    }

    fn find_contribution(&mut self, user_id: Uuid, group_id: Uuid, period: &str)
                         -> Result<Option<Contribution>, CoreError> {
        contributions::table.filter(contributions::user_id.eq(user_id))
                            .filter(contributions::group_id.eq(group_id))
                            .filter(contributions::period.eq(period))
                            .first::<ContributionRow>(self.conn)
                            .optional()
                            .map_err(db_err)?
                            .map(ContributionRow::into_domain)
                            .transpose()
    }

    fn contributions_of_period(&mut self, group_id: Uuid, period: &str) -> Result<Vec<Contribution>, CoreError> {
        contributions::table.filter(contributions::group_id.eq(group_id))
                            .filter(contributions::period.eq(period))
                            .order(contributions::created_at.asc())
                            .load::<ContributionRow>(self.conn)
                            .map_err(db_err)?
                            .into_iter()
                            .map(ContributionRow::into_domain)
                            .collect()
    }

    fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), CoreError> {
        diesel::insert_into(deliveries::table).values(DeliveryRow::from_domain(delivery))
                                              .execute(self.conn)
                                              .map_err(db_err)?;
        debug!("insert_delivery: {} ({})", delivery.id(), delivery.cycle_label());
        Ok(())
    }

    fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), CoreError> {
        let updated = diesel::update(deliveries::table.find(delivery.id()))
            .set(DeliveryRow::from_domain(delivery))
            .execute(self.conn)
            .map_err(db_err)?;
        if updated == 0 {
            return Err(CoreError::Storage(format!("entrega no encontrada: {}", delivery.id())));
        }
        Ok(())
    }

    fn find_delivery(&mut self, group_id: Uuid, cycle_label: &str) -> Result<Option<Delivery>, CoreError> {
        deliveries::table.filter(deliveries::group_id.eq(group_id))
                         .filter(deliveries::cycle_label.eq(cycle_label))
                         .first::<DeliveryRow>(self.conn)
                         .optional()
                         .map_err(db_err)?
                         .map(DeliveryRow::into_domain)
                         .transpose()
    }

    fn deliveries_of_group(&mut self, group_id: Uuid) -> Result<Vec<Delivery>, CoreError> {
        deliveries::table.filter(deliveries::group_id.eq(group_id))
                         .order(deliveries::created_at.asc())
                         .load::<DeliveryRow>(self.conn)
                         .map_err(db_err)?
                         .into_iter()
                         .map(DeliveryRow::into_domain)
                         .collect()
    }
}

// ---------------------------------------------------------------------------
// Catálogo de planes
// ---------------------------------------------------------------------------

/// Lector Postgres del catálogo de planes. El CRUD del catálogo pertenece a
/// otro subsistema; aquí solo lectura más un alta mínima para seeding.
pub struct PgPlanCatalog<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgPlanCatalog<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Alta/actualización de un plan (seeding operativo y pruebas).
    pub fn save_plan(&self, plan: &Plan) -> Result<(), CoreError> {
        let mut conn = self.provider
                           .connection()
                           .map_err(|e| CoreError::Storage(e.to_string()))?;
        let row = PlanRow { id: plan.id(),
                            name: plan.name().to_string(),
                            duration_cycles: plan.duration_cycles(),
                            price_cents: plan.price_cents(),
                            active: plan.is_active(),
                            created_at: Utc::now() };
        diesel::insert_into(plans::table).values(&row)
                                         .on_conflict(plans::id)
                                         .do_update()
                                         .set(&row)
                                         .execute(&mut conn)
                                         .map_err(db_err)?;
        Ok(())
    }
}

impl PgPlanCatalog<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> PlanCatalog for PgPlanCatalog<P> {
    fn active_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, CoreError> {
        let mut conn = self.provider
                           .connection()
                           .map_err(|e| CoreError::Storage(e.to_string()))?;
        let row = plans::table.find(plan_id)
                              .filter(plans::active.eq(true))
                              .first::<PlanRow>(&mut conn)
                              .optional()
                              .map_err(db_err)?;
        row.map(|r| Plan::restore(r.id, r.name, r.duration_cycles, r.price_cents, r.active).map_err(corrupt))
           .transpose()
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Construye un pool Postgres y corre las migraciones pendientes en el
/// primer checkout. Ajusta `min > max` hacia `min = max` avisando por log.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let min = min_size.max(1);
    let max = max_size.max(1);
    if min > max {
        warn!("pool: min_size {min} > max_size {max}, ajustando min = max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min.min(max)))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee `DbConfig` y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    config::init_dotenv();
    let cfg = config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
