//! Paridad con el backend en memoria: los escenarios del motor producen el
//! mismo estado observable sobre Postgres. Requieren DATABASE_URL; sin él,
//! cada prueba se omite.

mod test_support;

use cadena_core::{ApprovedPayment, CircleEngine, CircleStore, CoreError, NoopRevealChannel};
use cadena_domain::{cycle_label, ContributionStatus, GroupStatus, Plan};
use cadena_persistence::pg::{PgCircleStore, PgPlanCatalog, PoolProvider};
use test_support::with_clean_db;
use uuid::Uuid;

type Engine = CircleEngine<PgCircleStore<PoolProvider>, PgPlanCatalog<PoolProvider>, NoopRevealChannel>;

fn engine_with_plan(pool: &cadena_persistence::PgPool, duration: i32, price: i64) -> (Engine, Uuid) {
    let catalog = PgPlanCatalog::from_pool(pool.clone());
    let plan = Plan::new(format!("Plan parity {duration}"), duration, price).unwrap();
    let plan_id = plan.id();
    catalog.save_plan(&plan).expect("seed plan");
    let store = PgCircleStore::from_pool(pool.clone());
    (CircleEngine::new(store, catalog, NoopRevealChannel), plan_id)
}

#[test]
fn join_fills_and_seals_group() {
    let ran = with_clean_db(|pool| {
        let (engine, plan_id) = engine_with_plan(pool, 3, 5000);
        let mut group_id = None;
        for _ in 0..3 {
            let result = engine.join(Uuid::new_v4(), plan_id).unwrap();
            assert_eq!(result.position, None);
            group_id = Some(result.group_id);
        }
        let group_id = group_id.unwrap();
        let group = engine.store()
                          .transaction(|tx| tx.find_group(group_id))
                          .unwrap()
                          .unwrap();
        assert_eq!(group.status(), GroupStatus::Full);
        assert_eq!(engine.store().transaction(|tx| tx.member_count(group_id)).unwrap(), 3);
    });
    if ran.is_none() {
        eprintln!("DATABASE_URL no definido: omitiendo test");
    }
}

#[test]
fn draw_and_rotation_round_trip() {
    let ran = with_clean_db(|pool| {
        let (engine, plan_id) = engine_with_plan(pool, 3, 5000);
        let mut group_id = None;
        for _ in 0..3 {
            group_id = Some(engine.join(Uuid::new_v4(), plan_id).unwrap().group_id);
        }
        let group_id = group_id.unwrap();

        let session = engine.start_draw(group_id, Uuid::new_v4()).unwrap();
        let mut positions: Vec<i32> = session.final_positions().iter().map(|a| a.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3]);

        // segundo sorteo: el grupo ya corre
        let err = engine.start_draw(group_id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::GroupNotReady(_)));

        // rotación completa
        for cycle in 2..=3 {
            let advance = engine.advance_cycle(group_id).unwrap();
            assert_eq!((advance.new_cycle, advance.completed), (cycle, false));
            let delivery = engine.store()
                                 .transaction(|tx| tx.find_delivery(group_id, &cycle_label(cycle)))
                                 .unwrap()
                                 .expect("entrega del ciclo");
            let members = engine.store().transaction(|tx| tx.memberships_of_group(group_id)).unwrap();
            let recipient = members.iter().find(|m| m.position() == Some(cycle)).unwrap();
            assert_eq!(delivery.user_id(), recipient.user_id());
        }
        let last = engine.advance_cycle(group_id).unwrap();
        assert!(last.completed);
        let group = engine.store()
                          .transaction(|tx| tx.find_group(group_id))
                          .unwrap()
                          .unwrap();
        assert_eq!(group.status(), GroupStatus::Completed);
    });
    if ran.is_none() {
        eprintln!("DATABASE_URL no definido: omitiendo test");
    }
}

#[test]
fn reconciliation_against_seeded_rows() {
    let ran = with_clean_db(|pool| {
        let (engine, plan_id) = engine_with_plan(pool, 2, 4000);
        let mut users = Vec::new();
        let mut group_id = None;
        for _ in 0..2 {
            let user = Uuid::new_v4();
            group_id = Some(engine.join(user, plan_id).unwrap().group_id);
            users.push(user);
        }
        let group_id = group_id.unwrap();
        engine.start_draw(group_id, Uuid::new_v4()).unwrap();
        engine.advance_cycle(group_id).unwrap();

        // aprobación sobre fila sembrada
        let period = cycle_label(2);
        let confirmed = engine.confirm_payment(ApprovedPayment { user_id: users[0],
                                                                 group_id,
                                                                 period: period.clone(),
                                                                 amount_cents: 4000 })
                              .unwrap();
        assert_eq!(confirmed.status(), ContributionStatus::Confirmed);

        // aprobación adelantada a la siembra de un período futuro: nace
        // confirmada y la siembra posterior no la duplica
        let future = cycle_label(9);
        let early = engine.confirm_payment(ApprovedPayment { user_id: users[1],
                                                             group_id,
                                                             period: future.clone(),
                                                             amount_cents: 4000 })
                          .unwrap();
        assert_eq!(early.status(), ContributionStatus::Confirmed);
        assert!(early.settled_at().is_some());
        let rows = engine.store()
                         .transaction(|tx| tx.contributions_of_period(group_id, &future))
                         .unwrap();
        assert_eq!(rows.len(), 1);
    });
    if ran.is_none() {
        eprintln!("DATABASE_URL no definido: omitiendo test");
    }
}

#[test]
fn parallel_joins_respect_capacity_via_row_locks() {
    let ran = with_clean_db(|pool| {
        const N: usize = 6;
        const K: i32 = 4;
        let (engine, plan_id) = engine_with_plan(pool, K, 5000);
        let engine = std::sync::Arc::new(engine);

        let handles: Vec<_> = (0..N).map(|_| {
                                        let engine = std::sync::Arc::clone(&engine);
                                        std::thread::spawn(move || engine.join(Uuid::new_v4(), plan_id).unwrap())
                                    })
                                    .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut group_ids: Vec<Uuid> = results.iter().map(|r| r.group_id).collect();
        group_ids.sort_unstable();
        group_ids.dedup();
        assert_eq!(group_ids.len(), 2);
        for gid in &group_ids {
            let count = engine.store().transaction(|tx| tx.member_count(*gid)).unwrap();
            assert!(count <= K as i64, "capacidad jamás desbordada");
        }
    });
    if ran.is_none() {
        eprintln!("DATABASE_URL no definido: omitiendo test");
    }
}
