//! Propiedades de concurrencia: la capacidad nunca se desborda bajo altas
//! paralelas y el avance de ciclo es idempotente por período.

use cadena_core::{CircleEngine, CircleStore, InMemoryPlanCatalog, InMemoryStore, NoopRevealChannel};
use cadena_domain::{cycle_label, GroupStatus, Plan};
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

#[test]
fn parallel_joins_never_overshoot_capacity() {
    // N altas paralelas contra capacidad K < N: exactamente K entran al
    // primer grupo y el resto abre otro.
    const N: usize = 8;
    const K: i32 = 5;

    let plan = Plan::new("Plan concurrente", K, 5000).unwrap();
    let plan_id = plan.id();
    let engine = Arc::new(CircleEngine::new(InMemoryStore::new(),
                                            InMemoryPlanCatalog::with_plans([plan]),
                                            NoopRevealChannel));

    let handles: Vec<_> = (0..N).map(|_| {
                                    let engine = Arc::clone(&engine);
                                    thread::spawn(move || engine.join(Uuid::new_v4(), plan_id).unwrap())
                                })
                                .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut group_ids: Vec<Uuid> = results.iter().map(|r| r.group_id).collect();
    group_ids.sort_unstable();
    group_ids.dedup();
    assert_eq!(group_ids.len(), 2, "un grupo lleno y uno en formación");

    for gid in &group_ids {
        let (group, count) = engine.store()
                                   .transaction(|tx| Ok((tx.find_group(*gid)?.unwrap(), tx.member_count(*gid)?)))
                                   .unwrap();
        assert!(count <= K as i64, "capacidad jamás desbordada");
        match group.status() {
            GroupStatus::Full => assert_eq!(count, K as i64),
            GroupStatus::Forming => assert_eq!(count, (N as i64) - (K as i64)),
            other => panic!("estado inesperado: {other}"),
        }
    }
}

#[test]
fn concurrent_draws_admit_exactly_one() {
    const K: i32 = 4;
    let plan = Plan::new("Plan sorteo", K, 5000).unwrap();
    let plan_id = plan.id();
    let engine = Arc::new(CircleEngine::new(InMemoryStore::new(),
                                            InMemoryPlanCatalog::with_plans([plan]),
                                            NoopRevealChannel));
    let mut group_id = None;
    for _ in 0..K {
        group_id = Some(engine.join(Uuid::new_v4(), plan_id).unwrap().group_id);
    }
    let group_id = group_id.unwrap();

    let handles: Vec<_> = (0..4).map(|_| {
                                    let engine = Arc::clone(&engine);
                                    thread::spawn(move || engine.start_draw(group_id, Uuid::new_v4()))
                                })
                                .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "solo un sorteo gana; el resto recibe conflicto de estado");
}

#[test]
fn double_advance_seeds_period_once() {
    const K: i32 = 3;
    let plan = Plan::new("Plan idempotencia", K, 5000).unwrap();
    let plan_id = plan.id();
    let engine = CircleEngine::new(InMemoryStore::new(),
                                   InMemoryPlanCatalog::with_plans([plan]),
                                   NoopRevealChannel);
    let mut group_id = None;
    for _ in 0..K {
        group_id = Some(engine.join(Uuid::new_v4(), plan_id).unwrap().group_id);
    }
    let group_id = group_id.unwrap();
    engine.start_draw(group_id, Uuid::new_v4()).unwrap();

    let first = engine.advance_cycle(group_id).unwrap();
    assert_eq!(first.new_cycle, 2);
    let second = engine.advance_cycle(group_id).unwrap();
    assert_eq!(second.new_cycle, 3, "cada invocación avanza exactamente 1, nunca 2");

    // las obligaciones del ciclo 2 se sembraron una sola vez
    let rows = engine.store()
                     .transaction(|tx| tx.contributions_of_period(group_id, &cycle_label(2)))
                     .unwrap();
    assert_eq!(rows.len(), K as usize);
}
