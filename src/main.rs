//! Driver de escenarios del motor de cadenas: recorre formación, sorteo,
//! rotación y conciliación contra el backend en memoria, imprimiendo cada
//! paso. Con el feature `pg_demo` y DATABASE_URL, repite el recorrido
//! contra Postgres.

use cadena_core::{ApprovedPayment, CircleEngine, CircleStore, InMemoryPlanCatalog, InMemoryRevealChannel,
                  InMemoryStore, PlanCatalog, RevealChannel};
use cadena_domain::{cycle_label, GroupStatus, Plan};
use uuid::Uuid;

fn run_scenarios<S, C, R>(engine: &CircleEngine<S, C, R>, plan_id: Uuid, duration: i32)
    where S: CircleStore,
          C: PlanCatalog,
          R: RevealChannel
{
    // Formación: duration altas llenan y sellan un grupo; una más abre otro
    let mut users = Vec::new();
    let mut group_id = None;
    for _ in 0..duration {
        let user = Uuid::new_v4();
        let result = engine.join(user, plan_id).expect("alta");
        users.push(user);
        group_id = Some(result.group_id);
    }
    let group_id = group_id.unwrap();
    let group = engine.store()
                      .transaction(|tx| tx.find_group(group_id))
                      .expect("tx")
                      .expect("grupo");
    assert_eq!(group.status(), GroupStatus::Full);
    println!("[formación] grupo {group_id} sellado con {duration} miembros");

    let overflow = engine.join(Uuid::new_v4(), plan_id).expect("alta de desborde");
    assert_ne!(overflow.group_id, group_id);
    println!("[formación] desborde abre grupo {} en formación", overflow.group_id);

    // Sorteo: permutación comprometida junto con Full -> Running
    let session = engine.start_draw(group_id, Uuid::new_v4()).expect("sorteo");
    println!("[sorteo] sesión {} con {} pasos", session.id(), session.total_steps());
    for a in session.final_positions() {
        println!("  usuario={} posición={}", a.user_id, a.position);
    }
    for _ in 0..session.total_steps() {
        let s = engine.advance_reveal(session.id()).expect("revelación");
        println!("[revelación] paso {}/{} ({})", s.current_step(), s.total_steps(), s.status());
    }

    // Rotación: cada período crea la entrega del turno y siembra aportes
    for cycle in 2..=duration {
        let advance = engine.advance_cycle(group_id).expect("avance");
        let delivery = engine.store()
                             .transaction(|tx| tx.find_delivery(group_id, &cycle_label(advance.new_cycle)))
                             .expect("tx")
                             .expect("entrega");
        println!("[rotación] ciclo {} -> {}: entrega a {}",
                 advance.previous_cycle,
                 advance.new_cycle,
                 delivery.user_id());

        // Conciliación: todos pagan el período recién abierto
        for user in &users {
            engine.confirm_payment(ApprovedPayment { user_id: *user,
                                                     group_id,
                                                     period: cycle_label(cycle),
                                                     amount_cents: group.contribution_cents() })
                  .expect("conciliación");
        }
        let obligations = engine.period_obligations(group_id, cycle).expect("obligaciones");
        println!("[conciliación] {} cubierto={}", obligations.period, obligations.settled());
    }

    let last = engine.advance_cycle(group_id).expect("cierre");
    assert!(last.completed);
    println!("[rotación] grupo {group_id} completado");
}

fn main() {
    let _ = dotenvy::dotenv();
    let duration = 3;
    let plan = Plan::new("Electrodoméstico 3 ciclos", duration, 5000).expect("plan");
    let plan_id = plan.id();

    println!("== recorrido en memoria ==");
    let engine = CircleEngine::new(InMemoryStore::new(),
                                   InMemoryPlanCatalog::with_plans([plan.clone()]),
                                   InMemoryRevealChannel::new());
    run_scenarios(&engine, plan_id, duration);
    println!("eventos publicados al canal: {}", engine.reveal_channel().published().len());

    #[cfg(feature = "pg_demo")]
    {
        use cadena_core::NoopRevealChannel;
        use cadena_persistence::pg::{PgCircleStore, PgPlanCatalog};

        if std::env::var("DATABASE_URL").is_ok() {
            println!("== recorrido sobre Postgres ==");
            let pool = cadena_persistence::build_dev_pool_from_env().expect("pool");
            let catalog = PgPlanCatalog::from_pool(pool.clone());
            let plan = Plan::new("Electrodoméstico 3 ciclos (pg)", duration, 5000).expect("plan");
            let plan_id = plan.id();
            catalog.save_plan(&plan).expect("seed plan");
            let engine = CircleEngine::new(PgCircleStore::from_pool(pool), catalog, NoopRevealChannel);
            run_scenarios(&engine, plan_id, duration);
        } else {
            eprintln!("pg_demo: DATABASE_URL no definido, se omite el recorrido Postgres");
        }
    }
}
