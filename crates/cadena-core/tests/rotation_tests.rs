//! Planificador de rotación: corrida por lotes con fallos aislados y
//! conciliación de pagos contra las obligaciones sembradas.

use cadena_core::{ApprovedPayment, CircleEngine, CoreError, InMemoryPlanCatalog, InMemoryStore, NoopRevealChannel};
use cadena_domain::{cycle_label, ContributionStatus, DeliveryStatus, Plan};
use uuid::Uuid;

type Engine = CircleEngine<InMemoryStore, InMemoryPlanCatalog, NoopRevealChannel>;

fn engine_with_plans(plans: Vec<Plan>) -> Engine {
    CircleEngine::new(InMemoryStore::new(), InMemoryPlanCatalog::with_plans(plans), NoopRevealChannel)
}

fn fill_and_start(engine: &Engine, plan_id: Uuid, duration: i32) -> (Uuid, Vec<Uuid>) {
    let mut users = Vec::new();
    let mut group_id = None;
    for _ in 0..duration {
        let user = Uuid::new_v4();
        group_id = Some(engine.join(user, plan_id).unwrap().group_id);
        users.push(user);
    }
    let group_id = group_id.unwrap();
    engine.start_draw(group_id, Uuid::new_v4()).unwrap();
    (group_id, users)
}

#[test]
fn run_period_advances_every_running_group_independently() {
    let plan_a = Plan::new("Plan A", 2, 4000).unwrap();
    let plan_b = Plan::new("Plan B", 3, 6000).unwrap();
    let (id_a, id_b) = (plan_a.id(), plan_b.id());
    let engine = engine_with_plans(vec![plan_a, plan_b]);

    let (group_a, _) = fill_and_start(&engine, id_a, 2);
    let (group_b, _) = fill_and_start(&engine, id_b, 3);
    // un grupo en formación no participa de la corrida
    let forming = engine.join(Uuid::new_v4(), id_b).unwrap().group_id;
    assert_ne!(forming, group_b);

    let report = engine.run_period().unwrap();
    assert_eq!(report.advanced.len(), 2);
    assert!(report.failures.is_empty());
    for advance in &report.advanced {
        assert_eq!(advance.new_cycle, 2);
        assert!(!advance.completed);
    }

    // segunda corrida: el grupo de duración 2 completa, el de 3 sigue
    let report = engine.run_period().unwrap();
    let of_a = report.advanced.iter().find(|a| a.group_id == group_a).unwrap();
    assert!(of_a.completed);
    let of_b = report.advanced.iter().find(|a| a.group_id == group_b).unwrap();
    assert_eq!((of_b.new_cycle, of_b.completed), (3, false));

    // tercera corrida: sólo queda el grupo B, que completa
    let report = engine.run_period().unwrap();
    assert_eq!(report.advanced.len(), 1);
    assert!(report.advanced[0].completed);
}

#[test]
fn confirm_payment_settles_seeded_contribution() {
    let plan = Plan::new("Plan pago", 2, 4000).unwrap();
    let plan_id = plan.id();
    let engine = engine_with_plans(vec![plan]);
    let (group_id, users) = fill_and_start(&engine, plan_id, 2);
    engine.advance_cycle(group_id).unwrap();

    let period = cycle_label(2);
    let contribution = engine.confirm_payment(ApprovedPayment { user_id: users[0],
                                                                group_id,
                                                                period: period.clone(),
                                                                amount_cents: 4000 })
                             .unwrap();
    assert_eq!(contribution.status(), ContributionStatus::Confirmed);

    let obligations = engine.period_obligations(group_id, 2).unwrap();
    assert_eq!((obligations.confirmed, obligations.pending), (1, 1));
    assert!(!obligations.settled());

    engine.confirm_payment(ApprovedPayment { user_id: users[1],
                                             group_id,
                                             period,
                                             amount_cents: 4000 })
          .unwrap();
    let obligations = engine.period_obligations(group_id, 2).unwrap();
    assert!(obligations.settled());
}

#[test]
fn confirm_payment_is_idempotent() {
    let plan = Plan::new("Plan doble", 2, 4000).unwrap();
    let plan_id = plan.id();
    let engine = engine_with_plans(vec![plan]);
    let (group_id, users) = fill_and_start(&engine, plan_id, 2);
    engine.advance_cycle(group_id).unwrap();

    let payment = ApprovedPayment { user_id: users[0],
                                    group_id,
                                    period: cycle_label(2),
                                    amount_cents: 4000 };
    let first = engine.confirm_payment(payment.clone()).unwrap();
    let second = engine.confirm_payment(payment).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(first.settled_at(), second.settled_at());
}

#[test]
fn rejected_payment_can_be_reapproved() {
    let plan = Plan::new("Plan rechazo", 2, 4000).unwrap();
    let plan_id = plan.id();
    let engine = engine_with_plans(vec![plan]);
    let (group_id, users) = fill_and_start(&engine, plan_id, 2);
    engine.advance_cycle(group_id).unwrap();

    let period = cycle_label(2);
    let rejected = engine.reject_payment(users[0], group_id, &period).unwrap();
    assert_eq!(rejected.status(), ContributionStatus::Rejected);

    // la re-aprobación manda sobre el rechazo previo
    let confirmed = engine.confirm_payment(ApprovedPayment { user_id: users[0],
                                                             group_id,
                                                             period: period.clone(),
                                                             amount_cents: 4000 })
                          .unwrap();
    assert_eq!(confirmed.status(), ContributionStatus::Confirmed);

    // rechazar lo confirmado es transición inválida
    let err = engine.reject_payment(users[0], group_id, &period).unwrap_err();
    assert!(matches!(err, CoreError::Domain(_)));
}

#[test]
fn delivery_fulfilled_once() {
    let plan = Plan::new("Plan entrega", 2, 4000).unwrap();
    let plan_id = plan.id();
    let engine = engine_with_plans(vec![plan]);
    let (group_id, _) = fill_and_start(&engine, plan_id, 2);

    // el sorteo abrió el ciclo 1 con su entrega pendiente
    let delivered = engine.fulfill_delivery(group_id, 1).unwrap();
    assert_eq!(delivered.status(), DeliveryStatus::Entregado);

    // entregar dos veces es transición inválida; un ciclo sin entrega se
    // reporta como no encontrado
    assert!(matches!(engine.fulfill_delivery(group_id, 1).unwrap_err(), CoreError::Domain(_)));
    assert!(matches!(engine.fulfill_delivery(group_id, 2).unwrap_err(),
                     CoreError::DeliveryNotFound { .. }));
}

#[test]
fn reject_unknown_contribution_reported() {
    let plan = Plan::new("Plan vacío", 2, 4000).unwrap();
    let plan_id = plan.id();
    let engine = engine_with_plans(vec![plan]);
    let (group_id, users) = fill_and_start(&engine, plan_id, 2);

    let err = engine.reject_payment(users[0], group_id, "ciclo-09").unwrap_err();
    assert!(matches!(err, CoreError::ContributionNotFound { .. }));
}
