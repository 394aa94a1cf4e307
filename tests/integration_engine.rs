//! Integración de punta a punta sobre los crates públicos: formación,
//! sorteo, rotación y conciliación con el backend en memoria.

use cadena_core::{ApprovedPayment, CircleEngine, CircleStore, InMemoryPlanCatalog, InMemoryRevealChannel,
                  InMemoryStore};
use cadena_domain::{cycle_label, ContributionStatus, DeliveryStatus, DrawStatus, GroupStatus, Plan};
use uuid::Uuid;

#[test]
fn complete_circle_lifecycle() {
    let duration = 4;
    let plan = Plan::new("Plan integración", duration, 12000).unwrap();
    let plan_id = plan.id();
    let engine = CircleEngine::new(InMemoryStore::new(),
                                   InMemoryPlanCatalog::with_plans([plan]),
                                   InMemoryRevealChannel::new());

    // formación
    let mut users = Vec::new();
    let mut group_id = None;
    for _ in 0..duration {
        let user = Uuid::new_v4();
        group_id = Some(engine.join(user, plan_id).unwrap().group_id);
        users.push(user);
    }
    let group_id = group_id.unwrap();

    // sorteo: evento publicado con la misma permutación comprometida
    let session = engine.start_draw(group_id, Uuid::new_v4()).unwrap();
    let events = engine.reveal_channel().published();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].final_positions, session.final_positions().to_vec());

    // revelación animada completa
    for _ in 0..duration {
        engine.advance_reveal(session.id()).unwrap();
    }
    let finished = engine.store()
                         .transaction(|tx| tx.find_draw_session(session.id()))
                         .unwrap()
                         .unwrap();
    assert_eq!(finished.status(), DrawStatus::Completed);

    // rotación completa con pagos de cada período
    for cycle in 2..=duration {
        let advance = engine.advance_cycle(group_id).unwrap();
        assert_eq!(advance.new_cycle, cycle);
        for user in &users {
            let c = engine.confirm_payment(ApprovedPayment { user_id: *user,
                                                             group_id,
                                                             period: cycle_label(cycle),
                                                             amount_cents: 12000 })
                          .unwrap();
            assert_eq!(c.status(), ContributionStatus::Confirmed);
        }
        assert!(engine.period_obligations(group_id, cycle).unwrap().settled());
    }

    // cierre
    let last = engine.advance_cycle(group_id).unwrap();
    assert!(last.completed);
    let group = engine.store().transaction(|tx| tx.find_group(group_id)).unwrap().unwrap();
    assert_eq!(group.status(), GroupStatus::Completed);

    // una entrega por ciclo (el sorteo abre el ciclo 1), cada una para el
    // miembro del turno
    let deliveries = engine.store().transaction(|tx| tx.deliveries_of_group(group_id)).unwrap();
    assert_eq!(deliveries.len(), duration as usize);
    let members = engine.store().transaction(|tx| tx.memberships_of_group(group_id)).unwrap();
    for delivery in &deliveries {
        assert_eq!(delivery.status(), DeliveryStatus::Pending);
        let cycle: i32 = delivery.cycle_label().trim_start_matches("ciclo-").parse().unwrap();
        let recipient = members.iter().find(|m| m.position() == Some(cycle)).unwrap();
        assert_eq!(delivery.user_id(), recipient.user_id());
    }
}
