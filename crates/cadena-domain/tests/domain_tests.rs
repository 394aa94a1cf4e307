//! Pruebas de integración del dominio: ciclo de vida completo de las
//! entidades combinadas, sin motor ni almacenamiento.

use cadena_domain::{cycle_label, Contribution, ContributionStatus, Delivery, DeliveryStatus, DrawSession, DrawStatus,
                    Group, GroupStatus, Membership, Plan, PositionAssignment, RevealStep};
use chrono::Utc;
use uuid::Uuid;

#[test]
fn plan_duration_is_group_capacity() {
    let plan = Plan::new("Refrigeradora 12 meses", 12, 15000).unwrap();
    let group = Group::new(plan.duration_cycles(), plan.price_cents()).unwrap();
    assert_eq!(group.duration_cycles(), 12);
    assert_eq!(group.contribution_cents(), 15000);
    assert_eq!(group.remaining_capacity(0), 12);
}

#[test]
fn full_rotation_round_trip() {
    let mut group = Group::new(3, 5000).unwrap();
    let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let mut members: Vec<Membership> = users.iter().map(|u| Membership::new(*u, group.id())).collect();

    group.seal().unwrap();

    // sorteo: permutación fija 2,3,1 para la prueba
    let perm = [2, 3, 1];
    let assignments: Vec<PositionAssignment> =
        users.iter().zip(perm).map(|(u, p)| PositionAssignment { user_id: *u, position: p }).collect();
    let reveal: Vec<RevealStep> =
        assignments.iter().enumerate().map(|(i, a)| RevealStep { position: a.position, delay_ms: 800 + 700 * i as u32 }).collect();
    let mut session = DrawSession::new(group.id(), Uuid::new_v4(), assignments, reveal).unwrap();
    for (m, p) in members.iter_mut().zip(perm) {
        m.assign_position(p, group.duration_cycles()).unwrap();
    }
    group.start(Utc::now()).unwrap();
    assert_eq!(group.status(), GroupStatus::Running);
    assert_eq!(group.current_cycle(), 1);

    // cada ciclo: la entrega corresponde al miembro con position == ciclo
    for cycle in 1..=3 {
        let label = cycle_label(cycle);
        let recipient = members.iter().find(|m| m.position() == Some(cycle)).unwrap();
        let delivery = Delivery::new(recipient.user_id(), group.id(), label.clone()).unwrap();
        assert_eq!(delivery.status(), DeliveryStatus::Pending);
        assert_eq!(delivery.cycle_label(), label);
        for m in &members {
            let c = Contribution::new(m.user_id(), group.id(), label.clone(), group.contribution_cents()).unwrap();
            assert_eq!(c.status(), ContributionStatus::Pending);
        }
        if cycle > 1 {
            group.advance_to(cycle).unwrap();
        }
    }
    group.complete(Utc::now()).unwrap();
    assert_eq!(group.status(), GroupStatus::Completed);

    // la revelación es contabilidad aparte: el resultado no cambia
    let before = session.final_positions().to_vec();
    for _ in 0..3 {
        session.advance_step().unwrap();
    }
    assert_eq!(session.status(), DrawStatus::Completed);
    assert_eq!(session.final_positions(), before.as_slice());
}

#[test]
fn cycle_labels_are_stable() {
    assert_eq!(cycle_label(1), "ciclo-01");
    assert_eq!(cycle_label(12), "ciclo-12");
}
