//! Esquema Diesel de las cinco relaciones del motor más el catálogo de
//! planes. Mantenido a mano; reemplazable con `diesel print-schema`.

diesel::table! {
    plans (id) {
        id -> Uuid,
        name -> Text,
        duration_cycles -> Int4,
        price_cents -> Int8,
        active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    savings_groups (id) {
        id -> Uuid,
        duration_cycles -> Int4,
        contribution_cents -> Int8,
        status -> Text,
        current_cycle -> Int4,
        started_at -> Nullable<Timestamptz>,
        ended_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    memberships (id) {
        id -> Uuid,
        user_id -> Uuid,
        group_id -> Uuid,
        position -> Nullable<Int4>,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    draw_sessions (id) {
        id -> Uuid,
        group_id -> Uuid,
        initiated_by -> Uuid,
        status -> Text,
        final_positions -> Jsonb,
        reveal_sequence -> Jsonb,
        current_step -> Int4,
        total_steps -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    contributions (id) {
        id -> Uuid,
        user_id -> Uuid,
        group_id -> Uuid,
        period -> Text,
        amount_cents -> Int8,
        status -> Text,
        settled_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    deliveries (id) {
        id -> Uuid,
        user_id -> Uuid,
        group_id -> Uuid,
        cycle_label -> Text,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(memberships -> savings_groups (group_id));
diesel::joinable!(draw_sessions -> savings_groups (group_id));
diesel::joinable!(contributions -> savings_groups (group_id));
diesel::joinable!(deliveries -> savings_groups (group_id));

diesel::allow_tables_to_appear_in_same_query!(
    plans,
    savings_groups,
    memberships,
    draw_sessions,
    contributions,
    deliveries,
);
