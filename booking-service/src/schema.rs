diesel::table! {
    inventory_levels (tenant_id, room_type_id, date) {
        tenant_id -> Uuid,
        room_type_id -> Uuid,
        date -> Date,
        available_units -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    rates (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        room_type_id -> Uuid,
        rate_plan_id -> Uuid,
        date -> Date,
        price_cents -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        guest_id -> Uuid,
        room_type_id -> Uuid,
        rate_plan_id -> Uuid,
        start_date -> Date,
        end_date -> Date,
        num_adults -> Int4,
        num_children -> Int4,
        status -> Varchar,
        total_cost_cents -> Int8,
        notes -> Nullable<Text>,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    inventory_levels,
    rates,
    reservations,
);
