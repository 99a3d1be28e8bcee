diesel::table! {
    customers (id) {
        id -> Int4,
        name -> Varchar,
        email -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    drivers (id) {
        id -> Int4,
        name -> Varchar,
        email -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    menu_item_ratings (id) {
        id -> Int4,
        customer_id -> Int4,
        menu_item_id -> Int4,
        rating -> Int4,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    menu_items (id) {
        id -> Int4,
        restaurant_id -> Int4,
        name -> Varchar,
        price -> Numeric,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notification_settings (id) {
        id -> Int4,
        customer_id -> Int4,
        food_delivered -> Bool,
        new_menu_item_in_favorite_rest -> Bool,
        subscribe_app -> Bool,
    }
}

diesel::table! {
    notifications (id) {
        id -> Int4,
        #[sql_name = "type"]
        kind -> Varchar,
        message -> Text,
        customer_id -> Nullable<Int4>,
        created_at -> Timestamptz,
        delivered_at -> Nullable<Timestamptz>,
        claimed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    order_items (id) {
        id -> Int4,
        order_id -> Int4,
        menu_item_id -> Int4,
        quantity -> Int4,
        price -> Numeric,
    }
}

diesel::table! {
    orders (id) {
        id -> Int4,
        customer_id -> Int4,
        restaurant_id -> Int4,
        driver_id -> Nullable<Int4>,
        status -> Varchar,
        total_price -> Numeric,
        payment_id -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Int4,
        amount -> Numeric,
        status -> Varchar,
        provider -> Varchar,
        method_token -> Nullable<Varchar>,
        payment_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    restaurant_ratings (id) {
        id -> Int4,
        customer_id -> Int4,
        restaurant_id -> Int4,
        rating -> Int4,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    restaurants (id) {
        id -> Int4,
        name -> Varchar,
        email -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(menu_item_ratings -> customers (customer_id));
diesel::joinable!(menu_item_ratings -> menu_items (menu_item_id));
diesel::joinable!(menu_items -> restaurants (restaurant_id));
diesel::joinable!(notification_settings -> customers (customer_id));
diesel::joinable!(notifications -> customers (customer_id));
diesel::joinable!(order_items -> menu_items (menu_item_id));
diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(orders -> customers (customer_id));
diesel::joinable!(orders -> drivers (driver_id));
diesel::joinable!(orders -> payments (payment_id));
diesel::joinable!(orders -> restaurants (restaurant_id));
diesel::joinable!(restaurant_ratings -> customers (customer_id));
diesel::joinable!(restaurant_ratings -> restaurants (restaurant_id));

diesel::allow_tables_to_appear_in_same_query!(
    customers,
    drivers,
    menu_item_ratings,
    menu_items,
    notification_settings,
    notifications,
    order_items,
    orders,
    payments,
    restaurant_ratings,
    restaurants,
);
