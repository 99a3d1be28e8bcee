//! Helpers for the database-backed tests.
//!
//! Each test returns early unless `TEST_DATABASE_URL` points at a disposable
//! Postgres database; migrations are applied on first use.

#![allow(dead_code)]

use bigdecimal::BigDecimal;
use delivery_service::api::DbPool;
use delivery_service::schema::*;
use diesel::prelude::*;
use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static SEQ: AtomicU32 = AtomicU32::new(0);

pub fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}

pub async fn pool() -> Option<DbPool> {
    let url = database_url()?;
    let migrate_url = url.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&migrate_url).expect("connect for migrations");
        conn.run_pending_migrations(MIGRATIONS).expect("run migrations");
    })
    .await
    .unwrap();

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
    Some(Pool::builder().max_size(4).build(manager).await.unwrap())
}

pub fn unique(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}-{nanos}-{}@example.com", SEQ.fetch_add(1, Ordering::SeqCst))
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

/// Inserts a customer and returns its id and email.
pub async fn insert_customer(pool: &DbPool) -> (i32, String) {
    let mut conn = pool.get().await.unwrap();
    let email = unique("customer");
    let id = diesel::insert_into(customers::table)
        .values((customers::name.eq("Ana"), customers::email.eq(&email)))
        .returning(customers::id)
        .get_result::<i32>(&mut conn)
        .await
        .unwrap();
    (id, email)
}
