/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::BigInt;
use crate::fixtures::migrate_once;
use nixopus_server::db::create_shared_connection_pool;

#[derive(QueryableByName, Debug)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[test]
fn test_migrations_are_idempotent_and_create_tables() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return;
    };
    migrate_once(&database_url);
    let pool = create_shared_connection_pool(&database_url, 2).expect("Failed to create pool");
    assert_eq!(pool.run_migrations().expect("Second migration run failed"), 0);

    let mut conn = pool.get().expect("Failed to get connection");
    let tables: Count = sql_query(
        "SELECT COUNT(*) AS count FROM information_schema.tables \
         WHERE table_name IN ('organization_settings', 'health_checks', 'health_check_results', \
         'application_logs', 'audit_logs', 'extension_logs')",
    )
    .get_result(&mut conn)
    .expect("Failed to inspect schema");
    assert_eq!(tables.count, 6);
}

#[test]
fn test_pool_hands_out_concurrent_connections() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return;
    };
    let pool = create_shared_connection_pool(&database_url, 3).expect("Failed to create pool");

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut conn = pool.get().expect("Failed to get connection");
                let one: Count = sql_query("SELECT 1::BIGINT AS count")
                    .get_result(&mut conn)
                    .expect("Query failed");
                one.count
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("thread panicked"), 1);
    }
}
