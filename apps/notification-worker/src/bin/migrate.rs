//! Migration runner for the notification store.
//!
//! Usage:
//!   cargo run -p notification-worker --bin notification-migrate
//!   cargo run -p notification-worker --bin notification-migrate -- --revert

use std::path::Path;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    let mut conn = PgConnection::establish(&database_url).expect("failed to connect to database");

    if std::env::args().any(|arg| arg == "--revert") {
        let reverted = conn
            .revert_last_migration(MIGRATIONS)
            .expect("failed to revert migration");
        println!("Reverted: {reverted}");
        return;
    }

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .expect("failed to run migrations");
    for version in &applied {
        println!("  applied {version}");
    }
    println!("{} notification migration(s) applied.", applied.len());
}
