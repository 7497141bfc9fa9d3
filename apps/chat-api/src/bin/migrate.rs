//! Migration runner for the chat message store.
//!
//! Usage:
//!   cargo run -p chat-api --bin chat-migrate
//!   cargo run -p chat-api --bin chat-migrate -- --test
//!   cargo run -p chat-api --bin chat-migrate -- --revert
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy). `--test`
//! targets the `<name>_test` database next to the configured one.

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

    let args: Vec<String> = std::env::args().skip(1).collect();
    let has_flag = |flag: &str| args.iter().any(|arg| arg == flag);

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    let database_url = if has_flag("--test") {
        test_database_url(&database_url)
    } else {
        database_url
    };

    let mut conn = PgConnection::establish(&database_url).expect("failed to connect to database");

    if has_flag("--revert") {
        let reverted = conn
            .revert_last_migration(MIGRATIONS)
            .expect("failed to revert migration");
        println!("Reverted: {reverted}");
        return;
    }

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .expect("failed to run migrations");
    match applied.len() {
        0 => println!("Message store is up to date."),
        n => {
            for version in &applied {
                println!("  applied {version}");
            }
            println!("{n} migration(s) applied.");
        }
    }
}

/// Swap the database name in `url` for its `_test` sibling, keeping any
/// query string. Already-suffixed names are left alone.
fn test_database_url(url: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let Some((prefix, name)) = base.rsplit_once('/') else {
        return url.to_string();
    };
    if name.is_empty() || name.ends_with("_test") {
        return url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{name}_test?{query}"),
        None => format!("{prefix}/{name}_test"),
    }
}
