//! kvmodel Demo Binary
//!
//! Registers a small `User` model on an in-memory store and walks through
//! saves, unique violations, range lookups and prefix queries.

use std::sync::Arc;

use clap::Parser;
use kvmodel::{
    Column, Config, Database, GetByOptions, Lookup, MemoryStore, ModelDef, Query, Value,
};
use tracing_subscriber::{fmt, EnvFilter};

/// kvmodel demo
#[derive(Parser, Debug)]
#[command(name = "kvmodel-demo")]
#[command(about = "Walk through entity saves and index lookups on an in-memory store")]
#[command(version)]
struct Args {
    /// Commit through WATCH/MULTI/EXEC instead of the writer script
    #[arg(long)]
    no_scripting: bool,

    /// Number of users to create
    #[arg(short, long, default_value = "10")]
    users: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvmodel=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::info!("kvmodel demo v{}", kvmodel::VERSION);

    if let Err(e) = run(&args) {
        tracing::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> kvmodel::Result<()> {
    let config = Config::builder()
        .use_scripting(!args.no_scripting)
        .build();
    let store = Arc::new(MemoryStore::new());
    let db = Database::open(config, store.clone());

    // Prefix indexes need the writer script
    let mut email = Column::string().required().unique();
    if !args.no_scripting {
        email = email.prefix().suffix();
    }
    let user = db.register(
        ModelDef::new("User")
            .column("email", email)
            .column("age", Column::integer().index())
            .column("active", Column::boolean().index().default_value(true)),
    )?;

    let session = db.session();
    for i in 0..args.users {
        let entity = session.create(
            &user,
            [
                ("email", Value::from(format!("user{}@example.com", i))),
                ("age", Value::from(20 + (i as i64 % 40))),
            ],
        )?;
        session.save(&entity, false)?;
    }
    tracing::info!("Saved {} users ({} store writes)", args.users, store.write_count());

    let duplicate = session.create(&user, [("email", Value::from("user0@example.com"))])?;
    match session.save(&duplicate, false) {
        Err(e) if e.is_unique_violation() => tracing::info!("Rejected duplicate: {}", e),
        Err(e) => return Err(e),
        Ok(_) => tracing::warn!("Duplicate email was accepted"),
    }

    let adults = session.get_by(
        &user,
        "age",
        Lookup::Range(Some(Value::from(30)), Some(Value::from(39))),
        GetByOptions::limit(0, 5),
    )?;
    tracing::info!("First {} users aged 30-39:", adults.len());
    for entity in &adults {
        tracing::info!("  {:?} {}", entity.id(), entity.get("email")?);
    }

    if !args.no_scripting {
        let matched = Query::new(&user).startswith("email", "user1").count(&session)?;
        tracing::info!("{} emails start with \"user1\"", matched);
    }

    if let Some(first) = session.get_one_by(&user, "email", "user0@example.com")? {
        session.delete(&first)?;
        tracing::info!("Deleted user {:?}", first.id());
    }

    tracing::info!("Store holds {} keys", store.key_count());
    Ok(())
}
