use anyhow::Context;
use helpdesk_query_proxy::app::schema::describe_schema;
use helpdesk_query_proxy::infra::config;
use helpdesk_query_proxy::QueryExecutor;
use sqlx::Executor;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight -- [--apply <schema.sql>]\n\
         \n\
         Requires env vars:\n\
           DATABASE_HOST, DATABASE_NAME, DATABASE_USER\n\
         Optional:\n\
           DATABASE_PORT (5432), DATABASE_PASSWORD, DATABASE_SSL (false)\n\
         \n\
         --apply runs every statement of the given file (e.g. schema/helpdesk.sql)\n\
         before listing the tables.\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    let apply = match args.iter().position(|a| a == "--apply") {
        Some(i) => match args.get(i + 1) {
            Some(path) => Some(path.clone()),
            None => usage_and_exit(),
        },
        None => None,
    };

    let connection = config::default_connection()?.ok_or_else(|| {
        anyhow::anyhow!("DATABASE_HOST, DATABASE_NAME and DATABASE_USER must be set")
    })?;
    let settings = config::executor_settings()?;

    println!("> Preflight:");
    println!("  DATABASE_HOST={}", connection.host);
    println!("  DATABASE_PORT={}", connection.port);
    println!("  DATABASE_NAME={}", connection.database);
    println!("  DATABASE_USER={}", connection.username);
    println!("  DATABASE_SSL={}", connection.ssl);
    println!("  PROXY_TRUST_MODE={:?}", settings.policy.mode);

    // Same pool construction the API server uses.
    let executor = QueryExecutor::new(settings);
    executor
        .reconfigure(&connection)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot connect to {}:{}: {}", connection.host, connection.port, e))?;
    let pool = executor
        .pool()
        .await
        .ok_or_else(|| anyhow::anyhow!("pool missing after successful connect"))?;

    let version: String = sqlx::query_scalar("SELECT version()").fetch_one(&pool).await?;
    println!("  Server: {}", version);

    if let Some(path) = apply {
        let sql = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
        pool.execute(sql.as_str())
            .await
            .with_context(|| format!("Failed to apply {}", path))?;
        println!("  Applied {}", path);
    }

    let tables = describe_schema(&pool, "public").await?;
    if tables.is_empty() {
        eprintln!("  Warning: no tables in schema public. Re-run with --apply schema/helpdesk.sql");
    } else {
        println!("  Tables visible to the proxy:");
        for table in &tables {
            println!(
                "    {} ({} columns, pk: {})",
                table.table_name,
                table.columns.len(),
                if table.primary_key.is_empty() {
                    "-".to_string()
                } else {
                    table.primary_key.join(", ")
                }
            );
        }
    }

    pool.close().await;
    println!("> Preflight OK.");
    Ok(())
}
