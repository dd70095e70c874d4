use tabletalk::config::{AppConfig, API_KEY_VAR, MODEL_VAR, PROVIDER_VAR};
use tabletalk::llm::{LlmClient, Provider};
use tabletalk::pipeline::Translator;
use tabletalk::schema::introspect;
use tabletalk::session::Session;
use tabletalk::store::stats::{histogram, numeric_columns, render_histogram, table_statistics, DEFAULT_BINS};
use tabletalk::store::{DataStore, SqliteStore};
use tabletalk::AssistantError;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PREVIEW_ROWS: usize = 20;

#[derive(Parser)]
#[command(name = "tabletalk")]
#[command(about = "Ask questions about your tabular data in plain language")]
#[command(version)]
struct Args {
    /// Database file to use (default: the uploaded database if present, else TABLETALK_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// API key for the completion service (or set LLM_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Completion provider: cohere or openai (or set LLM_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Model name (or set LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file as the only table of the upload database
    Upload {
        /// CSV file to upload
        csv_file: PathBuf,

        /// Table name
        #[arg(short, long, default_value = "uploaded_table")]
        table: String,
    },
    /// Show every table's schema, column statistics and numeric distributions
    Overview,
    /// Print the schema document sent to the model
    Schema,
    /// Translate a question into SQL, run it and print the result
    Ask {
        /// The question in natural language
        question: String,

        /// Refine the generated query with a follow-up instruction
        #[arg(long)]
        refine: Option<String>,

        /// Write the final result to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Interactive session with refinement and history
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut overrides = HashMap::new();
    if let Some(provider) = args.provider {
        overrides.insert(PROVIDER_VAR.to_string(), provider.name().to_string());
    }
    if let Some(api_key) = args.api_key {
        overrides.insert(API_KEY_VAR.to_string(), api_key);
    }
    if let Some(model) = args.model {
        overrides.insert(MODEL_VAR.to_string(), model);
    }
    let config = AppConfig::from_env_with(&overrides)?;

    match args.command {
        Commands::Upload { csv_file, table } => upload(&config, args.db, csv_file, &table),
        Commands::Overview => overview(&active_store(&config, args.db)),
        Commands::Schema => {
            let store = active_store(&config, args.db);
            println!("{}", introspect(&store)?);
            Ok(())
        }
        Commands::Ask { question, refine, export } => {
            let store = active_store(&config, args.db);
            let translator = Translator::new(config.llm_client()?);
            ask(&translator, &store, &question, refine.as_deref(), export).await
        }
        Commands::Shell => {
            let mut store = active_store(&config, args.db);
            let translator = Translator::new(config.llm_client()?);
            shell(&config, &translator, &mut store).await
        }
    }
}

/// The explicit `--db`, else the upload database once something was uploaded,
/// else the configured default.
fn active_store(config: &AppConfig, db: Option<PathBuf>) -> SqliteStore {
    let path = db.unwrap_or_else(|| {
        if config.upload_db_path.exists() {
            config.upload_db_path.clone()
        } else {
            config.db_path.clone()
        }
    });
    info!("Using database {}", path.display());
    SqliteStore::new(path)
}

fn upload(config: &AppConfig, db: Option<PathBuf>, csv_file: PathBuf, table: &str) -> Result<()> {
    let path = db.unwrap_or_else(|| config.upload_db_path.clone());
    let store = SqliteStore::create(&path)?;
    let summary = store.replace_with_csv(&csv_file, table)?;
    println!(
        "Uploaded and saved as '{}' in '{}' ({} rows, {} columns)",
        summary.table_name,
        path.display(),
        summary.row_count,
        summary.columns.len()
    );
    Ok(())
}

fn overview(store: &SqliteStore) -> Result<()> {
    let tables = store.list_user_tables()?;
    if tables.is_empty() {
        println!("No tables found in {}", store.path().display());
        return Ok(());
    }

    for table in &tables {
        println!("\n{}", "=".repeat(80));
        println!(" Table: {}", table);
        println!("{}", "=".repeat(80));

        println!("\n Schema:");
        for col in store.describe_table(table)? {
            println!("   {:<30} {}", col.name, col.data_type);
        }

        println!("\n Statistics:");
        println!("   {:<30} {:>12} {:>14} {:>15}", "Column", "Total Rows", "Unique Values", "Missing Values");
        for stats in table_statistics(store, table)? {
            println!(
                "   {:<30} {:>12} {:>14} {:>15}",
                stats.column, stats.total_rows, stats.unique_values, stats.missing_values
            );
        }
    }

    let numeric = numeric_columns(store)?;
    if numeric.is_empty() {
        println!("\nNo numerical data found.");
        return Ok(());
    }

    println!("\n{}", "=".repeat(80));
    println!(" Distributions");
    println!("{}", "=".repeat(80));
    for column in numeric {
        println!("\n {}.{}", column.table, column.column);
        print!("{}", render_histogram(&histogram(&column.values, DEFAULT_BINS), 40));
    }
    Ok(())
}

fn print_result(session: &Session, label: &str) {
    if let Some(sql) = &session.last_sql {
        println!("\n SQL Query ({}):\n", label);
        println!("{}\n", sql);
    }
    if let Some(rows) = &session.last_results {
        println!(" Query Results ({} rows):\n", rows.row_count());
        print!("{}", rows.render_table(PREVIEW_ROWS));
    }
}

async fn ask(
    translator: &Translator<LlmClient>,
    store: &SqliteStore,
    question: &str,
    refinement: Option<&str>,
    export: Option<PathBuf>,
) -> Result<()> {
    let mut session = Session::new();

    let result = session.ask(translator, store, question).await?;
    print_result(&session, &result.label);

    if let Some(refinement) = refinement {
        session.request_refinement();
        let refined = session.refine(translator, store, refinement).await?;
        print_result(&session, &refined.label);
    }

    if let (Some(path), Some(rows)) = (export, &session.last_results) {
        rows.write_csv(&path)?;
        println!("\nExported results to {}", path.display());
    }
    Ok(())
}

fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn report(err: &AssistantError) {
    match err {
        AssistantError::NoSql => println!("Model did not return SQL."),
        other => {
            error!("{}", other);
            println!("Error running query: {}", other);
        }
    }
}

fn print_history(session: &Session) {
    if session.history.is_empty() {
        println!("No queries yet.");
        return;
    }
    for (i, entry) in session.history.entries().enumerate() {
        println!(
            " Query {}: {} ({} rows, {})",
            i + 1,
            entry.label,
            entry.results.row_count(),
            entry.recorded_at.format("%H:%M:%S")
        );
    }
}

const SHELL_HELP: &str = "\
Type a question to translate and run it. Commands:
  :refine [text]        refine the last question
  :history [n]          list history, or show entry n
  :export <file.csv>    write the current result to CSV
  :upload <file> [name] replace the upload database with a CSV file
  :overview             schema, statistics and distributions
  :reset                clear the current question and result
  :help                 this text
  :quit                 leave";

async fn shell(config: &AppConfig, translator: &Translator<LlmClient>, store: &mut SqliteStore) -> Result<()> {
    let mut session = Session::new();
    println!("{}\n", SHELL_HELP);

    while let Some(line) = prompt_line("tabletalk> ")? {
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line.as_str(), ""),
        };

        match command {
            ":quit" | ":q" | ":exit" => break,
            ":help" => println!("{}", SHELL_HELP),
            ":reset" => {
                session.reset();
                println!("Query reset.");
            }
            ":history" => match rest.parse::<usize>() {
                Ok(n) => match n.checked_sub(1).and_then(|i| session.history.get(i)) {
                    Some(entry) => {
                        println!("\n Query {}: {}\n\n{}\n", n, entry.label, entry.sql);
                        print!("{}", entry.results.render_table(PREVIEW_ROWS));
                    }
                    None => println!("No history entry {}.", n),
                },
                Err(_) => print_history(&session),
            },
            ":export" => match (&session.last_results, rest.is_empty()) {
                (Some(rows), false) => match rows.write_csv(rest) {
                    Ok(()) => println!("Exported results to {}", rest),
                    Err(e) => report(&e),
                },
                (None, _) => println!("No results to export."),
                (_, true) => println!("Usage: :export <file.csv>"),
            },
            ":upload" => {
                let mut parts = rest.split_whitespace();
                let Some(csv_file) = parts.next() else {
                    println!("Usage: :upload <file.csv> [table]");
                    continue;
                };
                let table = parts.next().unwrap_or("uploaded_table");
                let upload_store = match SqliteStore::create(&config.upload_db_path) {
                    Ok(s) => s,
                    Err(e) => {
                        report(&e);
                        continue;
                    }
                };
                match upload_store.replace_with_csv(csv_file, table) {
                    Ok(summary) => {
                        *store = upload_store;
                        session.reset();
                        session.clear_history();
                        println!(
                            "Uploaded and saved as '{}' ({} rows)",
                            summary.table_name, summary.row_count
                        );
                    }
                    Err(e) => report(&e),
                }
            }
            ":overview" => {
                if let Err(e) = overview(store) {
                    println!("Overview failed: {}", e);
                }
            }
            ":refine" => {
                if session.last_question.is_none() {
                    println!("Ask a question first.");
                    continue;
                }
                session.request_refinement();
                let refinement = if rest.is_empty() {
                    match prompt_line("Refinement: ")? {
                        Some(text) => text,
                        None => break,
                    }
                } else {
                    rest.to_string()
                };
                match session.refine(translator, &*store, &refinement).await {
                    Ok(result) => print_result(&session, &result.label),
                    Err(e) => report(&e),
                }
            }
            other if other.starts_with(':') => {
                println!("Unknown command {}. Type :help for commands.", other)
            }
            _ => match session.ask(translator, &*store, &line).await {
                Ok(result) => print_result(&session, &result.label),
                Err(e) => report(&e),
            },
        }
    }

    Ok(())
}
