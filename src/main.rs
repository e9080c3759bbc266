use std::sync::Arc;

use clap::Parser;
use lexbert::{
    ChunkDb,
    ChunkStore,
    ConfigDb,
    DataDir,
    Error,
    ModelManager,
    Result,
    RetrievalConfig,
    Retriever,
    config::{self, MODEL_KEY, SETTINGS},
    context,
    import,
    model_manager::resolve_model_id,
    prompt,
    retrieval,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("LEXBERT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Import(args) => {
            let chunks = ChunkDb::open(&data_dir.chunks_db())?;
            let report = import::import_jsonl(&args.file, &chunks, None)?;
            println!(
                "Imported {} record(s): {} new, {} updated",
                report.records, report.inserted, report.updated
            );
        }
        Command::Query(args) => {
            let retriever =
                open_retriever(&config_db, &data_dir, cli.model.as_deref())?;
            let retrieval = retriever.retrieve(&args.query, args.count).await?;

            if args.json {
                retrieval::format_json(&retrieval, &args.query)?;
            } else {
                retrieval::format_human(&retrieval, &args.query);
            }
        }
        Command::Context(args) => {
            let retriever =
                open_retriever(&config_db, &data_dir, cli.model.as_deref())?;
            let retrieval = retriever.retrieve(&args.query, args.count).await?;
            let max_chars = args
                .max_chars
                .unwrap_or(retriever.config().max_context_chars);
            let assembled = context::assemble(retrieval.hits(), max_chars);

            if assembled.dropped > 0 {
                eprintln!(
                    "{} chunk(s) did not fit the {max_chars} character budget",
                    assembled.dropped
                );
            }

            if args.prompt {
                let prompt = prompt::prompt_or_reply(&args.query, &assembled);
                println!("{prompt}");
            } else if args.json {
                let out = serde_json::json!({
                    "query": args.query,
                    "context": assembled,
                });
                println!("{}", serde_json::to_string(&out)?);
            } else if assembled.is_empty() {
                println!("{}", prompt::NO_CONTEXT_REPLY);
            } else {
                println!("{}", assembled.text);
            }
        }
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, cli.model.as_deref(), args.json)?;
        }
        Command::Config { action } => match action {
            ConfigAction::Show { json } => config_show(&config_db, json)?,
            ConfigAction::Set { key, value } => {
                config::validate_setting(&key, &value)?;
                config_db.set_setting(&key, &value)?;
                println!("{key} = {value}");
            }
            ConfigAction::Unset { key } => {
                if config::setting_spec(&key).is_none() {
                    return Err(Error::Config(format!(
                        "unknown setting '{key}'"
                    )));
                }
                if config_db.remove_setting(&key)? {
                    println!("Cleared {key}");
                } else {
                    println!("{key} was not set");
                }
            }
        },
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

fn model_id(config_db: &ConfigDb, explicit: Option<&str>) -> Result<String> {
    Ok(resolve_model_id(explicit, config_db.get_setting(MODEL_KEY)?))
}

fn open_retriever(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
) -> Result<Retriever> {
    let config = RetrievalConfig::load(config_db)?;
    let store = Arc::new(ChunkDb::open(&data_dir.chunks_db())?);
    let encoder = Arc::new(ModelManager::new(model_id(config_db, model)?));
    Ok(Retriever::new(store, encoder, config))
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    json: bool,
) -> Result<()> {
    let chunks = ChunkDb::open(&data_dir.chunks_db())?;
    let count = chunks.count()?;
    let dimension = chunks.dimension()?;
    let model_name = model_id(config_db, model)?;

    if json {
        let out = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "data_dir_origin": data_dir.origin().to_string(),
            "model": model_name,
            "dimension": dimension,
            "chunks": count,
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!(
            "Data directory: {} (from {})",
            data_dir.root().display(),
            data_dir.origin()
        );
        println!("Model: {model_name}");
        match dimension {
            Some(d) => println!("Dimension: {d}"),
            None => println!("Dimension: (no chunks imported)"),
        }
        println!("Chunks: {count}");
    }
    Ok(())
}

fn config_show(config_db: &ConfigDb, json: bool) -> Result<()> {
    let values = config_db.settings()?;
    let rows: Vec<_> = SETTINGS
        .iter()
        .map(|spec| (spec, values.get(spec.key)))
        .collect();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(spec, stored)| {
                let value = (*stored).map_or(spec.default, String::as_str);
                (spec.key.to_string(), serde_json::json!(value))
            })
            .collect();
        println!("{}", serde_json::Value::Object(map));
    } else {
        for (spec, stored) in &rows {
            match stored {
                Some(value) => println!("{} = {value}", spec.key),
                None => println!("{} = {} (default)", spec.key, spec.default),
            }
            println!("    {}", spec.description);
        }
    }
    Ok(())
}
