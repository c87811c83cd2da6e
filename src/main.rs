//! Main module for the Awful RAG CLI application (arag).
//!
//! Parses the command line, loads the configuration and dispatches to the
//! [`awful_rag::service::DocChat`] service.
//!
//! # Examples
//!
//! ```sh
//! arag init
//! arag ingest ~/papers/attention.pdf
//! arag ask "What does the encoder do?"
//! arag interactive
//! ```

use awful_rag::commands::{Cli, Commands};
use awful_rag::config::{self, CONFIG_FILE_NAME, RagConfig};
use awful_rag::segmenter::ROOT_HEADING;
use awful_rag::service::DocChat;
use awful_rag::session::{Role, Session};
use awful_rag::template::{DEFAULT_TEMPLATE_NAME, PromptTemplate};
use awful_rag::{RagError, config_dir};
use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use once_cell::sync::OnceCell;
use std::{
    env,
    error::Error,
    fs,
    io::{Write, stdout},
    path::Path,
};
use tracing::{debug, info};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Parses the command line, loads configuration and executes the requested command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_dir()?.join(CONFIG_FILE_NAME),
    };

    match &cli.command {
        Commands::Init => {
            debug!("Initializing configuration");
            init(&config_path)?;
        }
        Commands::Config => {
            let rag_config = load(&config_path, &cli)?;
            println!("Config file:       {}", config_path.display());
            println!("{}", rag_config.describe());
        }
        Commands::History => {
            let rag_config = load(&config_path, &cli)?;
            let mut session = Session::open(&rag_config.session_db_url)?;
            print_history(&mut session)?;
        }
        Commands::Ingest { path } => {
            let chat = DocChat::from_config(&load(&config_path, &cli)?)?;
            let report = chat.ingest(path).await?;
            println!(
                "Indexed {} as {} chunks ({}-dimensional) at {}",
                report.document_id,
                report.chunk_count,
                report.dimension,
                report.index_path.display()
            );
            if report.history_reset {
                println!("Started a new conversation.");
            }
        }
        Commands::Ask { question } => {
            let chat = DocChat::from_config(&load(&config_path, &cli)?)?;
            match chat.ask(question).await {
                Ok(answer) => println!("{}", answer.text),
                Err(e) => {
                    eprintln!("Your question was not answered: {question}");
                    return Err(e.into());
                }
            }
        }
        Commands::Interactive => {
            let chat = DocChat::from_config(&load(&config_path, &cli)?)?;
            interactive(&chat).await?;
        }
    }

    Ok(())
}

fn load(config_path: &Path, cli: &Cli) -> Result<RagConfig, Box<dyn Error>> {
    let mut rag_config = config::load_config(config_path).map_err(|e| {
        format!(
            "Failed to load {} ({e}). Run `arag init` to create one.",
            config_path.display()
        )
    })?;
    apply_secrets(&mut rag_config, cli);
    debug!("Config loaded from {}", config_path.display());
    Ok(rag_config)
}

/// Secrets from the environment or flags override the config file.
fn apply_secrets(config: &mut RagConfig, cli: &Cli) {
    if let Some(key) = cli
        .embedding_api_key
        .clone()
        .or_else(|| env::var("JINA_API_KEY").ok())
    {
        config.embedding_api_key = key;
    }
    if let Some(key) = &cli.api_key {
        config.api_key = key.clone();
    }
}

/// Writes a default config and the default prompt template, leaving existing files alone.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let base_dir = config_dir()?;
    let templates_dir = base_dir.join("templates");
    info!("Creating template config directory: {}", templates_dir.display());
    fs::create_dir_all(&templates_dir)?;

    let template_path = templates_dir.join(format!("{DEFAULT_TEMPLATE_NAME}.yaml"));
    if !template_path.exists() {
        info!("Creating template file: {}", template_path.display());
        fs::write(
            &template_path,
            serde_yaml::to_string(&PromptTemplate::default())?,
        )?;
    }

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut rag_config = RagConfig::with_defaults(&base_dir);
    rag_config.template = Some(DEFAULT_TEMPLATE_NAME.to_string());
    info!("Creating config file: {}", config_path.display());
    fs::write(config_path, serde_yaml::to_string(&rag_config)?)?;
    println!("Wrote {}", config_path.display());

    Ok(())
}

fn print_history(session: &mut Session) -> Result<(), RagError> {
    match session.active_document() {
        Some(document) => println!("Conversation about {}", document.document_id),
        None => {
            println!("No document has been ingested yet.");
            return Ok(());
        }
    }
    for turn in session.history()? {
        let label = match turn.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        println!("\n{label}: {}", turn.content);
    }
    Ok(())
}

/// Reads questions line by line until `exit` or end of input.
async fn interactive(chat: &DocChat) -> Result<(), Box<dyn Error>> {
    match chat.active_document().await {
        Some(document) => println!("Conversation: {}", document.document_id),
        None => println!("No document ingested yet. Run `arag ingest <file>` first."),
    }

    loop {
        let mut stdout = stdout();
        stdout.execute(Print("\nYou: "))?;
        stdout.execute(SetForegroundColor(Color::Green))?;
        stdout.flush()?;

        let mut input = String::new();
        let read = std::io::stdin().read_line(&mut input)?;

        stdout.execute(ResetColor)?;

        let question = input.trim();
        if read == 0 || question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match chat.ask(question).await {
            Ok(answer) => {
                stdout.execute(SetForegroundColor(Color::Yellow))?;
                stdout.execute(Print(format!("\n{}\n", answer.text)))?;
                stdout.execute(ResetColor)?;
                let sections: Vec<&str> = answer
                    .context
                    .iter()
                    .filter_map(|chunk| chunk.heading.as_deref())
                    .filter(|heading| *heading != ROOT_HEADING)
                    .collect();
                if !sections.is_empty() {
                    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
                    stdout.execute(Print(format!("Sources: {}\n", sections.join(", "))))?;
                    stdout.execute(ResetColor)?;
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                eprintln!("Your question was kept, try again: {question}");
                continue;
            }
        }
    }

    Ok(())
}
