use std::io::{self, Write};
use std::time::Duration;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas::app::{App, Command, Tab, HELP};
use atlas::citation::render_plain;
use atlas::config::{Config, LoggingConfig};
use atlas::documents::{DocumentsView, UploadFlow};
use atlas::models::{DocumentInfo, Role, SourceCitation, UploadFile};
use atlas::theme::{system_prefers_dark, FileThemeStore, Theme, ThemeSettings};
use atlas::util::{
    copy_to_clipboard, format_file_size, format_relative, truncate_graphemes, InterruptRouter,
    Interrupted, Throttle,
};
use atlas::AtlasClient;

const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Ask questions about your documents and manage the Atlas knowledge base")]
struct Args {
    /// Backend base URL (overrides ATLAS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend is up
    Health,
    /// Show the backend's ingestion and retrieval settings
    Settings,
    /// Ask a single question
    Ask {
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
        /// Let the model answer beyond the retrieved documents
        #[arg(long)]
        no_rag_only: bool,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Interactive chat session
    Chat {
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        no_rag_only: bool,
    },
    /// Manage uploaded documents
    Docs {
        #[command(subcommand)]
        command: DocsCommand,
    },
    /// Show or set the color theme
    Theme { theme: Option<String> },
}

#[derive(Subcommand)]
enum DocsCommand {
    List {
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    Upload {
        path: std::path::PathBuf,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    Delete {
        doc_id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    init_logging(&LoggingConfig::from_env());

    let mut config = Config::from_env();
    if let Some(url) = args.api_url {
        config.client.base_url = url;
    }

    match args.command {
        Commands::Health => health(&config).await,
        Commands::Settings => settings(&config).await,
        Commands::Ask {
            stream,
            no_rag_only,
            question,
        } => {
            let rag_only = config.chat.rag_only && !no_rag_only;
            ask(&config, &question.join(" "), stream, rag_only).await
        }
        Commands::Chat {
            stream,
            no_rag_only,
        } => {
            config.chat.rag_only = config.chat.rag_only && !no_rag_only;
            repl(App::new(config)?, stream).await
        }
        Commands::Docs { command } => docs(&config, command).await,
        Commands::Theme { theme } => theme_command(&config, theme.as_deref()),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atlas=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn palette(config: &Config) -> Palette {
    let settings = ThemeSettings::load(Box::new(FileThemeStore::new(config.theme.file.clone())));
    Palette::for_theme(settings.resolve(system_prefers_dark()))
}

/// ANSI colors for the resolved theme.
struct Palette {
    accent: &'static str,
    muted: &'static str,
}

impl Palette {
    const RESET: &'static str = "\x1b[0m";

    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                accent: "\x1b[34m",
                muted: "\x1b[90m",
            },
            _ => Self {
                accent: "\x1b[36m",
                muted: "\x1b[37m",
            },
        }
    }
}

async fn health(config: &Config) -> anyhow::Result<()> {
    let client = AtlasClient::new(&config.client)?;
    let health = client.health().await.map_err(|e| report_auth(&client, e))?;

    println!(
        "{} (version {}, {})",
        health.status,
        health.version,
        health.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    let mut services: Vec<_> = health.services.iter().collect();
    services.sort();
    for (name, status) in services {
        println!("  {name}: {status}");
    }

    if !health.is_healthy() {
        bail!("Backend reports status '{}'", health.status);
    }
    Ok(())
}

async fn settings(config: &Config) -> anyhow::Result<()> {
    let client = AtlasClient::new(&config.client)?;
    let settings = client
        .get_settings()
        .await
        .map_err(|e| report_auth(&client, e))?;

    println!("max tokens:      {}", settings.max_tokens);
    println!("chunk size:      {}", settings.chunk_size);
    println!("chunk overlap:   {}", settings.chunk_overlap);
    println!("top k:           {}", settings.top_k);
    println!("max file size:   {}", format_file_size(settings.max_file_size));
    println!("allowed types:   {}", settings.allowed_mime_types.join(", "));
    Ok(())
}

async fn ask(config: &Config, question: &str, stream: bool, rag_only: bool) -> anyhow::Result<()> {
    let client = AtlasClient::new(&config.client)?;
    let palette = palette(config);
    let messages = [atlas::models::ChatMessage::user(question.trim())];

    if stream {
        let handle = client.chat_stream(&messages, rag_only, token_printer());
        let interrupt = cancel_on_ctrl_c(handle.cancellation_token());
        let outcome = handle.join().await;
        interrupt.abort();

        let outcome = outcome.map_err(|e| report_auth(&client, e))?;
        println!();
        if outcome.cancelled {
            println!("{}[cancelled]{}", palette.muted, Palette::RESET);
        }
        return Ok(());
    }

    let response = client
        .chat(&messages, rag_only)
        .await
        .map_err(|e| report_auth(&client, e))?;
    print_answer(&response.answer, &response.sources, &palette);
    if let Some(follow_up) = response.follow_up.as_deref() {
        println!("\n{}Follow-up: {}{}", palette.muted, follow_up, Palette::RESET);
    }
    Ok(())
}

fn print_answer(answer: &str, sources: &[SourceCitation], palette: &Palette) {
    let rendered = render_plain(answer, sources);
    println!("{}", rendered.body);
    if !rendered.footnotes.is_empty() {
        println!();
        for footnote in rendered.footnotes {
            println!("{}{}{}", palette.accent, footnote, Palette::RESET);
        }
    }
}

/// Writes tokens to stdout, flushing at most every [`FLUSH_INTERVAL`].
fn token_printer() -> Box<dyn FnMut(&str) + Send + 'static> {
    let mut throttle = Throttle::new(FLUSH_INTERVAL);
    Box::new(move |token: &str| {
        let mut out = io::stdout();
        let _ = out.write_all(token.as_bytes());
        if throttle.ready() {
            let _ = out.flush();
        }
    })
}

fn cancel_on_ctrl_c(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}

/// One Ctrl-C listener for the whole REPL. Interrupts cancel the armed
/// stream, or arrive on the returned channel when nothing is streaming.
fn route_ctrl_c(router: InterruptRouter) -> mpsc::UnboundedReceiver<()> {
    let (quit_tx, quit_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if router.interrupt() == Interrupted::Quit && quit_tx.send(()).is_err() {
                break;
            }
        }
    });
    quit_rx
}

fn report_auth(client: &AtlasClient, error: atlas::ApiError) -> atlas::ApiError {
    if error.is_unauthorized() {
        eprintln!("Not signed in. Visit {} to sign in again.", client.login_url());
    }
    error
}

async fn repl(mut app: App, stream: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let palette = Palette::for_theme(app.theme.resolve(system_prefers_dark()));
    let interrupts = InterruptRouter::new();
    let mut quit = route_ctrl_c(interrupts.clone());

    println!("Atlas chat. Type /help for commands.");
    loop {
        prompt(&app)?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = quit.recv() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Say(text) if text.is_empty() => {}
            Command::Say(text) => {
                app.select_tab(Tab::Chat);
                send(&mut app, &text, stream, &palette, &interrupts).await;
            }
            Command::Chat => app.select_tab(Tab::Chat),
            Command::Docs => {
                app.open_documents().await;
                print_view(&app.documents, &palette);
            }
            Command::Find(query) => {
                app.documents.set_query(query);
                print_view(&app.documents, &palette);
            }
            Command::Tag(tag) => {
                app.documents.set_tag(tag);
                print_view(&app.documents, &palette);
            }
            Command::Delete(doc_id) => delete_interactive(&mut app, &doc_id, &mut lines).await?,
            Command::Clear => {
                app.transcript.clear();
                println!("Started a new conversation.");
            }
            Command::Copy => copy_last_answer(&app)?,
            Command::Theme(None) => println!("theme: {}", app.theme.preference()),
            Command::Theme(Some(theme)) => {
                app.theme.set(theme)?;
                println!("theme set to {theme}; takes effect next session");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(input) => println!("Unknown command: {input} (try /help)"),
        }
    }

    Ok(())
}

fn prompt(app: &App) -> io::Result<()> {
    let mut out = io::stdout();
    write!(out, "{}> ", app.tab().title().to_lowercase())?;
    out.flush()
}

async fn send(
    app: &mut App,
    text: &str,
    stream: bool,
    palette: &Palette,
    interrupts: &InterruptRouter,
) {
    let rag_only = app.config().chat.rag_only;

    if stream {
        let client = app.client().clone();
        let cancel = interrupts.arm();
        app.transcript
            .submit_streaming(text, &client, rag_only, token_printer(), cancel)
            .await;
        interrupts.disarm();
        println!();

        if app.transcript.last_failure().is_some() {
            if let Some(last) = app.transcript.messages().last() {
                println!("{}", last.content);
            }
        }
        return;
    }

    app.ask(text).await;

    let position = app.transcript.messages().len().saturating_sub(1);
    if let Some(last) = app.transcript.messages().get(position) {
        let sources = app.transcript.sources_for(position).unwrap_or_default();
        print_answer(&last.content, sources, palette);
    }
    if let Some(follow_up) = app.transcript.last_follow_up() {
        println!("{}Follow-up: {}{}", palette.muted, follow_up, Palette::RESET);
    }
}

fn copy_last_answer(app: &App) -> anyhow::Result<()> {
    let last = app
        .transcript
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant);

    match last {
        Some(message) => {
            copy_to_clipboard(&mut io::stdout(), &message.content)?;
            println!("Copied the last answer.");
        }
        None => println!("Nothing to copy yet."),
    }
    Ok(())
}

async fn delete_interactive(
    app: &mut App,
    doc_id: &str,
    lines: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    let client = app.client().clone();
    if app.documents.documents().is_empty() {
        app.documents.refresh(&client).await;
    }
    if !app.documents.request_delete(doc_id) {
        println!("No document with id {doc_id}.");
        return Ok(());
    }

    confirm_pending_delete(&mut app.documents, &client, lines).await
}

async fn confirm_pending_delete(
    view: &mut DocumentsView,
    client: &AtlasClient,
    lines: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    while let Some(pending) = view.pending_delete().cloned() {
        if let Some(error) = &pending.error {
            println!("Delete failed: {error}");
        }
        print!("Delete {} ({})? [y/N] ", pending.filename, pending.doc_id);
        io::stdout().flush()?;

        let answer = lines.next_line().await?.unwrap_or_default();
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            view.cancel_delete();
            println!("Kept {}.", pending.filename);
            break;
        }

        if view.confirm_delete(client).await {
            println!("Deleted {}.", pending.filename);
        }
    }
    Ok(())
}

fn print_view(view: &DocumentsView, palette: &Palette) {
    if let Some(error) = view.list_error() {
        println!("Could not load documents: {error}. Run /docs to retry.");
    }

    let visible = view.visible();
    print_documents(&visible, palette);

    let mut filters = Vec::new();
    if !view.query().trim().is_empty() {
        filters.push(format!("matching \"{}\"", view.query().trim()));
    }
    if let Some(tag) = view.tag() {
        filters.push(format!("tagged {tag}"));
    }
    let suffix = if filters.is_empty() {
        String::new()
    } else {
        format!(" {}", filters.join(", "))
    };
    println!(
        "{}{} of {} documents{}{}",
        palette.muted,
        visible.len(),
        view.total(),
        suffix,
        Palette::RESET
    );

    let tags = view.tags();
    if !tags.is_empty() {
        println!("{}tags: {}{}", palette.muted, tags.join(", "), Palette::RESET);
    }
}

fn print_documents(docs: &[&DocumentInfo], palette: &Palette) {
    let now = Utc::now();
    for doc in docs {
        let tags = if doc.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", doc.tags.join(", "))
        };
        println!(
            "{}{:<12}{} {:<40} {:>9} {:>4} chunks  {}{}",
            palette.accent,
            truncate_graphemes(&doc.doc_id, 12),
            Palette::RESET,
            truncate_graphemes(&doc.filename, 40),
            format_file_size(doc.size),
            doc.chunks,
            format_relative(&doc.uploaded_at, &now),
            tags
        );
    }
}

async fn docs(config: &Config, command: DocsCommand) -> anyhow::Result<()> {
    let client = AtlasClient::new(&config.client)?;
    let palette = palette(config);
    let mut view = DocumentsView::new(&config.documents);

    match command {
        DocsCommand::List { query, tag } => {
            if !view.refresh(&client).await {
                let error = view.list_error().unwrap_or_default().to_string();
                bail!("Could not load documents: {error}. Run `atlas docs list` to retry.");
            }
            view.set_query(query.unwrap_or_default());
            view.set_tag(tag);
            print_view(&view, &palette);
        }
        DocsCommand::Upload { path, tags } => {
            let file = UploadFile::from_path(&path).await?;
            if view.load_settings(&client).await {
                if let Some(settings) = view.settings() {
                    for warning in file.check_against(settings) {
                        eprintln!("warning: {warning}");
                    }
                }
            }

            let mut flow = UploadFlow::default();
            flow.select(file);
            flow.set_tags_input(tags.unwrap_or_default());
            if !flow.submit(&client).await {
                let error = flow.error().unwrap_or("Upload failed").to_string();
                bail!(error);
            }
            if let atlas::documents::UploadState::Succeeded { response } = flow.state() {
                println!(
                    "{} ({}: {} chunks) {}",
                    response.message, response.doc_id, response.chunks, response.filename
                );
            }
        }
        DocsCommand::Delete { doc_id, yes } => {
            if !view.refresh(&client).await {
                let error = view.list_error().unwrap_or_default().to_string();
                bail!("Could not load documents: {error}");
            }
            if !view.request_delete(&doc_id) {
                bail!("No document with id {doc_id}");
            }

            if yes {
                if !view.confirm_delete(&client).await {
                    let error = view
                        .pending_delete()
                        .and_then(|p| p.error.clone())
                        .unwrap_or_default();
                    bail!("Delete failed: {error}");
                }
                println!("Deleted {doc_id}.");
            } else {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                confirm_pending_delete(&mut view, &client, &mut lines).await?;
            }
        }
    }
    Ok(())
}

fn theme_command(config: &Config, theme: Option<&str>) -> anyhow::Result<()> {
    let mut settings = ThemeSettings::load(Box::new(FileThemeStore::new(config.theme.file.clone())));

    if let Some(theme) = theme {
        settings.set(theme.parse()?)?;
    }

    println!(
        "theme: {} (showing {})",
        settings.preference(),
        settings.resolve(system_prefers_dark())
    );
    Ok(())
}
