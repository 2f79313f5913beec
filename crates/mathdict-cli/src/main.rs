//! mathdict CLI
//!
//! Serves the dictionary over HTTP, browses terms and quizzes, takes a quiz
//! in the terminal and imports seed catalogs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mathdict_core::{
    Advance, AdminPanel, CatalogPage, Config, ImportSummary, QuizCard, QuizResults, QuizSession,
    RatingScale, Repository, SeedCatalog, SessionPhase, SessionView, TermFilter, TickOutcome,
};
use mathdict_report::{json::JsonGenerator, MarkdownGenerator};
use mathdict_server::{create_router, AppState};
use mathdict_store::{Identity, MemoryIdentity, MemoryStore, RestIdentity, RestStore, Store};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// File name stem of the results reports written by `take`.
const REPORT_STEM: &str = "mathdict-report";

/// mathdict - Mathematics dictionary
///
/// Browse mathematical terms by topic and grade, take timed quizzes and
/// manage the catalog.
#[derive(Parser, Debug)]
#[command(name = "mathdict")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: mathdict.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Hosted database URL (overrides config and environment)
    #[arg(long, value_name = "URL", global = true)]
    store_url: Option<String>,

    /// Public API key of the hosted database
    #[arg(long, value_name = "KEY", global = true)]
    anon_key: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and WebSocket server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Keep all data in memory instead of the hosted database
        #[arg(long)]
        memory: bool,

        /// Seed catalog to import before serving
        #[arg(long, value_name = "FILE")]
        seed: Option<PathBuf>,
    },

    /// List dictionary terms
    Terms {
        /// Search text (name or definition)
        #[arg(short, long)]
        search: Option<String>,

        /// Topic id
        #[arg(short, long)]
        topic: Option<Uuid>,

        /// Grade, 1-11
        #[arg(short, long)]
        grade: Option<i32>,

        /// First letter
        #[arg(short, long)]
        letter: Option<String>,
    },

    /// List quizzes, newest first
    Quizzes,

    /// Take a quiz in the terminal
    Take {
        /// Quiz id
        #[arg(value_name = "QUIZ_ID")]
        quiz_id: Uuid,

        /// Directory for the results reports
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        report_dir: PathBuf,
    },

    /// Import a seed catalog of topics, grade levels, terms and quizzes
    Import {
        /// Seed catalog JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Access token of an admin account; the rows are written as that user
        #[arg(long, value_name = "JWT")]
        access_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?
        .with_env_overrides()
        .with_overrides(args.store_url, args.anon_key);
    config.validate()?;

    match args.command {
        Command::Serve {
            port,
            host,
            memory,
            seed,
        } => serve(config, port, host, memory, seed).await,
        Command::Terms {
            search,
            topic,
            grade,
            letter,
        } => {
            let filter = TermFilter {
                search,
                topic,
                grade,
                letter,
            };
            list_terms(&rest_repository(&config)?, filter).await
        }
        Command::Quizzes => list_quizzes(&rest_repository(&config)?).await,
        Command::Take {
            quiz_id,
            report_dir,
        } => {
            let repo = rest_repository(&config)?;
            take_quiz(&repo, quiz_id, &report_dir, config.quiz.rating_scale).await
        }
        Command::Import { file, access_token } => {
            let catalog = load_seed(&file)?;
            let admin = AdminPanel::new(Arc::new(rest_repository(&config)?))
                .acting_as(access_token.as_deref())?;
            let summary = catalog.import(&admin).await?;
            print_import_summary(&summary);
            Ok(())
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn load_seed(path: &Path) -> anyhow::Result<SeedCatalog> {
    SeedCatalog::from_file(path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read seed catalog '{}': {e}\n\nSuggestion: Check that the file exists and is valid JSON",
            path.display()
        )
    })
}

fn rest_store(config: &Config) -> anyhow::Result<RestStore> {
    Ok(RestStore::new(
        &config.store.url,
        &config.store.anon_key,
        config.store.timeout_seconds,
    )?)
}

fn rest_repository(config: &Config) -> anyhow::Result<Repository<RestStore>> {
    let ttl = Duration::from_secs(config.store.cache_seconds);
    Ok(Repository::new(rest_store(config)?).with_ttl(ttl))
}

// ============================================================================
// serve
// ============================================================================

async fn serve(
    mut config: Config,
    port: Option<u16>,
    host: Option<String>,
    memory: bool,
    seed: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    if memory {
        println!("Using in-memory store (data is lost on exit)");
        run_server(config, MemoryStore::new(), MemoryIdentity::new(), seed).await
    } else {
        let store = rest_store(&config)?;
        let identity = RestIdentity::new(
            &config.store.url,
            &config.store.anon_key,
            config.store.timeout_seconds,
        )?;
        println!("Using hosted database at {}", config.store.url);
        run_server(config, store, identity, seed).await
    }
}

async fn run_server<S: Store, I: Identity>(
    config: Config,
    store: S,
    identity: I,
    seed: Option<PathBuf>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, store, identity);

    if let Some(path) = seed {
        let catalog = load_seed(&path)?;
        println!("Importing seed catalog {}...", path.display());
        let summary = catalog.import(&state.admin).await?;
        print_import_summary(&summary);
    }

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;
    let local = listener.local_addr()?;

    println!();
    println!("HTTP API server running on http://{local}/api");
    println!("Session events on ws://{local}/ws?session=<id>");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl+C; stop the process to exit");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// terms / quizzes
// ============================================================================

async fn list_terms<S: Store>(repo: &Repository<S>, filter: TermFilter) -> anyhow::Result<()> {
    let terms = repo.terms().await?;
    let grades = repo.grade_levels().await?;
    let page = CatalogPage::build(&terms, &grades, filter);
    print_catalog(&page);
    Ok(())
}

fn print_catalog(page: &CatalogPage) {
    if !page.letters.is_empty() {
        println!("Letters: {}", page.letters.join(" "));
        println!();
    }

    if page.is_empty {
        if page.filter.is_active() {
            println!("No terms match these filters.");
        } else {
            println!("The dictionary is empty.");
        }
        return;
    }

    for card in &page.terms {
        let mut badges = Vec::new();
        if let Some(topic) = &card.topic_badge {
            badges.push(topic.name.clone());
        }
        if let Some(grade) = &card.grade_badge {
            badges.push(grade.label.clone());
        }
        if badges.is_empty() {
            println!("{}", card.name);
        } else {
            println!("{} [{}]", card.name, badges.join(", "));
        }
        println!("    {}", card.definition);
        if let Some(example) = &card.example {
            println!("    Example: {example}");
        }
    }

    println!();
    println!("{} of {} terms", page.count, page.total);
}

async fn list_quizzes<S: Store>(repo: &Repository<S>) -> anyhow::Result<()> {
    let quizzes = repo.quizzes().await?;
    if quizzes.is_empty() {
        println!("No quizzes yet.");
        return Ok(());
    }

    for quiz in &quizzes {
        let questions = repo.questions(quiz.id).await?;
        let ratings = repo.ratings(quiz.id).await?;
        print_quiz_card(&QuizCard::new(quiz, questions.len(), &ratings));
    }
    Ok(())
}

fn print_quiz_card(card: &QuizCard) {
    let preview = &card.preview;
    println!("{}  ({})", preview.title, preview.id);
    if let Some(description) = &preview.description {
        println!("    {description}");
    }
    let mut details = vec![
        format!("{} questions", preview.question_count),
        preview.time_limit_label.clone(),
    ];
    if let Some(difficulty) = &preview.difficulty_level {
        details.push(difficulty.clone());
    }
    if let Some(average) = card.rating.average {
        details.push(format!("rated {average:.1} by {}", card.rating.count));
    }
    println!("    {}", details.join(" | "));
}

// ============================================================================
// take
// ============================================================================

/// What the user asked for at the question prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Choose(usize),
    Next,
    Back,
    Quit,
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "" | "n" | "next" => Some(Self::Next),
            "b" | "back" | "p" | "previous" => Some(Self::Back),
            "q" | "quit" => Some(Self::Quit),
            other => other
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(|n| Self::Choose(n - 1)),
        }
    }
}

async fn take_quiz<S: Store>(
    repo: &Repository<S>,
    quiz_id: Uuid,
    report_dir: &Path,
    scale: RatingScale,
) -> anyhow::Result<()> {
    let mut session = QuizSession::new();
    let ticket = session.select_quiz(quiz_id)?;
    let quiz = repo.quiz(quiz_id).await?;
    let questions = repo.questions(quiz_id).await?;
    session.apply_loaded(ticket, quiz, &questions, &mut rand::thread_rng());

    if let Some(preview) = session.view().quiz {
        println!("{}", preview.title);
        if let Some(description) = &preview.description {
            println!("{description}");
        }
        println!(
            "{} questions | {}",
            preview.question_count, preview.time_limit_label
        );
    }
    session.start()?;
    println!();
    println!("Enter an option number to answer, 'b' to go back, 'q' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    let attempt = session.attempt_id();

    print_question(&session.view());
    while session.phase() == SessionPhase::InProgress {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("Input closed, attempt abandoned.");
                    return Ok(());
                };
                match Input::parse(&line) {
                    Some(Input::Quit) => {
                        println!("Attempt abandoned.");
                        return Ok(());
                    }
                    Some(input) => apply_input(&mut session, input),
                    None => println!("  Enter an option number, 'b' or 'q'."),
                }
            }
            _ = ticker.tick(), if session.timer_active() => {
                match session.tick(attempt) {
                    TickOutcome::Running { remaining_seconds }
                        if remaining_seconds % 60 == 0 || remaining_seconds == 10 =>
                    {
                        println!("  {} left", clock(remaining_seconds));
                    }
                    TickOutcome::Expired => println!("Time is up!"),
                    _ => {}
                }
            }
        }
    }

    let Some(results) = session.results().cloned() else {
        return Ok(());
    };
    print_results(&results);

    rate_quiz(repo, &mut session, &mut lines, scale).await?;

    let title = session
        .quiz()
        .map_or_else(|| "Quiz".to_string(), |q| q.title.clone());
    write_reports(&results, &title, quiz_id, report_dir)
}

fn apply_input(session: &mut QuizSession, input: Input) {
    let outcome = match input {
        Input::Choose(option) => session.select_answer(option).and_then(|()| session.next()),
        Input::Next => session.next(),
        Input::Back => session.previous().map(|()| Advance::Moved),
        Input::Quit => return,
    };
    match outcome {
        Ok(Advance::Moved) => print_question(&session.view()),
        Ok(Advance::Finished) => {}
        Err(e) => println!("  {}", e.to_string().lines().next().unwrap_or_default()),
    }
}

fn clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn print_question(view: &SessionView) {
    let Some(question) = &view.current_question else {
        return;
    };
    println!();
    match view.remaining_seconds {
        Some(remaining) => println!(
            "Question {} of {}  ({} left)",
            question.number,
            view.question_count,
            clock(remaining)
        ),
        None => println!("Question {} of {}", question.number, view.question_count),
    }
    println!("{}", question.question);
    for (index, option) in question.options.iter().enumerate() {
        let marker = if view.selected == Some(index) { '*' } else { ' ' };
        println!(" {marker}{}. {option}", index + 1);
    }
}

fn print_results(results: &QuizResults) {
    let summary = &results.summary;
    println!();
    println!("=== Results ===");
    if summary.timed_out {
        println!("The countdown ended the attempt.");
    }
    println!(
        "Score: {}% ({} of {} correct)",
        summary.score_percent, summary.correct, summary.total
    );
    println!("{}", summary.message);

    println!();
    for review in &results.reviews {
        let mark = if review.is_correct { "ok" } else { "x " };
        let correct = review
            .options
            .get(review.correct)
            .map_or("", String::as_str);
        println!("[{mark}] {}. {}", review.number, review.question);
        match review.chosen.and_then(|c| review.options.get(c)) {
            Some(chosen) if !review.is_correct => {
                println!("       your answer: {chosen}; correct: {correct}");
            }
            None => println!("       not answered; correct: {correct}"),
            Some(_) => {}
        }
    }
}

async fn rate_quiz<S: Store>(
    repo: &Repository<S>,
    session: &mut QuizSession,
    lines: &mut Lines<BufReader<Stdin>>,
    scale: RatingScale,
) -> anyhow::Result<()> {
    println!();
    println!("Rate this quiz from 1 to 5 (Enter to skip):");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let Ok(rating) = line.parse::<u8>() else {
            println!("  Enter a number from 1 to 5.");
            continue;
        };
        let draft = match session.begin_rating(rating, None) {
            Ok(draft) => draft,
            Err(e) => {
                println!("  {e}");
                continue;
            }
        };
        match repo.submit_rating(&draft).await {
            Ok(_) => {
                session.rating_succeeded();
                println!("Thank you for rating this quiz! {}", scale.symbol(rating));
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "rating not stored");
                session.rating_failed(e.to_string());
                println!("  Could not save the rating: {e}");
                println!("  Try again, or press Enter to skip.");
            }
        }
    }
    Ok(())
}

fn write_reports(
    results: &QuizResults,
    title: &str,
    quiz_id: Uuid,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let report = results.to_report(title, Some(quiz_id))?;

    std::fs::create_dir_all(output_dir)?;

    let md_path = output_dir.join(format!("{REPORT_STEM}.md"));
    std::fs::write(&md_path, MarkdownGenerator::new(&report).generate())?;
    println!();
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join(format!("{REPORT_STEM}.json"));
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());
    Ok(())
}

fn print_import_summary(summary: &ImportSummary) {
    println!(
        "Imported {} topics, {} grade levels, {} terms and {} quizzes",
        summary.topics, summary.grade_levels, summary.terms, summary.quizzes
    );
}
