//! aut-flex CLI
//!
//! Usage:
//!   aut-flex                                  # Terminal survey
//!   aut-flex --participant 5f1c --study aut   # With participant/study ids
//!   aut-flex --config study.toml --offline    # Custom schedule, no classifier
//!   aut-flex --serve                          # HTTP API server
//!   aut-flex --json                           # JSON lines instead of text

use clap::Parser;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aut_flex::config::SurveyConfig;
use aut_flex::core::{
    build_sink, run_server, CategorizationGateway, OpenAiCategorizer, SessionParams,
    SurveySession, TrialWriter,
};
use aut_flex::types::{
    CompletionOutput, PhaseState, PhaseTransition, PollOutput, ReasonCode, SubmitOutput,
};
use aut_flex::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "aut-flex",
    version = VERSION,
    about = "Timed Alternative Uses Test with live duplicate screening",
    long_about = "aut-flex runs the AUT flexibility study.\n\n\
                  Participants list as many uses as they can for an everyday object\n\
                  across three timed phases:\n  \
                  1. First round     - uses for the first object\n  \
                  2. Keep going      - more uses for the same object (hints for some groups)\n  \
                  3. Final round     - uses for a different object\n\n\
                  Each use is screened for duplicates, categorized and logged."
)]
struct Args {
    /// TOML config file (defaults when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Participant id (drives group assignment)
    #[arg(short, long)]
    participant: Option<String>,

    /// Study id, logged with every trial
    #[arg(long)]
    study: Option<String>,

    /// Return URL for the completion link
    #[arg(long)]
    return_url: Option<String>,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Debug logging and category details
    #[arg(long)]
    verbose: bool,

    /// Skip the classifier; every use is Uncategorized
    #[arg(long)]
    offline: bool,
}

/// Countdown reminders, seconds left
const COUNTDOWN_MARKS: [u64; 3] = [60, 30, 10];

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).without_time())
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match SurveyConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    let gateway = build_gateway(&config, args.offline);
    let sink = match build_sink(&config.sink) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Sink error: {}", e);
            std::process::exit(2);
        }
    };
    let (writer, _worker) = TrialWriter::spawn(sink, config.writer_queue_capacity);

    if args.serve {
        run_serve(&args, config, gateway, writer).await;
    } else {
        run_terminal(&args, config, gateway, writer).await;
    }
}

/// Live classifier when possible, offline otherwise
fn build_gateway(config: &SurveyConfig, offline: bool) -> CategorizationGateway {
    if offline {
        tracing::info!("offline mode, responses stay Uncategorized");
        return CategorizationGateway::offline();
    }
    match OpenAiCategorizer::from_config(&config.gateway) {
        Ok(transport) => {
            tracing::info!(model = %config.gateway.model, "categorization gateway ready");
            CategorizationGateway::new(Arc::new(transport))
        }
        Err(e) => {
            tracing::warn!(error = %e, "categorization unavailable, running offline");
            CategorizationGateway::offline()
        }
    }
}

/// Run HTTP API server
async fn run_serve(
    args: &Args,
    config: SurveyConfig,
    gateway: CategorizationGateway,
    writer: TrialWriter,
) {
    println!();
    println!("{}", format!("AUT Flexibility Study API v{}", VERSION).bold());
    println!();

    if let Err(e) = run_server(&args.addr, config, gateway, writer).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Stdin lines over a channel, so the phase clock keeps running while waiting
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit")
}

/// Run the survey in the terminal
async fn run_terminal(
    args: &Args,
    config: SurveyConfig,
    gateway: CategorizationGateway,
    writer: TrialWriter,
) {
    let params = SessionParams {
        participant_id: args.participant.clone(),
        study_id: args.study.clone(),
        return_url: args.return_url.clone(),
    };
    let session_id = format!("cli_{:08x}", rand::random::<u32>());
    let mut session = SurveySession::new(session_id, params, &config, gateway, writer);
    let mut lines = spawn_stdin_reader();

    if !args.json {
        print_welcome(&session);
    }

    // consent screen
    loop {
        if !args.json {
            print!("Type 'start' when you are ready to begin: ");
            let _ = io::stdout().flush();
        }
        match lines.recv().await {
            None => return,
            Some(line) => {
                let line = line.trim();
                if is_quit(line) {
                    return;
                }
                if line.eq_ignore_ascii_case("start") {
                    break;
                }
            }
        }
    }

    session.begin();
    if args.json {
        print_json(&session.status());
    } else {
        print_phase_banner(&session);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(50)));
    let mut last_state = session.phase_state();
    let mut last_remaining = session.remaining_secs().unwrap_or(0.0);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if is_quit(line.trim()) {
                    break;
                }
                let output = session.submit(&line).await;
                if args.json {
                    print_json(&output);
                } else {
                    print_submit(&output, args.verbose);
                }
            }
            _ = ticker.tick() => {
                let poll = session.poll().await;
                let state = poll.state;

                if let Some(transition) = &poll.transition {
                    if args.json {
                        print_json(&poll);
                    } else {
                        print_transition(transition);
                    }
                }

                if state != last_state {
                    if !args.json {
                        match state {
                            PhaseState::Active(_) => print_phase_banner(&session),
                            PhaseState::Recess(_) => print_recess(&poll),
                            _ => {}
                        }
                    } else if poll.transition.is_none() {
                        print_json(&poll);
                    }
                    last_state = state;
                    last_remaining = poll.remaining_secs;
                } else if !args.json {
                    print_countdown(&poll, last_remaining);
                    last_remaining = poll.remaining_secs;
                }

                if state == PhaseState::Completed {
                    break;
                }
            }
        }
    }

    let completion = session.finish().await;
    if args.json {
        print_json(&completion);
    } else {
        print_completion(&session, &completion);
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "cannot serialize output"),
    }
}

/// Welcome and consent text
fn print_welcome(session: &SurveySession) {
    let params = session.params();
    let or_test = |s: &str| if s.is_empty() { "TEST".to_string() } else { s.to_string() };

    println!("{}", "========================================".bold());
    println!("{}", format!("  AUT Flexibility Study v{}", VERSION).bold());
    println!("{}", "========================================".bold());
    println!();
    println!("Welcome! This study involves thinking of creative uses for common objects.");
    println!("You will be presented with objects one at a time and asked to list as many");
    println!("different uses as you can within the time limit.");
    println!();
    println!("Participant ID: {}", or_test(params.participant()).cyan());
    println!("Study ID: {}", or_test(params.study()).cyan());
    println!();
    println!("{}", "Before we begin, please confirm:".bold());
    println!("- I understand my responses and response times will be collected.");
    println!(
        "- My participant ID is used only for payment and is stored separately from my responses."
    );
    println!("- Data will be used for research in anonymized or aggregate form.");
    println!("- I may stop at any time by typing 'quit'.");
    println!();
}

fn print_phase_banner(session: &SurveySession) {
    let status = session.status();
    let (Some(name), Some(object)) = (status.phase_name.as_ref(), status.object) else {
        return;
    };
    let participant = if status.participant.is_empty() {
        "TEST"
    } else {
        status.participant.as_str()
    };

    println!();
    println!("{}", format!("{} {}:", status.state.emoji(), name).bold());
    let title = format!("★★★  {}  ★★★", object.as_str().to_uppercase());
    println!("{}", title.cyan().bold());
    println!(
        "Participant: {} | Group: {} | Phase: {}/{}",
        participant,
        status.group_id,
        status.phase_index + 1,
        status.phase_count
    );
    if let Some(remaining) = status.remaining_secs {
        println!("⏱️  Time remaining: {}", format_clock(remaining).bold());
    }
    print_hints(&status.hints);
    println!("Enter one use per line.");
}

fn print_hints(hints: &[String]) {
    if hints.is_empty() {
        return;
    }
    let intro = concat!(
        "Hint: You could try a use related to the following categories ",
        "(but do not use the category names):"
    );
    println!("{}", intro.blue());
    for hint in hints {
        println!("  - {}", hint);
    }
}

fn print_submit(output: &SubmitOutput, verbose: bool) {
    match &output.record {
        Some(record) => {
            if verbose {
                println!(
                    "{} {}",
                    format!("✅ {}", output.reason.description()).green(),
                    format!(
                        "[trial {} | {} | {:.1}s]",
                        record.trial, record.category, record.response_time_secs
                    )
                    .dimmed()
                );
            } else {
                println!("{}", format!("✅ {}", output.reason.description()).green());
            }
            print_hints(&output.hints);
        }
        None => {
            println!("{}", format!("⚠️  {}", output.reason.description()).yellow());
        }
    }
}

fn print_transition(transition: &PhaseTransition) {
    println!();
    println!("{}", format!("⏰ {}", ReasonCode::P002_PHASE_ENDED.description()).yellow().bold());
    if !transition.disqualified.is_empty() {
        println!("{}", "These responses were disqualified:".red());
        for text in &transition.disqualified {
            println!("  - {}", text.strikethrough());
        }
    }
}

fn print_recess(poll: &PollOutput) {
    println!();
    println!(
        "{}",
        format!("{} {}", poll.state.emoji(), ReasonCode::P003_RECESS.description()).bold()
    );
    println!(
        "You can rest for {} seconds. The next phase will start automatically.",
        poll.remaining_secs.ceil() as u64
    );
}

/// Reminder when the clock crosses one of the marks
fn print_countdown(poll: &PollOutput, previous: f64) {
    if !matches!(poll.state, PhaseState::Active(_) | PhaseState::Recess(_)) {
        return;
    }
    let now = poll.remaining_secs;
    if let Some(mark) = COUNTDOWN_MARKS
        .iter()
        .copied()
        .find(|&m| previous > m as f64 && now <= m as f64)
    {
        let text = match poll.state {
            PhaseState::Recess(_) => format!("⏳ Resuming in {} seconds...", mark),
            _ => format!("⏱️  Time remaining: {}", format_clock(mark as f64)),
        };
        println!("{}", text.dimmed());
    }
}

fn print_completion(session: &SurveySession, completion: &CompletionOutput) {
    println!();
    let done = format!(
        "{} {}",
        PhaseState::Completed.emoji(),
        ReasonCode::C001_STUDY_COMPLETE.description()
    );
    println!("{}", done.green().bold());

    let responses = session.responses();
    if !responses.is_empty() {
        println!();
        println!("{}", "Your responses in this last phase:".bold());
        for r in responses {
            if r.category.is_disqualified() {
                let text = r.use_text.strikethrough();
                println!("  {}. {} {}", r.trial, text, "(disqualified)".red());
            } else {
                println!("  {}. {}", r.trial, r.use_text);
            }
        }
    }

    println!();
    println!("Complete the study here: {}", completion.completion_url.underline());
    println!("Or copy this code: {}", completion.completion_code.bold());
    if !completion.writes_flushed {
        println!("{}", "Some responses were still being saved when the study ended.".yellow());
    }
}

/// mm:ss
fn format_clock(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
