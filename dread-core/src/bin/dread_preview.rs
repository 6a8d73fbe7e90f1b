//! Preview typewriter playback in the terminal.

use dread_core::testing::{Reply, ScriptedProvider};
use dread_core::{CoreConfig, Presenter, StoryGenerator, StorySession, TurnOptions, Typewriter, TypewriterState};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

const DEMO_TURN: &[&str] = &[
    "The night bus drops you at the end of the line. ",
    "[MOOD:wind]The stop has no name, only a number scratched into the post.\n\n",
    "Somewhere behind the shelter a phone is ringing. [SEED:Event:a payphone that rings at 3:14]\n\n",
    "Choices:\n1. Answer the phone\n2. Walk toward the lights\n",
];

/// Prints each revealed character to stdout.
struct StdoutPresenter;

impl Presenter for StdoutPresenter {
    fn on_char(&self, c: char) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{c}");
        let _ = stdout.flush();
    }

    fn on_complete(&self, state: TypewriterState) {
        tracing::debug!(?state, "playback finished");
        println!();
    }

    fn on_discard(&self) {
        println!("\n[...]");
    }
}

struct Args {
    sanity: Option<u8>,
    cps: Option<f64>,
    config: Option<String>,
    demo: bool,
    live: bool,
    input: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        sanity: None,
        cps: None,
        config: None,
        demo: false,
        live: false,
        input: None,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sanity" => {
                let value = iter.next().ok_or("--sanity needs a value")?;
                parsed.sanity = Some(value.parse().map_err(|_| format!("invalid sanity: {value}"))?);
            }
            "--cps" => {
                let value = iter.next().ok_or("--cps needs a value")?;
                parsed.cps = Some(value.parse().map_err(|_| format!("invalid speed: {value}"))?);
            }
            "--config" => {
                parsed.config = Some(iter.next().ok_or("--config needs a path")?.clone());
            }
            "--demo" => parsed.demo = true,
            "--live" => parsed.live = true,
            other if other.starts_with('-') => return Err(format!("unknown option: {other}")),
            path => parsed.input = Some(path.to_string()),
        }
    }

    Ok(parsed)
}

async fn load_config(args: &Args) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => CoreConfig::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => CoreConfig::default(),
    };
    config.apply_env()?;

    if let Some(sanity) = args.sanity {
        config.typewriter.sanity = sanity.min(100);
    }
    if let Some(cps) = args.cps {
        config.typewriter = config.typewriter.with_speed(cps, cps);
    }
    if args.live {
        config.live_typing = true;
    }
    Ok(config)
}

async fn read_input(path: Option<&str>) -> std::io::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path).await,
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
    }
}

async fn run_demo(config: CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = ScriptedProvider::new(vec![
        Reply::network_error("connection reset by peer"),
        Reply::chunks(DEMO_TURN.iter().copied(), Duration::from_millis(400)),
    ]);
    let generator = StoryGenerator::new(config.generator.clone().with_backoff_base(Duration::from_millis(500)))
        .with_provider(Arc::new(provider))
        .with_game_config(config.game.clone());
    let generator = Arc::new(generator);

    // The session takes its sanity input from the story's SAN.
    let san_delta = i32::from(config.typewriter.sanity) - generator.with_story(|s| s.san());
    generator.adjust_vitals(0, san_delta);

    let session = StorySession::new(generator, Arc::new(StdoutPresenter))
        .with_typewriter_config(config.typewriter.clone())
        .with_live_typing(config.live_typing);

    let turn = session.play_opening(TurnOptions::new()).await?;
    turn.finished().await;

    tracing::info!(
        retries = turn.result.retries,
        seeds = turn.result.seeds.len(),
        moods = ?turn.result.moods,
        "demo turn complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {message}");
            print_help();
            std::process::exit(2);
        }
    };
    let config = load_config(&args).await?;

    if args.demo {
        return run_demo(config).await;
    }

    let text = read_input(args.input.as_deref()).await?;
    let typewriter = Typewriter::new(config.typewriter.clone());
    typewriter.on_char(|c| StdoutPresenter.on_char(c));
    typewriter.append(&text);
    typewriter.start();
    typewriter.finished().await;
    println!();
    Ok(())
}

fn print_help() {
    println!("dread-preview - typewriter playback preview");
    println!();
    println!("USAGE:");
    println!("  dread-preview [OPTIONS] [FILE]");
    println!();
    println!("Plays FILE (or stdin) through the typewriter.");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help          Show this help message");
    println!("  --sanity <0-100>    Sanity input (below 40 varies speed, below 20 glitches)");
    println!("  --cps <N>           Characters per second");
    println!("  --config <PATH>     JSON configuration file");
    println!("  --demo              Play a scripted turn through the full session");
    println!("  --live              Type streamed chunks as they arrive (with --demo)");
    println!();
    println!("Environment variables prefixed DREAD_ override configuration values.");
}
