//! PitchReel CLI - Pitch Video Narration
//!
//! A command-line tool for checking pitch scripts, synthesizing scene
//! narration, and building the voiceover and timing for the video renderer.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use pitchreel_core::tts::{DEFAULT_VOICE_SPEED, generate_scene};
use pitchreel_core::validator::needs_review;
use pitchreel_core::{
    BuildConfig, BuildEvent, BuildOptions, BuildPipeline, CONFIG_FILE, DEFAULT_DELIMITER,
    EspeakPhonemizer, KokoroSynthesizer, MetaConfig, NarrateOptions, PitchError, ProcessRunner,
    SilenceSynthesizer, Synthesizer, ToolPaths, VoiceCatalog, analyze, narrate, parse_script,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pitchreel",
    version,
    about = "Pitch video narration - script checks, voiceover and renderer timing",
    long_about = "Builds a narrated pitch video's voiceover track and frame-accurate timing from per-scene audio."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the voiceover, timing files and manifest from a configuration
    Build {
        /// Scene configuration file
        #[arg(short, long, default_value = CONFIG_FILE, value_name = "FILE")]
        config: PathBuf,

        /// Copy the outputs into the renderer project
        #[arg(long)]
        deploy: bool,

        /// Render the video after deploying
        #[arg(long, requires = "deploy")]
        render: bool,
    },

    /// Synthesize one scene from phrases, with a short pause between them
    GenerateScene {
        /// Scene id (becomes <ID>.wav)
        #[arg(value_name = "ID")]
        id: String,

        /// Phrases to speak, in order
        #[arg(value_name = "PHRASE", required = true, num_args = 1..)]
        phrases: Vec<String>,

        #[arg(long, default_value = pitchreel_core::scene::DEFAULT_VOICE, value_name = "VOICE")]
        voice: String,

        #[arg(long, default_value_t = DEFAULT_VOICE_SPEED, value_name = "RATE")]
        speed: f32,

        /// Directory the clip is written to
        #[arg(short, long, default_value = ".", value_name = "DIR")]
        out_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = Engine::Kokoro)]
        engine: Engine,
    },

    /// Check a script for pronunciation risks
    Validate {
        /// Script file
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Scene delimiter
        #[arg(long, default_value = DEFAULT_DELIMITER)]
        delimiter: String,
    },

    /// Convert text to IPA with espeak-ng
    Phonemize {
        #[arg(value_name = "TEXT", required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// List narration voices
    ListVoices {
        /// Load the synthesis engine and list every voice it provides
        #[arg(long)]
        all: bool,
    },

    /// Check, synthesize and build a whole script
    Narrate {
        /// Script file
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        #[arg(long, default_value = DEFAULT_DELIMITER)]
        delimiter: String,

        /// Directory for scene clips, scenes.toml and build outputs
        #[arg(short, long, default_value = "narration", value_name = "DIR")]
        out_dir: PathBuf,

        #[arg(long, default_value = "pitch")]
        project: String,

        #[arg(long, default_value = "v1")]
        version: String,

        #[arg(long, default_value = pitchreel_core::scene::DEFAULT_VOICE)]
        voice: String,

        /// Silence between scenes, in seconds
        #[arg(long, value_name = "SECONDS")]
        gap: Option<f64>,

        #[arg(long, value_enum, default_value_t = Engine::Kokoro)]
        engine: Engine,
    },
}

/// Synthesis backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Engine {
    /// Kokoro via kokoro-tiny (downloads the model on first run)
    Kokoro,
    /// Fixed-length silence, for dry runs
    Silence,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let tools = ToolPaths::from_env();
    debug!(?tools, "tool paths");

    if let Err(e) = run(cli.command, tools).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Command, tools: ToolPaths) -> Result<(), PitchError> {
    match command {
        Command::Build {
            config,
            deploy,
            render,
        } => {
            let config = BuildConfig::load(&config)?;
            print_header("Build", &format!("{} {}", config.meta.project, config.meta.version));
            println!("{} {}", "Scenes:".bold(), config.scenes.len());

            let report = build(config, tools, BuildOptions { deploy, render }).await?;
            if let Some(video) = report.video {
                println!("{} {}", "Video:".bold(), video.display().to_string().bright_white());
            }
            print_footer("Build complete.");
        }

        Command::GenerateScene {
            id,
            phrases,
            voice,
            speed,
            out_dir,
            engine,
        } => {
            print_header("Generate Scene", &id);
            let mut synth = make_synthesizer(engine).await?;
            synth.catalog().resolve(&voice)?;
            std::fs::create_dir_all(&out_dir)?;

            for (i, phrase) in phrases.iter().enumerate() {
                println!("  {}. {}", i + 1, phrase.bright_white());
            }
            let scene = generate_scene(synth.as_mut(), &id, &phrases, &voice, speed, &out_dir)?;

            println!();
            println!(
                "{} {} ({:.2}s)",
                "Wrote".bright_green(),
                out_dir.join(format!("{}.wav", scene.id())).display(),
                scene.duration_seconds().unwrap_or_default()
            );
            print_footer("Scene ready.");
        }

        Command::Validate { script, delimiter } => {
            let text = std::fs::read_to_string(&script)?;
            let scenes = parse_script(&text, &delimiter)?;
            print_header("Script Check", &script.display().to_string());

            let mut total = 0;
            let mut review = false;
            for scene in &scenes {
                let issues = analyze(scene.text());
                if issues.is_empty() {
                    continue;
                }
                review |= needs_review(&issues);
                total += issues.len();

                println!("{}", format!("[{}]", scene.id()).bright_cyan().bold());
                for issue in &issues {
                    println!(
                        "  {} {} {}",
                        format!("{:<14}", issue.kind.display_name()).yellow(),
                        issue.matched_text.bright_white(),
                        format!("({})", issue.required_action).dimmed()
                    );
                    for line in textwrap(&issue.suggestion, 60).lines() {
                        println!("      {}", line.dimmed());
                    }
                }
                println!();
            }

            println!("{} {} scenes, {} findings", "Checked:".bold(), scenes.len(), total);
            if review {
                print_footer("Review the findings above before synthesis.");
            } else {
                print_footer("Nothing needs review.");
            }
        }

        Command::Phonemize { text } => {
            let phonemizer = EspeakPhonemizer::new(Arc::new(ProcessRunner::default()), &tools.espeak);
            let ipa = phonemizer.phonemize(&text.join(" ")).await?;
            println!("{}", ipa);
        }

        Command::ListVoices { all } => {
            let catalog = if all {
                make_synthesizer(Engine::Kokoro).await?.catalog().clone()
            } else {
                VoiceCatalog::known()
            };
            print_voices(&catalog);
        }

        Command::Narrate {
            script,
            delimiter,
            out_dir,
            project,
            version,
            voice,
            gap,
            engine,
        } => {
            let text = std::fs::read_to_string(&script)?;
            print_header("Narrate", &format!("{} {}", project, version));

            let mut meta = MetaConfig::new(project, version);
            meta.voice = voice;
            if let Some(gap) = gap {
                meta.scene_gap_seconds = gap;
            }
            let options = NarrateOptions {
                delimiter,
                out_dir,
                meta,
            };

            let mut synth = make_synthesizer(engine).await?;
            let callback = create_console_callback();
            let config = narrate(&text, &options, synth.as_mut(), &*callback)?;

            build(config, tools, BuildOptions::default()).await?;
            print_footer("Narration complete.");
        }
    }

    Ok(())
}

async fn build(
    config: BuildConfig,
    tools: ToolPaths,
    options: BuildOptions,
) -> Result<pitchreel_core::BuildReport, PitchError> {
    let runner = Arc::new(ProcessRunner::new(config.meta.tool_timeout()));
    BuildPipeline::new(config, runner, tools)
        .with_callback(create_console_callback())
        .run(options)
        .await
}

async fn make_synthesizer(engine: Engine) -> Result<Box<dyn Synthesizer>, PitchError> {
    match engine {
        Engine::Kokoro => {
            println!("{}", "Loading Kokoro model...".dimmed());
            Ok(Box::new(KokoroSynthesizer::new().await?))
        }
        Engine::Silence => Ok(Box::new(SilenceSynthesizer::new(
            pitchreel_core::tts::KOKORO_SAMPLE_RATE,
            2.0,
        ))),
    }
}

fn print_voices(catalog: &VoiceCatalog) {
    print_header("Voices", &format!("{} available", catalog.len()));
    for (name, description) in catalog.entries() {
        match description {
            Some(description) => {
                println!("  {} {}", format!("{:<12}", name).bright_cyan(), description)
            }
            None => println!("  {}", name.bright_cyan()),
        }
    }
    println!();
}

fn print_header(title: &str, subtitle: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", format!("PitchReel {}", title).bold(), subtitle)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

fn print_footer(message: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", message).bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

/// Create a callback that prints build events to the console.
fn create_console_callback() -> Box<dyn Fn(BuildEvent) + Send + Sync> {
    Box::new(move |event| match event {
        BuildEvent::StageStart { name, detail } => {
            println!();
            println!(
                "{} {} {}",
                "▶".bright_magenta(),
                name.bright_magenta().bold(),
                detail.dimmed()
            );
        }
        BuildEvent::SceneMeasured { id, seconds } => {
            println!("  {} {:.2}s", format!("{:<16}", id).bright_cyan(), seconds);
        }
        BuildEvent::SceneSynthesized { id, path, seconds } => {
            println!(
                "  {} {:.2}s {}",
                format!("{:<16}", id).bright_cyan(),
                seconds,
                path.display().to_string().dimmed()
            );
        }
        BuildEvent::ScriptIssue { scene_id, issue } => {
            println!(
                "  {} {} {} {}",
                "!".yellow().bold(),
                format!("[{}]", scene_id).bright_cyan(),
                issue.matched_text.bright_white(),
                issue.suggestion.dimmed()
            );
        }
        BuildEvent::Artifact { label, path } => {
            println!(
                "  {} {} {}",
                "✓".bright_green(),
                format!("{}:", label).bold(),
                path.display()
            );
        }
        BuildEvent::BuildEnd {
            total_seconds,
            total_frames,
        } => {
            println!();
            println!(
                "{} {:.2}s, {} frames",
                "Total:".bold(),
                total_seconds,
                total_frames
            );
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
