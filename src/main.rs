use anyhow::{Context, Result};
use parla::persona::{Gender, UserLevel, UserProfile};
use parla::session::{ConnectionState, SessionConfig, VoiceSession};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parla=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_key = std::env::var("GEMINI_API_KEY")
        .context("GEMINI_API_KEY is not set; export your API key first")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(api_key))
}

async fn run(api_key: String) -> Result<()> {
    info!("Starting Parla voice tutor");

    let profile = UserProfile::new("Omar", Gender::Male, UserLevel::Beginner);
    let session = VoiceSession::new(SessionConfig::new(api_key, profile));

    session.start().await?;
    println!("Session started. Speak into the microphone; Ctrl-C to stop.\n");

    let mut last_render = String::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                let snapshot = session.snapshot();

                if snapshot.connection_state == ConnectionState::Error {
                    if let Some(message) = &snapshot.error_message {
                        eprintln!("Session ended: {}", message);
                    }
                    break;
                }

                let rendered = render(&snapshot);
                if rendered != last_render {
                    println!("{}", rendered);
                    last_render = rendered;
                }
            }
        }
    }

    session.stop();
    info!("Session stopped");
    Ok(())
}

/// One-line-per-change terminal rendering of the practice card
fn render(snapshot: &parla::session::SessionSnapshot) -> String {
    let mut lines = Vec::new();

    if let Some(sentence) = &snapshot.sentence {
        let words: Vec<String> = sentence
            .words
            .iter()
            .map(|word| {
                use parla::session::WordStatus;
                match word.status {
                    WordStatus::Pending => word.text.clone(),
                    WordStatus::Correct => format!("[{}✓]", word.text),
                    WordStatus::Incorrect => format!("[{}✗]", word.text),
                }
            })
            .collect();
        lines.push(format!("Practice: {}", words.join(" ")));
        lines.push(format!("          {}", sentence.translation));
        if snapshot.is_perfect {
            lines.push("★ Perfect!".to_string());
        }
    }

    if !snapshot.transcript.is_empty() {
        lines.push(format!("Tutor: {}", snapshot.transcript));
    }
    if !snapshot.input_transcript.is_empty() {
        lines.push(format!("You:   {}", snapshot.input_transcript));
    }

    lines.join("\n")
}
