//! Parley entry point
//!
//! A line-oriented shell around one session: each stdin line is a user turn,
//! replies stream to the speaker as they are produced. Exit codes: 0 normal,
//! 1 configuration error, 2 unrecoverable backend failure, 130 user
//! interrupt.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley_config::load_settings;
use parley_core::TurnOutcome;
use parley_session::Session;
use parley_synth::{NullPlayer, Player};

const EXIT_CONFIG: u8 = 1;
const EXIT_BACKEND: u8 = 2;
const EXIT_INTERRUPT: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut env_name = None;
    let mut mute = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--mute" => mute = true,
            other if env_name.is_none() && !other.starts_with('-') => {
                env_name = Some(other.to_string());
            }
            other => {
                eprintln!("unknown argument: {}", other);
                return ExitCode::from(EXIT_CONFIG);
            }
        }
    }

    let settings = match load_settings(env_name.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let session = if mute {
        Session::from_settings_with_player(&settings, Arc::new(NullPlayer) as Arc<dyn Player>)
    } else {
        Session::from_settings(&settings)
    };
    let session = match session {
        Ok(session) => Arc::new(session),
        Err(e) => {
            eprintln!("startup failed: {}", e);
            return ExitCode::from(EXIT_BACKEND);
        }
    };

    session.start();
    if session.restore_latest().await {
        tracing::info!("resumed previous conversation");
    }

    println!("parley ready. Type a message, or press Ctrl+C to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let code = loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break EXIT_INTERRUPT;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break 0,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break EXIT_BACKEND;
            }
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match session.chat(text).await {
            Ok(result) => {
                if !result.response.is_empty() {
                    println!("assistant> {}", result.response.trim());
                }
                if result.outcome != TurnOutcome::Completed {
                    println!("[turn {}]", result.outcome);
                }
                if result.should_end {
                    break 0;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed outside its boundary");
                break EXIT_BACKEND;
            }
        }
    };

    session.shutdown().await;
    ExitCode::from(code)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
