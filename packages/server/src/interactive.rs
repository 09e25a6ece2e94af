//! Interactive mode for the server.
//!
//! Prompts for the store backend, bind address and port before starting
//! the server.

use dialoguer::{Confirm, Input, Select};

const BACKENDS: &[&str] = &["sheets", "memory"];

/// Runs the server in interactive mode, prompting for configuration.
///
/// Asks for a store backend, bind address and port, sets the
/// corresponding environment variables (`SURVEY_STORE`, `BIND_ADDR`,
/// `PORT`), and delegates to [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the underlying server fails to
/// start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Survey Map Server");
    println!();

    let current = std::env::var("SURVEY_STORE").unwrap_or_else(|_| "sheets".to_string());
    let backend_idx = Select::new()
        .with_prompt("Survey store")
        .items(BACKENDS)
        .default(BACKENDS.iter().position(|b| *b == current).unwrap_or(0))
        .interact()
        .unwrap_or(0);

    let bind_addr: String = Input::new()
        .with_prompt("Bind address")
        .default("127.0.0.1".to_string())
        .interact_text()
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let port_str: String = Input::new()
        .with_prompt("Port")
        .default("8080".to_string())
        .interact_text()
        .unwrap_or_else(|_| "8080".to_string());

    // SAFETY: We are single-threaded at this point (before server starts) and
    // these variables are only read once during server initialisation.
    unsafe {
        std::env::set_var("SURVEY_STORE", BACKENDS[backend_idx]);
        std::env::set_var("BIND_ADDR", &bind_addr);
        std::env::set_var("PORT", &port_str);
    }

    if !Confirm::new()
        .with_prompt(format!(
            "Start server on {bind_addr}:{port_str} ({} store)?",
            BACKENDS[backend_idx]
        ))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server().await
}
