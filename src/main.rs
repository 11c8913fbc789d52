use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use llama_interactive::cli::{App, Cli, LineEditor, Terminal};
use llama_interactive::{ByteEngine, Controller, InterruptState, Outcome};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let app = App::parse();
    app.init_tracing();
    let params = app.params()?;

    let engine = ByteEngine::new(params.n_ctx);
    let terminal = Terminal::new(params.use_color);
    let controller = Controller::new(params, engine, terminal)?;

    let interrupt = controller.interrupt();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let state = interrupt.signal();
            debug!(?state, "interrupt received");
        }
    });

    let (outcome, forced, timings) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut cli = Cli::new(controller, LineEditor::new()?);
        let outcome = cli.run()?;
        let controller = cli.controller();
        let forced = controller.interrupt().state() == InterruptState::Forced;
        Ok((outcome, forced, controller.timings().to_string()))
    })
    .await??;

    eprintln!("\n{timings}");

    if outcome == Outcome::Interrupted && forced {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
