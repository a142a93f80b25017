mod app;
mod ui;

use anyhow::{Context, Result};
use app::{poll_event, App, AppAction, ChannelSink, TestUpdate};
use crossterm::event::Event;
use netscore::SpeedTest;
use ratatui::DefaultTerminal;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = init_logging()?;
    tracing::info!(log = %log_path.display(), "netscore starting");

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal).await;

    ratatui::restore();
    result
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging() -> Result<PathBuf> {
    let path = std::env::temp_dir().join("netscore.log");
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

async fn run_app(terminal: &mut DefaultTerminal) -> Result<()> {
    let mut app = App::new();
    let mut test_rx: Option<mpsc::UnboundedReceiver<TestUpdate>> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        // Drain test updates
        let mut disconnected = false;
        if let Some(rx) = test_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(update) => app.apply_update(update),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            test_rx = None;
        }

        // Handle input
        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        let test = SpeedTest::with_defaults(app.config.clone())
                            .context("failed to set up speed test")?
                            .with_sink(Arc::new(ChannelSink::new(tx.clone())));
                        let test = Arc::new(test);
                        test.prepare_run();

                        app.start_test(Arc::clone(&test));
                        test_rx = Some(rx);

                        tokio::spawn(async move {
                            let result = test.run_speed_test().await;
                            let _ = tx.send(TestUpdate::Finished(Box::new(result)));
                        });
                    }
                    AppAction::CancelTest => app.cancel_test(),
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
