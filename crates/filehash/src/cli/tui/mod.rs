//! Terminal User Interface for filehash
//!
//! Menu-driven front end over scan, report and prune.

pub mod app;
pub mod event;
pub mod ui;

use anyhow::Result;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, prelude::*, Terminal};
use std::io::stdout;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::tui::app::App;
use crate::cli::tui::event::{Event, EventHandler};
use filehash::FilehashConfig;

/// Run the TUI until the user exits
pub fn run(config: FilehashConfig, db_path: PathBuf) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, db_path);
    let events = EventHandler::new(Duration::from_millis(100));

    let result = run_app(&mut terminal, &mut app, &events);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Run the application loop
fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &EventHandler,
) -> Result<()> {
    while app.running {
        terminal.draw(|frame| ui::draw(frame, app))?;

        match events.next()? {
            Event::Key(key) => app.handle_key(key),
            Event::Tick => app.tick(),
            Event::Resize(_, _) => {} // Ratatui handles resize
        }
    }

    // Stop a running scan before returning
    if let Some(job) = &app.scan {
        job.cancel.cancel();
    }
    app.wait_for_jobs(Duration::from_secs(5));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    #[test]
    fn test_app_starts_in_menu_mode() {
        let app = App::new(FilehashConfig::default(), PathBuf::from("db.sqlite"));
        assert!(matches!(app.mode, app::TuiMode::Menu));
        assert!(app.running);
    }

    #[test]
    fn test_app_renders_without_panic() {
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        let app = App::new(FilehashConfig::default(), PathBuf::from("db.sqlite"));

        terminal.draw(|frame| ui::draw(frame, &app)).unwrap();

        let buffer = terminal.backend().buffer();
        assert!(buffer.area.width == 80);
        assert!(buffer.area.height == 24);
    }
}
