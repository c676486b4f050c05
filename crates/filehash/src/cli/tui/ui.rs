//! UI rendering for the TUI

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::app::{App, TuiMode, MENU_ITEMS};
use crate::cli::output::{format_mb, format_number};

/// Hash characters shown in the report list.
const HASH_PREVIEW: usize = 8;

/// Draw the whole frame for the current mode
pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Body
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    let title = Paragraph::new(format!(" {} ", title_for(app.mode)))
        .style(Style::default().fg(Color::Cyan).bold())
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(title, chunks[0]);

    match app.mode {
        TuiMode::Menu => draw_menu(frame, app, chunks[1]),
        TuiMode::ScanPrompt => draw_prompt(frame, app, chunks[1]),
        TuiMode::Scanning => draw_scanning(frame, app, chunks[1]),
        TuiMode::Report => draw_report(frame, app, chunks[1]),
        TuiMode::DuplicateDetail => draw_detail(frame, app, chunks[1]),
        TuiMode::Pruning => draw_pruning(frame, app, chunks[1]),
        TuiMode::Message => draw_message(frame, app, chunks[1]),
    }

    let footer = Paragraph::new(format!(" {} ", footer_for(app.mode)))
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);
}

fn title_for(mode: TuiMode) -> &'static str {
    match mode {
        TuiMode::Menu => "File Hasher",
        TuiMode::ScanPrompt | TuiMode::Scanning => "Scan Directory",
        TuiMode::Report => "Database Report",
        TuiMode::DuplicateDetail => "Duplicate Details",
        TuiMode::Pruning => "Prune Invalid Entries",
        TuiMode::Message => "File Hasher",
    }
}

fn footer_for(mode: TuiMode) -> &'static str {
    match mode {
        TuiMode::Menu => "Use Arrow Keys to Navigate, Enter to Select, 'q' to Quit",
        TuiMode::ScanPrompt => "[Enter] Start scan  [Esc] Back",
        TuiMode::Scanning => "[Esc] Cancel scan",
        TuiMode::Report => "[↑↓] Select duplicate  [Enter] View files  [q/Esc] Back",
        TuiMode::DuplicateDetail => "[↑↓/PgUp/PgDn] Scroll  [q/Esc] Back",
        TuiMode::Pruning => "Please wait...",
        TuiMode::Message => "Press any key to return...",
    }
}

fn selectable_line(text: String, selected: bool) -> Line<'static> {
    if selected {
        Line::from(Span::styled(
            format!("► {}", text),
            Style::default().fg(Color::Black).bg(Color::Cyan).bold(),
        ))
    } else {
        Line::from(format!("  {}", text))
    }
}

fn section_header(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Yellow).bold(),
    ))
}

fn draw_menu(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from("Main Menu"),
        Line::from(format!("Database: {}", app.db_path.display()))
            .style(Style::default().fg(Color::DarkGray)),
        Line::from(""),
    ];
    lines.extend(
        MENU_ITEMS
            .iter()
            .enumerate()
            .map(|(i, item)| selectable_line(item.to_string(), i == app.menu_index)),
    );
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_prompt(frame: &mut Frame, app: &App, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("Enter directory to scan (default: .): "),
            Span::styled(format!("{}_", app.input), Style::default().fg(Color::Cyan)),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

fn draw_scanning(frame: &mut Frame, app: &App, area: Rect) {
    let Some(job) = &app.scan else {
        return;
    };
    let lines = vec![
        Line::from(format!("Scanning '{}'... Please wait.", job.path)),
        Line::from(""),
        Line::from(format!(
            "Last processed: {}",
            job.last_file.as_deref().unwrap_or("-")
        )),
        Line::from(format!("Total files: {}", format_number(job.files_processed))),
        Line::from(format!("Committed: {}", format_number(job.files_committed))),
        Line::from(format!(
            "Elapsed: {:.1}s",
            job.started.elapsed().as_secs_f64()
        )),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

fn draw_report(frame: &mut Frame, app: &App, area: Rect) {
    let Some(report) = &app.report else {
        return;
    };

    let mut lines = vec![
        Line::from(format!(
            "Total Files Stored: {}",
            format_number(report.total_files)
        )),
        Line::from(format!("Total Size tracked: {}", format_mb(report.total_size))),
        Line::from(""),
        section_header("--- Top 5 Largest Files ---"),
    ];
    if report.largest_files.is_empty() {
        lines.push(Line::from("  (none)"));
    }
    for file in &report.largest_files {
        lines.push(Line::from(format!(
            "  {} ({})",
            file.display_name(),
            format_mb(file.size_bytes.unwrap_or(0))
        )));
    }

    lines.push(Line::from(""));
    lines.push(section_header(
        "--- Top 5 Duplicate Hashes (Select to view details) ---",
    ));
    if report.duplicates.is_empty() {
        lines.push(Line::from("  No complete duplicates found."));
    }
    for (i, group) in report.duplicates.iter().enumerate() {
        let preview: String = group.content_hash.chars().take(HASH_PREVIEW).collect();
        lines.push(selectable_line(
            format!(
                "Hash {}... : {} copies ({} total, {} reclaimable)",
                preview,
                group.copies,
                format_mb(group.total_size),
                format_mb(group.reclaimable_bytes())
            ),
            i == app.report_index,
        ));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_detail(frame: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = &app.detail else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);

    let header = vec![
        Line::from(format!(
            "Duplicate Files for Hash: {}",
            detail.group.content_hash
        ))
        .style(Style::default().bold()),
        Line::from(format!(
            "Count: {} | Total Size: {}",
            detail.group.copies,
            format_mb(detail.group.total_size)
        )),
        Line::from(""),
        Line::from(format!("Files ({}):", detail.files.len())),
    ];
    frame.render_widget(Paragraph::new(header), chunks[0]);

    let rows: Vec<Line> = detail
        .files
        .iter()
        .enumerate()
        .map(|(i, f)| Line::from(format!("{}. {}", i + 1, f.full_path)))
        .collect();
    let scroll = u16::try_from(detail.scroll).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(rows).scroll((scroll, 0)), chunks[1]);
}

fn draw_pruning(frame: &mut Frame, _app: &App, area: Rect) {
    let lines = vec![
        Line::from("Pruning Invalid Entries..."),
        Line::from("Checking all database records against filesystem..."),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_message(frame: &mut Frame, app: &App, area: Rect) {
    let Some(message) = &app.message else {
        return;
    };
    let color = if message.is_error {
        Color::Red
    } else {
        Color::Green
    };
    let paragraph = Paragraph::new(Line::from(Span::styled(
        message.text.clone(),
        Style::default().fg(color).bold(),
    )))
    .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use filehash::scan::{DuplicateGroup, FileRecord, ReportData};
    use filehash::FilehashConfig;
    use ratatui::backend::TestBackend;
    use std::path::PathBuf;

    fn render(app: &App) -> String {
        let backend = TestBackend::new(100, 30);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| draw(frame, app)).unwrap();
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            full_path: path.to_string(),
            host: "h".to_string(),
            content_hash: Some("b1946ac92492d2347c6235b4d2611184".to_string()),
            parent_dir: None,
            size_bytes: Some(size),
            filename: path.rsplit('/').next().map(str::to_string),
            extension: None,
            modified_at: None,
            created_at: None,
            readable: Some(true),
            last_checked_at: chrono::Utc::now(),
        }
    }

    fn app() -> App {
        App::new(FilehashConfig::default(), PathBuf::from("/tmp/test.sqlite"))
    }

    #[test]
    fn test_menu_lists_every_item() {
        let screen = render(&app());
        for item in MENU_ITEMS {
            assert!(screen.contains(item), "missing {item}");
        }
        assert!(screen.contains("► Scan Directory"));
    }

    #[test]
    fn test_prompt_shows_input() {
        let mut app = app();
        app.mode = TuiMode::ScanPrompt;
        app.input = "/data".to_string();
        let screen = render(&app);
        assert!(screen.contains("Enter directory to scan (default: .): /data_"));
    }

    #[test]
    fn test_empty_report() {
        let mut app = app();
        app.mode = TuiMode::Report;
        app.report = Some(ReportData::default());
        let screen = render(&app);
        assert!(screen.contains("Total Files Stored: 0"));
        assert!(screen.contains("No complete duplicates found."));
    }

    #[test]
    fn test_report_lists_duplicates() {
        let mut app = app();
        app.mode = TuiMode::Report;
        app.report = Some(ReportData {
            total_files: 2,
            total_size: 2 * 1024 * 1024,
            largest_files: vec![record("/a/big.bin", 1024 * 1024)],
            duplicates: vec![DuplicateGroup {
                content_hash: "b1946ac92492d2347c6235b4d2611184".to_string(),
                copies: 2,
                total_size: 2 * 1024 * 1024,
            }],
        });
        let screen = render(&app);
        assert!(screen.contains("big.bin (1.00 MB)"));
        assert!(screen.contains("Hash b1946ac9... : 2 copies (2.00 MB total"));
    }

    #[test]
    fn test_detail_view() {
        let mut app = app();
        app.mode = TuiMode::DuplicateDetail;
        app.detail = Some(super::super::app::DuplicateDetail {
            group: DuplicateGroup {
                content_hash: "b1946ac92492d2347c6235b4d2611184".to_string(),
                copies: 2,
                total_size: 12,
            },
            files: vec![record("/a/x.txt", 6), record("/b/x.txt", 6)],
            scroll: 0,
        });
        let screen = render(&app);
        assert!(screen.contains("Duplicate Files for Hash: b1946ac92492d2347c6235b4d2611184"));
        assert!(screen.contains("Files (2):"));
        assert!(screen.contains("1. /a/x.txt"));
        assert!(screen.contains("2. /b/x.txt"));
    }

    #[test]
    fn test_pruning_screen() {
        let mut app = app();
        app.mode = TuiMode::Pruning;
        assert!(render(&app).contains("Pruning Invalid Entries..."));
    }
}
