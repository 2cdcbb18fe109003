use chrono::Local;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};
use kerbside_core::{
    coordinator::{CollectionCoordinator, POLL_INTERVAL_COLLECTION_DAY},
    model::CollectionKind,
};

use crate::app::{App, Screen};

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    // Title / header
    let header = Paragraph::new("kerbside – South Gloucestershire bin collections")
        .block(Block::default().borders(Borders::ALL).title("Kerbside"));
    frame.render_widget(header, *header_area);

    // Main screen
    match app.screen {
        Screen::PostcodeEntry => draw_postcode_entry(frame, app, *content_area),
        Screen::AddressSelect => draw_address_select(frame, app, *content_area),
        Screen::Dashboard => draw_dashboard(frame, app, *content_area),
    }

    // Status bar
    let nav_hint = match app.screen {
        Screen::PostcodeEntry => "Type a postcode · Enter look up · Esc/Ctrl-C quit",
        Screen::AddressSelect => "↑/↓ move · Enter watch address · Left/Esc back · q quit",
        Screen::Dashboard => "r refresh now · Esc/←/b back · q quit",
    };

    let status_text = if app.is_loading {
        format!("Loading… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else if let Some(coordinator) = &app.coordinator {
        format!("{} · {nav_hint}", polling_summary(coordinator))
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_postcode_entry(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // input
            Constraint::Min(0),    // hint
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [input_area, hint_area] = chunks else {
        return;
    };

    let input = Paragraph::new(app.postcode_input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Postcode (Enter to look up addresses)"),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(input, *input_area);

    let hint = Paragraph::new(
        "Enter the postcode of the household to watch.\n\
         The council's address lookup will list matching properties.",
    )
    .block(Block::default().borders(Borders::ALL))
    .wrap(Wrap { trim: true });

    frame.render_widget(hint, *hint_area);
}

fn draw_address_select(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let items = if app.address_results.is_empty() {
        vec![ListItem::new("No addresses. Go back and try another postcode.")]
    } else {
        app.address_results
            .iter()
            .enumerate()
            .map(|(idx, address)| {
                let prefix = if idx == app.address_list_index {
                    "> "
                } else {
                    "  "
                };
                ListItem::new(format!("{prefix}{}", address.label))
            })
            .collect()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Select address (↑/↓, Enter)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.address_results.is_empty() {
        state.select(Some(app.address_list_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_dashboard(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let address_label = app
        .selected_address
        .as_ref()
        .map_or("<address>", |address| address.label.as_str());

    let title = format!("Collections for {address_label}");

    let Some(coordinator) = &app.coordinator else {
        let paragraph = Paragraph::new("Not watching any address yet.")
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    };

    let today = Local::now().date_naive();

    let snapshot = coordinator.snapshot();

    let rows = CollectionKind::ALL.into_iter().map(|kind| {
        if !coordinator.is_available(kind) {
            return Row::new(vec![
                Cell::from(kind_label(kind)),
                Cell::from("—"),
                Cell::from(""),
                Cell::from(""),
                Cell::from("not available"),
                Cell::from(""),
            ])
            .style(Style::default().fg(Color::DarkGray));
        }

        let next = coordinator.next_collection_date(kind);
        let (date, weekday, relative) = match next {
            Some(next) => (
                next.format("%d/%m/%Y").to_string(),
                next.format("%a").to_string(),
                relative_day_label(next, today),
            ),
            None => ("—".to_owned(), String::new(), String::new()),
        };

        let status = coordinator.live_status(kind);
        let status_style = status_style_for(status.as_deref());
        let status_text = match (status, coordinator.live_status_reason(kind)) {
            (Some(status), Some(reason)) => format!("{status} ({reason})"),
            (Some(status), None) => status,
            (None, _) => String::new(),
        };

        let schedule = snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.collection(kind))
            .map(|info| info.schedule.clone())
            .unwrap_or_default();

        let mut style = Style::default().fg(kind_color(kind));
        if coordinator.is_collection_day(Some(kind)) {
            style = style.add_modifier(Modifier::BOLD);
        }

        Row::new(vec![
            Cell::from(kind_label(kind)),
            Cell::from(date),
            Cell::from(weekday),
            Cell::from(relative),
            Cell::from(status_text).style(status_style),
            Cell::from(schedule),
        ])
        .style(style)
    });

    let column_widths = [
        Constraint::Length(10),
        Constraint::Length(12),
        Constraint::Length(5),
        Constraint::Length(12),
        Constraint::Min(18),
        Constraint::Min(16),
    ];

    let table = Table::new(rows, column_widths)
        .header(
            Row::new(vec!["Service", "Next", "Day", "In", "Live status", "Schedule"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title(title))
        .column_spacing(1);

    frame.render_widget(table, area);
}

fn kind_label(kind: CollectionKind) -> &'static str {
    match kind {
        CollectionKind::Refuse => "Refuse",
        CollectionKind::Recycling => "Recycling",
        CollectionKind::Food => "Food",
        CollectionKind::Garden => "Garden",
    }
}

fn kind_color(kind: CollectionKind) -> Color {
    match kind {
        CollectionKind::Refuse => Color::Gray,
        CollectionKind::Recycling => Color::Cyan,
        CollectionKind::Food => Color::Green,
        CollectionKind::Garden => Color::LightGreen,
    }
}

/// Green when done, yellow while the crew is out, red when a round
/// went wrong.
fn status_style_for(status: Option<&str>) -> Style {
    let Some(status) = status else {
        return Style::default();
    };

    let status = status.to_lowercase();
    let color = match status.as_str() {
        "closed completed" | "completed" => Color::Green,
        "in progress" => Color::Yellow,
        "delayed" | "cancelled" => Color::Red,
        _ => Color::White,
    };
    Style::default().fg(color)
}

fn polling_summary(coordinator: &CollectionCoordinator) -> String {
    let cadence = if coordinator.poll_interval() == POLL_INTERVAL_COLLECTION_DAY {
        "every 15 min (collection day)"
    } else {
        "daily"
    };

    match coordinator.last_fetch_at() {
        Some(at) => format!("updated {} · polling {cadence}", at.format("%H:%M")),
        None => format!("polling {cadence}"),
    }
}

fn relative_day_label(date: chrono::NaiveDate, today: chrono::NaiveDate) -> String {
    let delta = (date - today).num_days();
    match delta {
        0 => "today".to_owned(),
        1 => "tomorrow".to_owned(),
        days if days > 1 => format!("in {days} days"),
        -1 => "yesterday".to_owned(),
        days => format!("{} days ago", days.abs()),
    }
}
