// Handles the rendering of widgets to the terminal frame.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use switchboard::sync::{Connectivity, Lifecycle, ServiceState};

const SPINNER: [&str; 4] = ["⠋", "⠙", "⠸", "⠴"];

/// Main render function called every frame.
pub fn render(
    f: &mut Frame,
    services: &[ServiceState],
    connectivity: &Connectivity,
    notice: Option<&str>,
    tick: u64,
    list_state: &mut ListState,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, chunks[0], connectivity, notice);
    render_service_list(f, chunks[1], services, tick, list_state);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, area: Rect, connectivity: &Connectivity, notice: Option<&str>) {
    let color = match connectivity {
        Connectivity::Online => Color::Green,
        Connectivity::Offline | Connectivity::Error(_) => Color::Red,
    };

    let mut spans = vec![
        Span::raw("System: "),
        Span::styled(
            connectivity.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(notice) = notice {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(notice.to_string(), Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" SwitchBoard "));
    f.render_widget(paragraph, area);
}

fn light(lifecycle: Lifecycle) -> (&'static str, Color) {
    match lifecycle {
        Lifecycle::Running => ("●", Color::Green),
        Lifecycle::Stopped => ("○", Color::DarkGray),
        Lifecycle::Unknown => ("?", Color::Yellow),
    }
}

fn render_service_list(
    f: &mut Frame,
    area: Rect,
    services: &[ServiceState],
    tick: u64,
    state: &mut ListState,
) {
    let items: Vec<ListItem> = services
        .iter()
        .map(|service| {
            let (symbol, color) = light(service.lifecycle);

            let switch = if service.lifecycle.is_running() {
                "[ ON]"
            } else {
                "[OFF]"
            };
            let switch_style = if service.toggle_in_flight {
                Style::default().fg(Color::DarkGray)
            } else if service.lifecycle.is_running() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            };
            let busy = if service.toggle_in_flight {
                SPINNER[(tick % SPINNER.len() as u64) as usize]
            } else {
                " "
            };

            let content = Line::from(vec![
                Span::styled(format!("{} ", symbol), Style::default().fg(color)),
                Span::raw(format!("{:<28}", service.display_name)),
                Span::styled(switch, switch_style),
                Span::raw(format!(" {} ", busy)),
                Span::styled(service.status_text.clone(), Style::default().fg(Color::Gray)),
            ]);

            ListItem::new(content)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Services "))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, state);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let help_text = Line::from(vec![
        Span::raw("Nav: "),
        Span::styled("j/k ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("| Toggle: "),
        Span::styled("space/enter ", Style::default().fg(Color::Cyan)),
        Span::raw("| Refresh: "),
        Span::styled("r ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("| Quit: "),
        Span::styled("q", Style::default().fg(Color::Red)),
    ]);

    let paragraph =
        Paragraph::new(help_text).block(Block::default().borders(Borders::ALL).title(" Controls "));

    f.render_widget(paragraph, area);
}
