use crate::app::{App, AppView, Panel};
use netscore::settings::SettingsField;
use netscore::speedtest::bufferbloat::BufferbloatRating;
use netscore::speedtest::packet_loss::PacketLossResult;
use netscore::{Sample, TestPhase};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

// Color Palette - Elegant & Minimal
const ACCENT: Color = Color::Rgb(100, 149, 237);      // Cornflower blue
const SUCCESS: Color = Color::Rgb(134, 194, 156);     // Soft green
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const INFO: Color = Color::Rgb(147, 180, 220);        // Soft blue
const INFO_DIM: Color = Color::Rgb(90, 110, 140);
const WARN: Color = Color::Rgb(220, 180, 130);        // Soft amber
const ALERT: Color = Color::Rgb(210, 120, 120);       // Muted red
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

/// Phases shown in the header, in run order.
const PHASES: [(TestPhase, &str); 5] = [
    (TestPhase::Ping, "ping"),
    (TestPhase::Download, "down"),
    (TestPhase::Upload, "up"),
    (TestPhase::PacketLoss, "loss"),
    (TestPhase::Bufferbloat, "bloat"),
];

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    match app.view {
        AppView::Main => {
            if app.expanded {
                draw_expanded_view(frame, area, app);
            } else {
                draw_normal_view(frame, area, app);
            }
        }
        AppView::Settings => {
            draw_settings_view(frame, area, app);
        }
    }
}

fn draw_normal_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], app);

    let panels = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(chunks[1]);

    let selected = |panel: Panel| app.selected_panel == panel;
    draw_speed_panel(frame, panels[0], app, TestPhase::Download, selected(Panel::Download));
    draw_speed_panel(frame, panels[1], app, TestPhase::Upload, selected(Panel::Upload));
    draw_ping_panel(frame, panels[2], app, selected(Panel::Ping));

    draw_quality_line(frame, chunks[2], app);
    draw_help(frame, chunks[3], app);
}

fn draw_expanded_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], app);

    match app.selected_panel {
        Panel::Download => draw_speed_expanded(frame, chunks[1], app, TestPhase::Download),
        Panel::Upload => draw_speed_expanded(frame, chunks[1], app, TestPhase::Upload),
        Panel::Ping => draw_ping_expanded(frame, chunks[1], app),
    }

    draw_help(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(34),
    ])
    .split(inner);

    let title = Paragraph::new("netscore")
        .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD));
    frame.render_widget(title, chunks[0]);

    let (status, color) = if app.cancelling {
        ("Cancelling...", ALERT)
    } else {
        match app.phase {
            TestPhase::Idle if app.is_running() => ("Selecting server...", TEXT_SECONDARY),
            TestPhase::Idle => ("Ready", TEXT_MUTED),
            TestPhase::Ping => ("Measuring latency...", WARN),
            TestPhase::Download => ("Testing download...", SUCCESS),
            TestPhase::Upload => ("Testing upload...", INFO),
            TestPhase::PacketLoss => ("Checking packet loss...", WARN),
            TestPhase::Bufferbloat => ("Latency under load...", ALERT),
            TestPhase::Complete => ("Complete", ACCENT),
        }
    };

    let status_text = Paragraph::new(status)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);
    frame.render_widget(status_text, chunks[1]);

    frame.render_widget(
        Paragraph::new(create_phase_text(app.phase)).alignment(Alignment::Right),
        chunks[2],
    );
}

/// Position of a phase in the run; later phases rank higher.
fn phase_rank(phase: TestPhase) -> u8 {
    match phase {
        TestPhase::Idle => 0,
        TestPhase::Ping => 1,
        TestPhase::Download => 2,
        TestPhase::Upload => 3,
        TestPhase::PacketLoss => 4,
        TestPhase::Bufferbloat => 5,
        TestPhase::Complete => 6,
    }
}

fn create_phase_text(phase: TestPhase) -> Line<'static> {
    let mut spans = Vec::new();

    for (i, (p, label)) in PHASES.iter().enumerate() {
        let style = if phase == *p {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if phase_rank(phase) > phase_rank(*p) {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };

        spans.push(Span::styled(*label, style));

        if i < PHASES.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

fn speed_palette(phase: TestPhase) -> (&'static str, Color, Color) {
    match phase {
        TestPhase::Upload => ("Upload", INFO, INFO_DIM),
        _ => ("Download", SUCCESS, SUCCESS_DIM),
    }
}

// Panels
fn draw_speed_panel(frame: &mut Frame, area: Rect, app: &App, phase: TestPhase, selected: bool) {
    let (title, color, dim_color) = speed_palette(phase);
    let border_color = if selected { BORDER_ACTIVE } else { BORDER };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(if selected { color } else { TEXT_SECONDARY }),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let (speed, measured) = current_speed(app, phase);
    frame.render_widget(
        Paragraph::new(tagged(format_speed(speed), measured))
            .style(value_style(measured))
            .alignment(Alignment::Center),
        chunks[0],
    );

    draw_progress_bar(frame, chunks[1], phase_ratio(app, phase), color, dim_color);

    let samples = app.speed_samples(phase);
    if !samples.is_empty() {
        draw_sparkline(frame, chunks[2], &samples, color);
    }
}

fn draw_ping_panel(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let border_color = if selected { BORDER_ACTIVE } else { BORDER };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(
            " Latency ",
            Style::default().fg(if selected { WARN } else { TEXT_SECONDARY }),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let samples = app.ping_samples();
    let (ping, measured) = current_ping(app, &samples);
    let value = if ping > 0.0 {
        tagged(format!("{:.0} ms", ping), measured)
    } else {
        "—".to_string()
    };

    frame.render_widget(
        Paragraph::new(value)
            .style(value_style(measured))
            .alignment(Alignment::Center),
        chunks[0],
    );

    let jitter = match &app.result {
        Some(result) => tagged(
            format!("jitter {:.1} ms", result.jitter.get()),
            result.jitter.is_measured(),
        ),
        None => "jitter —".to_string(),
    };
    frame.render_widget(
        Paragraph::new(jitter)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[1],
    );

    if !samples.is_empty() {
        draw_sparkline(frame, chunks[2], &samples, WARN);
    }
}

/// Packet loss, bufferbloat and location, once the run has finished.
fn draw_quality_line(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(result) = &app.result else {
        frame.render_widget(
            Paragraph::new("packet loss —  ·  bufferbloat —  ·  location —")
                .style(Style::default().fg(TEXT_MUTED))
                .alignment(Alignment::Center),
            inner,
        );
        return;
    };

    let separator = || Span::styled("  ·  ", Style::default().fg(TEXT_MUTED));
    let mut spans = Vec::new();

    match &result.packet_loss {
        Some(loss) => {
            let v = loss.value();
            spans.push(Span::styled(
                tagged(loss_text(v), loss.is_measured()),
                value_style(loss.is_measured()),
            ));
        }
        None => spans.push(Span::styled("loss —", Style::default().fg(TEXT_MUTED))),
    }
    spans.push(separator());

    match &result.bufferbloat {
        Some(bloat) => {
            let v = bloat.value();
            let color = match v.rating {
                BufferbloatRating::A | BufferbloatRating::B => SUCCESS,
                BufferbloatRating::C => WARN,
                _ => ALERT,
            };
            spans.push(Span::styled(
                tagged(
                    format!("bufferbloat {} (+{:.0} ms)", v.rating, v.latency_increase),
                    bloat.is_measured(),
                ),
                Style::default().fg(if bloat.is_measured() { color } else { TEXT_SECONDARY }),
            ));
        }
        None => spans.push(Span::styled("bufferbloat off", Style::default().fg(TEXT_MUTED))),
    }
    spans.push(separator());

    let location = result.user_location.value();
    spans.push(Span::styled(
        tagged(
            format!("{}, {} via {}", location.city, location.country, result.server_location),
            result.user_location.is_measured(),
        ),
        Style::default().fg(TEXT_SECONDARY),
    ));
    spans.push(separator());
    spans.push(Span::styled(
        format!("{:.1} s", result.test_duration),
        Style::default().fg(TEXT_MUTED),
    ));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(Alignment::Center),
        inner,
    );
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(empty), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_sparkline(frame: &mut Frame, area: Rect, data: &[f64], color: Color) {
    if data.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(1.0);

    let points: Vec<(f64, f64)> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len() as f64]))
        .y_axis(Axis::default().bounds([min_val - range * 0.1, max_val + range * 0.1]));

    frame.render_widget(chart, area);
}

// Expanded views
fn draw_speed_expanded(frame: &mut Frame, area: Rect, app: &App, phase: TestPhase) {
    let (title, color, dim_color) = speed_palette(phase);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_ACTIVE))
        .title(Span::styled(format!(" {} ", title), Style::default().fg(color)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .split(inner);

    let samples = app.speed_samples(phase);
    let (speed, measured) = current_speed(app, phase);
    let (avg, max, min) = get_stats(&samples);
    let stats = Line::from(vec![
        Span::styled(
            tagged(format_speed(speed), measured),
            value_style(measured).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("avg {}", format_speed(avg)), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("max {}", format_speed(max)), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("min {}", format_speed(min)), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(
            format!("{} connections", app.config.parallel_connections),
            Style::default().fg(TEXT_MUTED),
        ),
    ]);
    frame.render_widget(Paragraph::new(stats).alignment(Alignment::Center), chunks[0]);

    draw_progress_bar(frame, chunks[1], phase_ratio(app, phase), color, dim_color);
    draw_detailed_chart(frame, chunks[2], &samples, color, "Mbps");
}

fn draw_ping_expanded(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER_ACTIVE))
        .title(Span::styled(" Latency ", Style::default().fg(WARN)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(4),
    ])
    .split(inner);

    let samples = app.ping_samples();
    let (ping, measured) = current_ping(app, &samples);
    let (avg, max, min) = get_stats(&samples);
    let jitter = match &app.result {
        Some(result) => tagged(format!("{:.1}", result.jitter.get()), result.jitter.is_measured()),
        None => "—".to_string(),
    };

    let stats = Line::from(vec![
        Span::styled(
            tagged(format!("{:.0} ms", ping), measured),
            value_style(measured).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("jitter {} ms", jitter), Style::default().fg(TEXT_SECONDARY)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("avg {:.0}", avg), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("max {:.0}", max), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("min {:.0}", min), Style::default().fg(TEXT_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(stats).alignment(Alignment::Center), chunks[0]);

    draw_detailed_chart(frame, chunks[1], &samples, WARN, "ms");
}

fn draw_detailed_chart(frame: &mut Frame, area: Rect, data: &[f64], color: Color, unit: &str) {
    if data.is_empty() || area.width < 10 || area.height < 3 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(0.1);
    let y_min = (min_val - range * 0.1).max(0.0);
    let y_max = max_val + range * 0.1;

    let points: Vec<(f64, f64)> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let (avg, _, _) = get_stats(data);
    let avg_line: Vec<(f64, f64)> = vec![(0.0, avg), (data.len() as f64, avg)];

    let datasets = vec![
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&points),
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(TEXT_MUTED))
            .data(&avg_line),
    ];

    let y_labels = vec![
        Span::styled(format!("{:.0}", y_min), Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("{:.0} {}", y_max, unit), Style::default().fg(TEXT_MUTED)),
    ];

    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([0.0, data.len() as f64]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([y_min, y_max])
                .labels(y_labels),
        );

    frame.render_widget(chart, area);
}

// Settings
fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(10),
        Constraint::Length(1),
    ])
    .split(area);

    let header_block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    let header_inner = header_block.inner(chunks[0]);
    frame.render_widget(header_block, chunks[0]);

    frame.render_widget(
        Paragraph::new("Settings")
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        header_inner,
    );

    let content_area = Layout::horizontal([
        Constraint::Length(2),
        Constraint::Min(30),
        Constraint::Length(2),
    ])
    .split(chunks[1])[1];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(content_area);
    frame.render_widget(block, content_area);

    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .split(inner);

    draw_setting_row(
        frame,
        rows[0],
        "Phase duration",
        &format!("{} s", app.config.duration_secs),
        app.selected_setting == SettingsField::Duration,
    );

    draw_setting_row(
        frame,
        rows[1],
        "Connections",
        &format!("{}", app.config.parallel_connections),
        app.selected_setting == SettingsField::Connections,
    );

    draw_setting_row(
        frame,
        rows[2],
        "Bufferbloat",
        if app.config.enable_bufferbloat { "on" } else { "off" },
        app.selected_setting == SettingsField::Bufferbloat,
    );

    let help = "↑↓ select · ←→ adjust · space toggle · enter done";
    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[2],
    );
}

fn draw_setting_row(frame: &mut Frame, area: Rect, label: &str, value: &str, selected: bool) {
    let chunks = Layout::horizontal([
        Constraint::Length(18),
        Constraint::Min(10),
    ])
    .split(area);

    let label_style = if selected {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(TEXT_SECONDARY)
    };

    frame.render_widget(
        Paragraph::new(format!(" {}", label)).style(label_style),
        chunks[0],
    );

    let value_text = if selected {
        format!("< {} >", value)
    } else {
        value.to_string()
    };

    let value_style = if selected {
        Style::default().fg(TEXT_PRIMARY)
    } else {
        Style::default().fg(TEXT_MUTED)
    };

    frame.render_widget(Paragraph::new(value_text).style(value_style), chunks[1]);
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.expanded {
        "esc close · q quit"
    } else if app.is_running() {
        "tab select · space expand · esc cancel · q quit"
    } else {
        "enter start · s settings · tab select · space expand · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

// Helpers

fn loss_text(loss: &PacketLossResult) -> String {
    if loss.has_counts() {
        format!("loss {:.1}% ({}/{})", loss.percentage, loss.received, loss.sent)
    } else {
        format!("loss {:.1}%", loss.percentage)
    }
}

/// Estimated values are prefixed with `~`.
fn tagged(text: String, measured: bool) -> String {
    if measured {
        text
    } else {
        format!("~{}", text)
    }
}

fn value_style(measured: bool) -> Style {
    let color = if measured { TEXT_PRIMARY } else { TEXT_SECONDARY };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn final_speed(app: &App, phase: TestPhase) -> Option<&Sample<f64>> {
    let result = app.result.as_ref()?;
    match phase {
        TestPhase::Upload => Some(&result.upload_speed),
        _ => Some(&result.download_speed),
    }
}

fn current_speed(app: &App, phase: TestPhase) -> (f64, bool) {
    if let Some(sample) = final_speed(app, phase) {
        return (sample.get(), sample.is_measured());
    }
    if app.phase == phase {
        return (app.current_speed, true);
    }
    (app.speed_samples(phase).last().copied().unwrap_or(0.0), true)
}

fn current_ping(app: &App, samples: &[f64]) -> (f64, bool) {
    match &app.result {
        Some(result) => (result.ping.get(), result.ping.is_measured()),
        None => (samples.last().copied().unwrap_or(0.0), true),
    }
}

fn phase_ratio(app: &App, phase: TestPhase) -> f64 {
    if app.phase == phase {
        app.phase_progress / 100.0
    } else if phase_rank(app.phase) > phase_rank(phase) {
        1.0
    } else {
        0.0
    }
}

fn get_data_range(data: &[f64]) -> (f64, f64) {
    let min = data.iter().cloned().fold(f64::MAX, f64::min);
    let max = data.iter().cloned().fold(f64::MIN, f64::max);
    (if min == f64::MAX { 0.0 } else { min }, if max == f64::MIN { 0.0 } else { max })
}

fn get_stats(data: &[f64]) -> (f64, f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let avg = data.iter().sum::<f64>() / data.len() as f64;
    let max = data.iter().cloned().fold(f64::MIN, f64::max);
    let min = data.iter().cloned().fold(f64::MAX, f64::min);
    (avg, max, if min == f64::MAX { 0.0 } else { min })
}

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.1} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_counts_hidden_for_fallback() {
        assert_eq!(loss_text(&PacketLossResult::from_counts(50, 45)), "loss 10.0% (45/50)");
        assert_eq!(loss_text(&PacketLossResult::fallback()), "loss 5.0%");
    }
}
