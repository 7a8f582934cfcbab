//! Status display for the simulator.
//!
//! Renders the engine snapshot: detected note, chord phase, performance
//! mode, tempo, and the persisted settings row. Pure read-side - nothing
//! here feeds back into the engine.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use tricord::engine::EngineSnapshot;
use tricord::harmony::NOTE_NAMES;
use tricord::input::PerformanceMode;
use tricord::voice::controller::ChordPhase;

pub fn render(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot, status: Option<&str>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // note header
            Constraint::Min(5),    // chord / mode / tempo
            Constraint::Length(3), // settings row
            Constraint::Length(1), // status
            Constraint::Length(1), // help
        ])
        .split(area);

    render_note(frame, chunks[0], snapshot);
    render_state(frame, chunks[1], snapshot);
    render_settings(frame, chunks[2], snapshot);

    let status_line = Paragraph::new(status.unwrap_or(""))
        .style(Style::default().fg(Color::Red));
    frame.render_widget(status_line, chunks[3]);

    let help = Paragraph::new(
        " a listen   s stop/tap   a+s volume mode   [ ] pot   1-5 timbre   m mode   o oct   p arp   q quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[4]);
}

fn render_note(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let block = Block::default().title(" tricord ").borders(Borders::ALL);

    let note = snapshot.note.unwrap_or("---");
    let hz = snapshot
        .stable_hz
        .map(|hz| format!("{hz:7.1} Hz"))
        .unwrap_or_else(|| "   --.- Hz".to_string());
    let listening = if snapshot.listening {
        Span::styled("  listening", Style::default().fg(Color::Green))
    } else {
        Span::styled("  idle", Style::default().fg(Color::DarkGray))
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {note:>3} "),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(hz),
        listening,
    ]);
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_state(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let block = Block::default().title(" performance ").borders(Borders::ALL);

    let phase = match snapshot.chord_phase {
        ChordPhase::Silent => Span::styled("Silent", Style::default().fg(Color::DarkGray)),
        ChordPhase::Sustaining => Span::styled("Sustaining", Style::default().fg(Color::Green)),
        ChordPhase::Fading => Span::styled("Fading", Style::default().fg(Color::Yellow)),
        ChordPhase::Decaying => Span::styled("Decaying", Style::default().fg(Color::Yellow)),
    };

    let mode = match snapshot.performance_mode {
        PerformanceMode::Normal => "Normal".to_string(),
        PerformanceMode::FootswitchVolume { target } => {
            format!("FS Volume ({:.0}%)", target * 100.0)
        }
        PerformanceMode::TapTempo { .. } => "Tap Tempo".to_string(),
    };

    let volume_source = if snapshot.volume_source_is_footswitch {
        "fs"
    } else {
        "pot"
    };
    let bar_len = (snapshot.volume.clamp(0.0, 1.0) * 20.0).round() as usize;
    let volume_bar: String = "#".repeat(bar_len);

    let arp = if snapshot.arp_running {
        let role = ["root", "third", "fifth"][snapshot.arp_step as usize % 3];
        format!("stepping ({role})")
    } else {
        "off".to_string()
    };

    let lines = vec![
        Line::from(vec![
            Span::raw(" chord  "),
            phase,
            Span::raw(format!("   tonic {:6.1} Hz", snapshot.chord_tonic)),
        ]),
        Line::from(vec![
            Span::raw(" mode   "),
            Span::styled(mode, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(format!(
            " volume {volume_bar:<20} {:3.0}% ({volume_source})",
            snapshot.volume * 100.0
        )),
        Line::from(format!(
            " tempo  {:5.1} BPM   arp {arp}",
            snapshot.tempo_bpm
        )),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_settings(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let s = &snapshot.settings;
    let block = Block::default().title(" settings ").borders(Borders::ALL);
    let line = Line::from(format!(
        " key {} {}  oct {:+}  timbre {}  arp {}  stop {}  out {}  inst {}  mute {}",
        NOTE_NAMES[s.key as usize % 12],
        s.mode.label(),
        s.octave_shift,
        s.timbre.label(),
        s.arp_mode.label(),
        s.stop_mode.label(),
        s.routing.label(),
        s.instrument.label(),
        if s.muting { "on" } else { "off" },
    ));
    frame.render_widget(Paragraph::new(line).block(block), area);
}
