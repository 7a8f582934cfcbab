//! Simulator wiring: keyboard -> raw inputs -> engine -> TUI.
//!
//! The control loop runs at the engine's 20 Hz cadence. Keyboard events are
//! drained between ticks; footswitch keys track press/release state so
//! holding `a` really holds FS1 down (requires a terminal with keyboard
//! enhancement support - without it, keys latch on press).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::eyre::{eyre, Result as EyreResult};
use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use tricord::arp::ArpMode;
use tricord::engine::{PerformanceEngine, SettingChange};
use tricord::harmony::HarmonyMode;
use tricord::input::RawInputs;
use tricord::pitch::{Instrument, PitchDetector};
use tricord::settings::{JsonSettingsStore, SettingsSnapshot};
use tricord::voice::bank::{OutputRouting, RoleGains};
use tricord::voice::controller::StopMode;
use tricord::voice::timbre::Timbre;
use tricord::CONTROL_TICK_MS;

use crate::audio;
use crate::detector::FftPitchDetector;
use crate::ui;

/// Keyboard stand-ins for the pedal's physical controls.
struct Controls {
    fs1: bool,
    fs2: bool,
    enc_button: bool,
    pot: f32,
    quit: bool,
    pending: Vec<SettingChange>,
}

impl Controls {
    fn new() -> Self {
        Self {
            fs1: false,
            fs2: false,
            enc_button: false,
            pot: 0.5,
            quit: false,
            pending: Vec::new(),
        }
    }

    fn raw_inputs(&self) -> RawInputs {
        RawInputs {
            fs1: self.fs1,
            fs2: self.fs2,
            enc_button: self.enc_button,
            encoder_delta: 0,
            pot: self.pot,
        }
    }

    fn handle_key(&mut self, code: KeyCode, kind: KeyEventKind, settings: &SettingsSnapshot) {
        let down = matches!(kind, KeyEventKind::Press | KeyEventKind::Repeat);
        match code {
            // Held controls.
            KeyCode::Char('a') => self.fs1 = down,
            KeyCode::Char('s') => self.fs2 = down,
            KeyCode::Char('e') => self.enc_button = down,
            _ if kind == KeyEventKind::Press => self.handle_press(code, settings),
            _ => {}
        }
    }

    fn handle_press(&mut self, code: KeyCode, settings: &SettingsSnapshot) {
        match code {
            KeyCode::Char('[') => self.pot = (self.pot - 0.05).max(0.0),
            KeyCode::Char(']') => self.pot = (self.pot + 0.05).min(1.0),
            KeyCode::Up => self
                .pending
                .push(SettingChange::Key((settings.key + 1) % 12)),
            KeyCode::Down => self
                .pending
                .push(SettingChange::Key((settings.key + 11) % 12)),
            KeyCode::Char('1') => self.pending.push(SettingChange::Timbre(Timbre::Sine)),
            KeyCode::Char('2') => self.pending.push(SettingChange::Timbre(Timbre::Organ)),
            KeyCode::Char('3') => self.pending.push(SettingChange::Timbre(Timbre::Rhodes)),
            KeyCode::Char('4') => self.pending.push(SettingChange::Timbre(Timbre::Strings)),
            KeyCode::Char('5') => self.pending.push(SettingChange::Timbre(Timbre::Sample)),
            KeyCode::Char('m') => self
                .pending
                .push(SettingChange::Mode(next_mode(settings.mode))),
            KeyCode::Char('o') => self
                .pending
                .push(SettingChange::OctaveShift(next_octave(settings.octave_shift))),
            KeyCode::Char('p') => self.pending.push(SettingChange::ArpMode(
                match settings.arp_mode {
                    ArpMode::Arp => ArpMode::Poly,
                    ArpMode::Poly => ArpMode::Arp,
                },
            )),
            KeyCode::Char('r') => self.pending.push(SettingChange::Routing(
                match settings.routing {
                    OutputRouting::MixWithDry => OutputRouting::SynthOnly,
                    OutputRouting::SynthOnly => OutputRouting::MixWithDry,
                },
            )),
            KeyCode::Char('f') => self.pending.push(SettingChange::StopMode(
                match settings.stop_mode {
                    StopMode::Fade => StopMode::Immediate,
                    StopMode::Immediate => StopMode::Fade,
                },
            )),
            KeyCode::Char('i') => self.pending.push(SettingChange::Instrument(
                match settings.instrument {
                    Instrument::Guitar => Instrument::Bass,
                    Instrument::Bass => Instrument::Guitar,
                },
            )),
            KeyCode::Char('u') => self
                .pending
                .push(SettingChange::Muting(!settings.muting)),
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            _ => {}
        }
    }
}

fn next_mode(mode: HarmonyMode) -> HarmonyMode {
    match mode {
        HarmonyMode::Major => HarmonyMode::Minor,
        HarmonyMode::Minor => HarmonyMode::FixedMajor,
        HarmonyMode::FixedMajor => HarmonyMode::FixedMinor,
        HarmonyMode::FixedMinor => HarmonyMode::Major,
    }
}

fn next_octave(shift: i8) -> i8 {
    if shift >= 2 {
        -1
    } else {
        shift + 1
    }
}

pub fn run() -> EyreResult<()> {
    terminal::enable_raw_mode()?;
    // Real press/release detection where the terminal supports it.
    let _ = crossterm::execute!(
        io::stdout(),
        PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
    );
    let _guard = RawModeGuard;

    let gains = Arc::new(RoleGains::default());
    let mut audio = audio::start(Arc::clone(&gains))?;
    let bank = audio
        .bank
        .take()
        .ok_or_else(|| eyre!("audio bank unavailable"))?;
    let sampler = bank.sample_player();

    let project_dir: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let store = JsonSettingsStore::new(project_dir.join("tricord-settings.json"));

    let mut engine = PerformanceEngine::with_store(bank, Arc::clone(&gains), Box::new(store));
    engine.set_sampler(Box::new(sampler));
    engine.set_sample_path(find_first_wav(&project_dir));

    let mut detector = audio
        .mic
        .take()
        .map(|mic| FftPitchDetector::new(mic, audio.sample_rate));

    let backend = CrosstermBackend::new(io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let mut controls = Controls::new();
    let mut status: Option<String> = None;
    let started = Instant::now();
    let tick = Duration::from_millis(CONTROL_TICK_MS);

    loop {
        // Drain keyboard events for the rest of this tick; the poll timeout
        // doubles as the control-loop sleep.
        let tick_started = Instant::now();
        while event::poll(tick.saturating_sub(tick_started.elapsed()))? {
            if let Event::Key(key) = event::read()? {
                let settings = engine.snapshot().settings;
                controls.handle_key(key.code, key.kind, &settings);
            }
        }

        if controls.quit {
            engine.shutdown();
            return Ok(());
        }

        let now_ms = started.elapsed().as_millis() as u64;
        for change in controls.pending.drain(..) {
            if let Err(e) = engine.apply_setting(change, now_ms) {
                status = Some(e.to_string());
            }
        }

        let pitch = detector.as_mut().and_then(|d| d.poll());
        engine.cycle(&controls.raw_inputs(), pitch, now_ms);
        if let Some(e) = engine.take_sample_error() {
            status = Some(e.to_string());
        }

        let snapshot = engine.snapshot();
        term.draw(|frame| ui::render(frame, frame.area(), &snapshot, status.as_deref()))?;
    }
}

/// First WAV in the project directory feeds the Sample timbre.
fn find_first_wav(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut wavs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    wavs.sort();
    wavs.into_iter().next()
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(io::stdout(), PopKeyboardEnhancementFlags);
        let _ = terminal::disable_raw_mode();
    }
}
