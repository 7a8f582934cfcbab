//! Arpeggiator - a fixed-period voice stepper on its own clock.
//!
//! The main control loop runs at ~20 Hz and stalls on display and storage
//! work; arpeggiation cannot ride on it. `ArpClock` is a dedicated worker
//! thread fired by `recv_timeout` on a command channel, so a step lands
//! every period regardless of what the control loop is doing, and stopping
//! is deterministic: send the stop command, join the thread, then restore
//! the gains.
//!
//! Everything the worker touches is a single atomic cell - the step counter
//! and the per-role gain table - so neither side can observe a half-written
//! update. The worker never waits on the control loop.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::voice::bank::{Role, RoleGains, SYNTH_GAIN};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArpMode {
    /// Step one role at a time on the clock.
    Arp,
    /// All three roles sound together; the clock is stopped.
    Poly,
}

impl ArpMode {
    pub fn label(self) -> &'static str {
        match self {
            ArpMode::Arp => "Arp",
            ArpMode::Poly => "Poly",
        }
    }
}

pub const BPM_MIN: f32 = 40.0;
pub const BPM_MAX: f32 = 200.0;
pub const DEFAULT_BPM: f32 = 120.0;

/// Step period from tempo: 125 ms at 120 BPM.
pub fn step_duration_ms(bpm: f32) -> u64 {
    (15_000.0 / bpm.clamp(BPM_MIN, BPM_MAX)).round() as u64
}

/// Flags the clock worker reads each fire. Written single-assignment by the
/// control loop; a fire that observes the chord inactive or fading does
/// nothing.
#[derive(Debug, Default)]
pub struct ArpShared {
    pub chord_active: AtomicBool,
    pub chord_fading: AtomicBool,
    pub current_step: AtomicU8,
}

enum ClockCmd {
    /// Re-arm with a new period. Phase resets to the new duration.
    Retime(u64),
    Stop,
}

/// The timing source: one worker thread, one command channel.
struct ArpClock {
    tx: Sender<ClockCmd>,
    handle: JoinHandle<()>,
}

impl ArpClock {
    fn start(step_ms: u64, shared: Arc<ArpShared>, gains: Arc<RoleGains>) -> Self {
        let (tx, rx) = bounded::<ClockCmd>(4);
        let handle = std::thread::spawn(move || {
            let mut period = step_ms.max(1);
            // First step lands immediately, matching the audible behavior of
            // arming the arpeggiator.
            fire(&shared, &gains);
            loop {
                match rx.recv_timeout(Duration::from_millis(period)) {
                    Err(RecvTimeoutError::Timeout) => fire(&shared, &gains),
                    Ok(ClockCmd::Retime(ms)) => period = ms.max(1),
                    Ok(ClockCmd::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self { tx, handle }
    }

    fn retime(&self, step_ms: u64) {
        let _ = self.tx.send(ClockCmd::Retime(step_ms));
    }

    /// Halt the worker and wait for it. No step can fire after this returns.
    fn stop(self) {
        let _ = self.tx.send(ClockCmd::Stop);
        let _ = self.handle.join();
    }
}

/// One clock fire: mute all roles, unmute the current step, advance.
fn fire(shared: &ArpShared, gains: &RoleGains) {
    if !shared.chord_active.load(Ordering::Acquire) || shared.chord_fading.load(Ordering::Acquire)
    {
        return;
    }
    let step = shared.current_step.load(Ordering::Acquire) % 3;
    for role in Role::ALL {
        gains.set(role, 0.0);
    }
    gains.set(Role::from_index(step as usize), SYNTH_GAIN);
    shared.current_step.store((step + 1) % 3, Ordering::Release);
}

pub struct Arpeggiator {
    mode: ArpMode,
    bpm: f32,
    clock: Option<ArpClock>,
    shared: Arc<ArpShared>,
    gains: Arc<RoleGains>,
}

impl Arpeggiator {
    pub fn new(gains: Arc<RoleGains>) -> Self {
        Self {
            mode: ArpMode::Poly,
            bpm: DEFAULT_BPM,
            clock: None,
            shared: Arc::new(ArpShared::default()),
            gains,
        }
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(BPM_MIN, BPM_MAX);
        if let Some(clock) = &self.clock {
            clock.retime(step_duration_ms(self.bpm));
        }
    }

    /// Switch stepping on or off. Leaving Arp mode stops the clock and
    /// restores full unmuted output immediately.
    pub fn set_mode(&mut self, mode: ArpMode) {
        self.mode = mode;
        if mode == ArpMode::Poly {
            self.stop_clock();
        }
    }

    /// Reconcile the clock with the chord state, once per control cycle.
    /// The clock never runs while the chord is inactive or mid-fade.
    pub fn sync(&mut self, chord_active: bool, chord_fading: bool) {
        self.shared
            .chord_active
            .store(chord_active, Ordering::Release);
        self.shared
            .chord_fading
            .store(chord_fading, Ordering::Release);

        let should_run = self.mode == ArpMode::Arp && chord_active && !chord_fading;
        match (should_run, self.clock.is_some()) {
            (true, false) => {
                self.shared.current_step.store(0, Ordering::Release);
                self.clock = Some(ArpClock::start(
                    step_duration_ms(self.bpm),
                    Arc::clone(&self.shared),
                    Arc::clone(&self.gains),
                ));
            }
            (false, true) => self.stop_clock(),
            _ => {}
        }
    }

    /// Rewind the cycle to the root. Called when a chord starts.
    pub fn reset_step(&mut self) {
        self.shared.current_step.store(0, Ordering::Release);
    }

    /// Halt the clock (if running) and restore all roles. Deterministic:
    /// the worker has exited before the gains are touched.
    pub fn stop(&mut self) {
        self.stop_clock();
    }

    pub fn mode(&self) -> ArpMode {
        self.mode
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_some()
    }

    pub fn current_step(&self) -> u8 {
        self.shared.current_step.load(Ordering::Acquire)
    }

    fn stop_clock(&mut self) {
        if let Some(clock) = self.clock.take() {
            clock.stop();
        }
        self.gains.set_all(SYNTH_GAIN);
    }
}

impl Drop for Arpeggiator {
    fn drop(&mut self) {
        self.stop_clock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_maps_to_step_period() {
        assert_eq!(step_duration_ms(120.0), 125);
        assert_eq!(step_duration_ms(40.0), 375);
        assert_eq!(step_duration_ms(200.0), 75);
        // Out-of-range tempos clamp before the division.
        assert_eq!(step_duration_ms(500.0), step_duration_ms(200.0));
        assert_eq!(step_duration_ms(10.0), step_duration_ms(40.0));
    }

    #[test]
    fn fire_cycles_through_all_three_roles() {
        let shared = ArpShared::default();
        shared.chord_active.store(true, Ordering::Release);
        let gains = RoleGains::default();

        let mut seen = Vec::new();
        for _ in 0..3 {
            fire(&shared, &gains);
            let unmuted = gains.unmuted();
            assert_eq!(unmuted.len(), 1, "exactly one role sounds per step");
            seen.push(unmuted[0]);
        }
        assert_eq!(seen, vec![Role::Root, Role::Third, Role::Fifth]);

        // Fourth fire wraps back to the root.
        fire(&shared, &gains);
        assert_eq!(gains.unmuted(), vec![Role::Root]);
    }

    #[test]
    fn fire_is_inert_while_inactive_or_fading() {
        let shared = ArpShared::default();
        let gains = RoleGains::default();
        fire(&shared, &gains);
        assert_eq!(gains.unmuted().len(), 3, "inactive chord: nothing muted");

        shared.chord_active.store(true, Ordering::Release);
        shared.chord_fading.store(true, Ordering::Release);
        fire(&shared, &gains);
        assert_eq!(gains.unmuted().len(), 3, "fading chord: nothing muted");
        assert_eq!(shared.current_step.load(Ordering::Acquire), 0);
    }

    #[test]
    fn sync_starts_and_stops_the_clock() {
        let gains = Arc::new(RoleGains::default());
        let mut arp = Arpeggiator::new(Arc::clone(&gains));
        arp.set_mode(ArpMode::Arp);
        arp.set_tempo(200.0); // 75 ms steps keep the test fast

        arp.sync(true, false);
        assert!(arp.is_running());

        std::thread::sleep(Duration::from_millis(250));
        assert!(
            arp.current_step() != 0 || gains.unmuted().len() == 1,
            "the clock should have stepped at least once"
        );

        // Fade starts: orchestrator stops the clock, output is restored.
        arp.sync(true, true);
        assert!(!arp.is_running());
        assert_eq!(gains.unmuted().len(), 3);
    }

    #[test]
    fn poly_switch_restores_output_immediately() {
        let gains = Arc::new(RoleGains::default());
        let mut arp = Arpeggiator::new(Arc::clone(&gains));
        arp.set_mode(ArpMode::Arp);
        arp.set_tempo(200.0);
        arp.sync(true, false);
        std::thread::sleep(Duration::from_millis(100));

        arp.set_mode(ArpMode::Poly);
        assert!(!arp.is_running());
        assert_eq!(gains.unmuted().len(), 3);

        // Poly mode never restarts the clock.
        arp.sync(true, false);
        assert!(!arp.is_running());
    }

    #[test]
    fn stop_halts_before_restoring_gains() {
        let gains = Arc::new(RoleGains::default());
        let mut arp = Arpeggiator::new(Arc::clone(&gains));
        arp.set_mode(ArpMode::Arp);
        arp.set_tempo(200.0);
        arp.sync(true, false);

        arp.stop();
        assert!(!arp.is_running());
        // With the worker joined, no stray fire can undo the restore.
        let snapshot = gains.unmuted();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(gains.unmuted(), snapshot);
        assert_eq!(snapshot.len(), 3);
    }
}
