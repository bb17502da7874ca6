use std::thread;
use std::time::Duration;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Work,
    Break,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Durations {
    pub work_secs: u32,
    pub break_secs: u32,
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            work_secs: 25 * 60,
            break_secs: 5 * 60,
        }
    }
}

impl Durations {
    fn for_phase(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Work => self.work_secs,
            Phase::Break => self.break_secs,
        }
    }
}

/// Countdown state machine alternating work and break phases. Time only
/// advances through `tick`, delivered by an external once-per-second
/// source; nothing here touches the wall clock.
#[derive(Debug, Clone)]
pub struct FocusTimer {
    phase: Phase,
    seconds_remaining: u32,
    running: bool,
    durations: Durations,
    bound_task: Option<Uuid>,
}

impl FocusTimer {
    pub fn new(durations: Durations) -> Self {
        Self {
            phase: Phase::Work,
            seconds_remaining: durations.work_secs,
            running: false,
            durations,
            bound_task: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn durations(&self) -> Durations {
        self.durations
    }

    pub fn bound_task(&self) -> Option<Uuid> {
        self.bound_task
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// One second elapses. Returns the new phase when this tick crossed
    /// zero: the flip and the reload to the new phase's configured duration
    /// happen within the same tick, not on the next one.
    pub fn tick(&mut self) -> Option<Phase> {
        if !self.running {
            return None;
        }

        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining > 0 {
            return None;
        }

        self.phase = match self.phase {
            Phase::Work => Phase::Break,
            Phase::Break => Phase::Work,
        };
        self.seconds_remaining = self.durations.for_phase(self.phase);
        Some(self.phase)
    }

    /// Back to a paused work phase at full duration. Binding and configured
    /// durations are untouched.
    pub fn reset(&mut self) {
        self.phase = Phase::Work;
        self.seconds_remaining = self.durations.work_secs;
        self.running = false;
    }

    /// New durations take effect at the next phase change; the phase in
    /// progress keeps its remaining seconds.
    pub fn configure(&mut self, durations: Durations) {
        self.durations = durations;
    }

    pub fn bind(&mut self, task: Option<Uuid>) {
        self.bound_task = task;
    }
}

/// `MM:SS`, zero-padded; minutes are not clamped to an hour.
pub fn format_clock(total_secs: u32) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Delivers the periodic ticks that drive a focus session. The production
/// source sleeps; tests script their own.
pub trait Ticker {
    /// Blocks until the next tick is due. `false` stops the session.
    fn next_tick(&mut self) -> bool;
}

#[derive(Debug, Clone)]
pub struct SystemTicker {
    interval: Duration,
}

impl SystemTicker {
    pub fn one_second() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl Ticker for SystemTicker {
    fn next_tick(&mut self) -> bool {
        thread::sleep(self.interval);
        true
    }
}

/// Starts the timer and feeds it ticks until the ticker runs dry or the
/// callback asks to stop. The callback sees the timer after each tick,
/// along with the phase entered when the tick crossed zero.
pub fn run_session(
    timer: &mut FocusTimer,
    ticker: &mut dyn Ticker,
    on_tick: &mut dyn FnMut(&FocusTimer, Option<Phase>) -> bool,
) {
    timer.start();
    while ticker.next_tick() {
        let crossed = timer.tick();
        if !on_tick(timer, crossed) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Durations, FocusTimer, Phase, Ticker, format_clock, run_session};

    fn timer(work_secs: u32, break_secs: u32) -> FocusTimer {
        FocusTimer::new(Durations {
            work_secs,
            break_secs,
        })
    }

    struct ScriptedTicker {
        remaining: usize,
    }

    impl Ticker for ScriptedTicker {
        fn next_tick(&mut self) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            true
        }
    }

    #[test]
    fn initial_state_is_paused_work() {
        let t = timer(1500, 300);
        assert_eq!(t.phase(), Phase::Work);
        assert_eq!(t.seconds_remaining(), 1500);
        assert!(!t.is_running());
    }

    #[test]
    fn ticks_do_nothing_while_paused() {
        let mut t = timer(10, 3);
        assert_eq!(t.tick(), None);
        assert_eq!(t.seconds_remaining(), 10);
    }

    #[test]
    fn zero_crossing_flips_phase_within_the_same_tick() {
        let mut t = timer(1, 300);
        t.start();

        let crossed = t.tick();
        assert_eq!(crossed, Some(Phase::Break));
        assert_eq!(t.phase(), Phase::Break);
        assert_eq!(t.seconds_remaining(), 300);
        assert!(t.is_running(), "the flip does not pause the timer");
    }

    #[test]
    fn phases_alternate_across_a_full_cycle() {
        let mut t = timer(2, 1);
        t.start();

        assert_eq!(t.tick(), None);
        assert_eq!(t.tick(), Some(Phase::Break));
        assert_eq!(t.tick(), Some(Phase::Work));
        assert_eq!(t.seconds_remaining(), 2);
    }

    #[test]
    fn reset_restores_work_phase_but_keeps_binding() {
        let id = Uuid::new_v4();
        let mut t = timer(10, 3);
        t.bind(Some(id));
        t.start();
        t.tick();
        t.tick();

        t.reset();
        assert_eq!(t.phase(), Phase::Work);
        assert_eq!(t.seconds_remaining(), 10);
        assert!(!t.is_running());
        assert_eq!(t.bound_task(), Some(id));
    }

    #[test]
    fn configure_is_not_retroactive() {
        let mut t = timer(10, 3);
        t.start();
        t.tick();

        t.configure(Durations {
            work_secs: 100,
            break_secs: 7,
        });
        assert_eq!(t.seconds_remaining(), 9, "in-progress phase unaffected");

        for _ in 0..9 {
            t.tick();
        }
        assert_eq!(t.phase(), Phase::Break);
        assert_eq!(t.seconds_remaining(), 7, "next phase uses new durations");
    }

    #[test]
    fn clock_renders_unbounded_minutes() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(60), "01:00");
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(4500), "75:00");
    }

    #[test]
    fn session_loop_drives_ticks_and_honors_stop() {
        let mut t = timer(3, 2);
        let mut ticker = ScriptedTicker { remaining: 100 };
        let mut seen = Vec::new();

        run_session(&mut t, &mut ticker, &mut |timer, crossed| {
            seen.push((timer.seconds_remaining(), crossed));
            crossed != Some(Phase::Break)
        });

        assert_eq!(
            seen,
            vec![(2, None), (1, None), (2, Some(Phase::Break))],
            "loop stops on the callback's signal"
        );
    }

    #[test]
    fn session_loop_ends_when_the_ticker_runs_dry() {
        let mut t = timer(100, 10);
        let mut ticker = ScriptedTicker { remaining: 5 };
        let mut ticks = 0;

        run_session(&mut t, &mut ticker, &mut |_, _| {
            ticks += 1;
            true
        });

        assert_eq!(ticks, 5);
        assert_eq!(t.seconds_remaining(), 95);
    }
}
