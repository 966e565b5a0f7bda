use crate::system::System;

/// Policy governing how frame time feeds a system's accumulator and how
/// many invocations a frame produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickMode {
    /// Invoke once per frame with the raw frame `dt`. No accumulator.
    #[default]
    Loose,
    /// Accumulate; once the accumulator reaches the delay, invoke once
    /// with the whole accumulated time and reset to zero.
    SemiLoose,
    /// Accumulate; invoke repeatedly with steps capped at the delay until
    /// less than one delay remains. The remainder carries forward.
    SemiFixed,
    /// Accumulate; invoke repeatedly with exactly the delay until less
    /// than one delay remains. The remainder carries forward, so
    /// simulation time never outruns real time.
    Fixed,
}

/// A system wrapped with its tick policy and enabled flag.
///
/// Slots are claimed exclusively per frame through the dispatcher's bucket
/// cursor, so dispatch always has `&mut` access.
pub(crate) struct TickedSystem {
    pub system: Box<dyn System>,
    pub mode: TickMode,
    pub delay: f32,
    pub accumulator: f32,
    pub enabled: bool,
}

impl TickedSystem {
    pub fn new(system: Box<dyn System>, mode: TickMode, delay: f32, enabled: bool) -> Self {
        Self {
            system,
            mode,
            delay,
            accumulator: 0.0,
            enabled,
        }
    }

    /// Feeds one frame's `dt` through the tick policy.
    ///
    /// Disabled systems neither advance their accumulator nor run. After
    /// dispatch the accumulator of a Fixed or SemiFixed system is always
    /// below its delay.
    pub fn dispatch(&mut self, dt: f32, worker_id: usize) {
        if !self.enabled {
            return;
        }
        match self.mode {
            TickMode::Loose => self.system.run(dt, worker_id),
            TickMode::SemiLoose => {
                self.accumulator += dt;
                if self.accumulator >= self.delay {
                    let elapsed = self.accumulator;
                    self.accumulator = 0.0;
                    self.system.run(elapsed, worker_id);
                }
            }
            // A zero delay would never drain the accumulator; degrade to
            // a single per-frame invocation.
            TickMode::SemiFixed | TickMode::Fixed if self.delay <= 0.0 => {
                self.system.run(dt, worker_id)
            }
            TickMode::SemiFixed => {
                self.accumulator += dt;
                while self.accumulator >= self.delay {
                    let step = self.delay.min(self.accumulator);
                    self.accumulator -= step;
                    self.system.run(step, worker_id);
                }
            }
            TickMode::Fixed => {
                self.accumulator += dt;
                while self.accumulator >= self.delay {
                    self.accumulator -= self.delay;
                    self.system.run(self.delay, worker_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::BuildContext;

    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<f32>>>);

    impl System for Recorder {
        fn build(_ctx: &BuildContext<'_>) -> Self {
            unreachable!("constructed directly in tests")
        }

        fn run(&mut self, dt: f32, _worker_id: usize) {
            self.0.lock().unwrap().push(dt);
        }
    }

    fn ticked(mode: TickMode, delay: f32) -> (TickedSystem, Arc<Mutex<Vec<f32>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let system = TickedSystem::new(Box::new(Recorder(log.clone())), mode, delay, true);
        (system, log)
    }

    fn invocations(log: &Arc<Mutex<Vec<f32>>>) -> Vec<f32> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn loose_passes_frame_dt() {
        let (mut t, log) = ticked(TickMode::Loose, 1.0);
        t.dispatch(0.016, 0);
        t.dispatch(0.5, 0);
        assert_eq!(invocations(&log), vec![0.016, 0.5]);
        assert_eq!(t.accumulator, 0.0);
    }

    #[test]
    fn semi_loose_accumulates_then_fires_once() {
        let (mut t, log) = ticked(TickMode::SemiLoose, 0.1);
        t.dispatch(0.04, 0);
        t.dispatch(0.04, 0);
        assert!(invocations(&log).is_empty());

        t.dispatch(0.04, 0);
        let fired = invocations(&log);
        assert_eq!(fired.len(), 1);
        assert!((fired[0] - 0.12).abs() < 1e-6);
        assert_eq!(t.accumulator, 0.0);
    }

    #[test]
    fn fixed_fires_in_exact_steps_with_residue() {
        let (mut t, log) = ticked(TickMode::Fixed, 0.01);
        t.dispatch(0.025, 0);
        assert_eq!(invocations(&log), vec![0.01, 0.01]);
        assert!((t.accumulator - 0.005).abs() < 1e-6);

        // The residue carries into the next frame
        t.dispatch(0.005, 0);
        assert_eq!(invocations(&log).len(), 3);
        assert!(t.accumulator.abs() < 1e-6);
    }

    #[test]
    fn fixed_never_outruns_real_time() {
        let (mut t, log) = ticked(TickMode::Fixed, 0.016);
        let mut total_dt = 0.0;
        for _ in 0..100 {
            t.dispatch(0.02, 0);
            total_dt += 0.02;
        }
        let simulated: f32 = invocations(&log).iter().sum();
        assert!(simulated <= total_dt + 1e-4);
    }

    #[test]
    fn semi_fixed_steps_capped_at_delay() {
        let (mut t, log) = ticked(TickMode::SemiFixed, 0.01);
        t.dispatch(0.025, 0);
        let fired = invocations(&log);
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|&step| step <= 0.01 + 1e-6));
        assert!(t.accumulator < 0.01);
    }

    #[test]
    fn zero_delay_fixed_degrades_to_loose() {
        let (mut t, log) = ticked(TickMode::Fixed, 0.0);
        t.dispatch(0.02, 0);
        t.dispatch(0.02, 0);
        assert_eq!(invocations(&log), vec![0.02, 0.02]);
    }

    #[test]
    fn disabled_system_does_not_accumulate() {
        let (mut t, log) = ticked(TickMode::Fixed, 0.01);
        t.enabled = false;
        t.dispatch(1.0, 0);
        assert!(invocations(&log).is_empty());
        assert_eq!(t.accumulator, 0.0);

        // Re-enabling starts from a clean accumulator
        t.enabled = true;
        t.dispatch(0.01, 0);
        assert_eq!(invocations(&log), vec![0.01]);
    }
}
