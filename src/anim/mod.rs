//! Cooperative animation runtime.
//!
//! Animations are plain `async` blocks. Each interpolation step awaits the next
//! frame, so a task advances exactly one step per [`Scheduler::tick`]. All
//! tasks run on the calling thread, one poll at a time, in the order the pool
//! resumes them.
//!
//! - [`clock`]: the deterministic frame clock and `next_frame`
//! - [`ease`]: easing curves
//! - [`tween`]: per-frame interpolation of values and properties
//! - [`compose`]: `all`, `chain`, `sequence`, `repeat`, barriers

pub mod clock;
pub mod compose;
pub mod ease;
pub mod tween;

use std::{cell::Cell, rc::Rc};

use futures::{
    executor::{LocalPool, LocalSpawner},
    task::LocalSpawnExt,
};

pub use clock::{FrameClock, next_frame};
pub use compose::{Barriers, all, chain, repeat, sequence, wait_for};
pub use ease::Ease;
pub use tween::{Lerp, tween, tween_property};

struct LiveGuard(Rc<Cell<usize>>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Clonable handle for starting tasks on a [`Scheduler`].
#[derive(Clone)]
pub struct Spawner {
    inner: LocalSpawner,
    live: Rc<Cell<usize>>,
}

impl Spawner {
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.live.set(self.live.get() + 1);
        let guard = LiveGuard(self.live.clone());
        let task = async move {
            let _guard = guard;
            task.await;
        };
        if let Err(e) = self.inner.spawn_local(task) {
            log::error!("Could not spawn animation task: {}", e);
        }
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn live_tasks(&self) -> usize {
        self.live.get()
    }
}

/// Single-threaded executor driven one frame at a time.
pub struct Scheduler {
    pool: LocalPool,
    spawner: Spawner,
    clock: FrameClock,
    barriers: Barriers,
}

impl Scheduler {
    pub fn new(fps: f32) -> Self {
        let pool = LocalPool::new();
        let spawner = Spawner {
            inner: pool.spawner(),
            live: Rc::new(Cell::new(0)),
        };
        Self {
            pool,
            spawner,
            clock: FrameClock::new(fps),
            barriers: Barriers::new(),
        }
    }

    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.spawner.spawn(task);
    }

    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn barriers(&self) -> &Barriers {
        &self.barriers
    }

    /// Advance one frame and run every task that became ready.
    pub fn tick(&mut self) {
        self.clock.advance();
        self.settle();
    }

    /// Run ready tasks without advancing time.
    pub fn settle(&mut self) {
        let _clock = self.clock.enter();
        self.pool.run_until_stalled();
    }

    pub fn is_idle(&self) -> bool {
        self.spawner.live_tasks() == 0
    }

    /// Tick until every task finished or `max_frames` elapsed. Returns the
    /// number of frames advanced.
    pub fn run_until_idle(&mut self, max_frames: u64) -> u64 {
        self.settle();
        let mut frames = 0;
        while !self.is_idle() && frames < max_frames {
            self.tick();
            frames += 1;
        }
        frames
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(60.0)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn tween_reaches_its_end_on_the_frame_boundary() {
        let mut scheduler = Scheduler::new(10.0);
        let samples = Rc::new(RefCell::new(Vec::new()));
        let sink = samples.clone();
        scheduler.spawn(async move {
            tween(0.5, |t| sink.borrow_mut().push(t)).await;
        });
        let frames = scheduler.run_until_idle(100);
        assert_eq!(frames, 5);
        let samples = samples.borrow();
        assert_eq!(samples.first(), Some(&0.0));
        assert_eq!(samples.last(), Some(&1.0));
        assert_eq!(samples.len(), 6);
    }

    #[test]
    fn sequence_staggers_starts() {
        let mut scheduler = Scheduler::new(10.0);
        let starts = Rc::new(RefCell::new(Vec::new()));
        let clock = scheduler.clock().clone();
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let starts = starts.clone();
                let clock = clock.clone();
                async move { starts.borrow_mut().push(clock.frame()) }
            })
            .collect();
        scheduler.spawn(sequence(0.2, tasks));
        scheduler.run_until_idle(100);
        let starts = starts.borrow();
        assert_eq!(starts[1] - starts[0], 2);
        assert_eq!(starts[2] - starts[0], 4);
    }

    #[test]
    fn barrier_releases_waiters() {
        let mut scheduler = Scheduler::default();
        let done = Rc::new(Cell::new(false));
        let flag = done.clone();
        let barriers = scheduler.barriers().clone();
        scheduler.spawn(async move {
            barriers.wait_until("reveal").await;
            flag.set(true);
        });
        scheduler.tick();
        scheduler.tick();
        assert!(!done.get());
        scheduler.barriers().signal("reveal");
        scheduler.tick();
        assert!(done.get());
        assert!(scheduler.is_idle());
    }
}
