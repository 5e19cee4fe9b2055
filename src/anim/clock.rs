use std::{
    cell::{Cell, RefCell},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

thread_local! {
    static CURRENT: RefCell<Option<FrameClock>> = const { RefCell::new(None) };
}

struct ClockState {
    frame: Cell<u64>,
    fps: f32,
    waiters: RefCell<Vec<Waker>>,
}

/// Deterministic animation timeline measured in rendered frames.
///
/// Time is `frame / fps`, never wall-clock, so a scene renders identically no
/// matter how long each frame takes to produce.
#[derive(Clone)]
pub struct FrameClock(Rc<ClockState>);

impl FrameClock {
    pub fn new(fps: f32) -> Self {
        Self(Rc::new(ClockState {
            frame: Cell::new(0),
            fps: if fps > 0.0 { fps } else { 60.0 },
            waiters: RefCell::new(Vec::new()),
        }))
    }

    pub fn frame(&self) -> u64 {
        self.0.frame.get()
    }

    pub fn fps(&self) -> f32 {
        self.0.fps
    }

    /// Seconds since the first frame.
    pub fn time(&self) -> f32 {
        (self.frame() as f64 / self.0.fps as f64) as f32
    }

    /// Seconds elapsed since `frame`.
    pub fn since(&self, frame: u64) -> f32 {
        (self.frame().saturating_sub(frame) as f64 / self.0.fps as f64) as f32
    }

    /// Move to the next frame and wake everything waiting for it.
    pub(crate) fn advance(&self) {
        self.0.frame.set(self.frame() + 1);
        let waiters = std::mem::take(&mut *self.0.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }

    /// Resolves once the clock has moved past the frame it was first polled on.
    pub fn next_frame(&self) -> NextFrame {
        NextFrame {
            clock: Some(self.clone()),
            target: None,
        }
    }

    /// The clock of the scheduler currently polling tasks on this thread.
    pub fn current() -> Option<FrameClock> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Install this clock as the current one until the guard drops.
    pub(crate) fn enter(&self) -> ClockGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        ClockGuard { previous }
    }
}

pub(crate) struct ClockGuard {
    previous: Option<FrameClock>,
}

impl Drop for ClockGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Suspend the calling task until the next frame of the current clock.
///
/// Outside a scheduler this resolves immediately.
pub fn next_frame() -> NextFrame {
    NextFrame {
        clock: FrameClock::current(),
        target: None,
    }
}

pub struct NextFrame {
    clock: Option<FrameClock>,
    target: Option<u64>,
}

impl Future for NextFrame {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let Some(clock) = &this.clock else {
            return Poll::Ready(());
        };
        let target = *this.target.get_or_insert(clock.frame() + 1);
        if clock.frame() >= target {
            Poll::Ready(())
        } else {
            clock.0.waiters.borrow_mut().push(cx.waker().clone());
            Poll::Pending
        }
    }
}
