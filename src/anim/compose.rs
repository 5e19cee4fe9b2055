//! Structured composition of animation tasks.
//!
//! | helper | behaviour |
//! |---|---|
//! | [`all`] | start every task now, finish when the last one does |
//! | [`chain`] | run tasks strictly one after another |
//! | [`sequence`] | start task `i` after `i * delay` seconds, finish with the last |
//! | [`repeat`] | run a task factory a bounded number of times |
//! | [`wait_for`] | idle for a number of seconds |
//! | [`Barriers`] | named signals the driver raises at known points |

use std::{
    cell::RefCell,
    collections::HashMap,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures::future::{LocalBoxFuture, join_all};

use crate::anim::tween::tween;

pub async fn all<F>(tasks: impl IntoIterator<Item = F>)
where
    F: Future<Output = ()>,
{
    join_all(tasks).await;
}

pub async fn chain<'a>(tasks: impl IntoIterator<Item = LocalBoxFuture<'a, ()>>) {
    for task in tasks {
        task.await;
    }
}

pub async fn sequence<F>(delay: f32, tasks: impl IntoIterator<Item = F>)
where
    F: Future<Output = ()>,
{
    let staggered = tasks.into_iter().enumerate().map(|(i, task)| async move {
        wait_for(delay * i as f32).await;
        task.await;
    });
    join_all(staggered).await;
}

pub async fn repeat<F, Fut>(times: usize, mut factory: F)
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = ()>,
{
    for i in 0..times {
        factory(i).await;
    }
}

pub async fn wait_for(seconds: f32) {
    tween(seconds, |_| ()).await;
}

#[derive(Default)]
struct Barrier {
    raised: bool,
    waiters: Vec<Waker>,
}

/// Named one-shot signals. Once raised a barrier stays raised.
#[derive(Clone, Default)]
pub struct Barriers(Rc<RefCell<HashMap<String, Barrier>>>);

impl Barriers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self, name: &str) {
        let waiters = {
            let mut barriers = self.0.borrow_mut();
            let barrier = barriers.entry(name.to_string()).or_default();
            barrier.raised = true;
            std::mem::take(&mut barrier.waiters)
        };
        log::debug!("barrier {name} raised, waking {} task(s)", waiters.len());
        for waker in waiters {
            waker.wake();
        }
    }

    pub fn is_raised(&self, name: &str) -> bool {
        self.0.borrow().get(name).is_some_and(|b| b.raised)
    }

    pub fn wait_until(&self, name: &str) -> WaitUntil {
        WaitUntil {
            barriers: self.clone(),
            name: name.to_string(),
        }
    }
}

pub struct WaitUntil {
    barriers: Barriers,
    name: String,
}

impl Future for WaitUntil {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut barriers = self.barriers.0.borrow_mut();
        let barrier = barriers.entry(self.name.clone()).or_default();
        if barrier.raised {
            Poll::Ready(())
        } else {
            barrier.waiters.push(cx.waker().clone());
            Poll::Pending
        }
    }
}
