//! Reactive values and tagged property channels.
//!
//! Components keep their animatable state in [`Property`] cells. A property is
//! a [`Signal`] (the value scene scripts read back) paired with a [`Channel`]
//! tag and a live-write closure that mirrors each new value into the external
//! 3D object, which is not itself reactive. Every write goes through
//! [`Property::set`] so both sides can never drift apart.

use std::{cell::Cell, fmt::Debug, rc::Rc};

/// Shared, copyable value cell.
pub struct Signal<T: Copy>(Rc<Cell<T>>);

impl<T: Copy> Signal<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn get(&self) -> T {
        self.0.get()
    }

    pub fn set(&self, value: T) {
        self.0.set(value);
    }
}

impl<T: Copy> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Copy + Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signal").field(&self.get()).finish()
    }
}

/// Which live field of the external object a property feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Rotation,
    Scale,
    Opacity,
    Intensity,
    Color,
    LookAt,
    Zoom,
    Offset,
    Width,
    Points,
}

type LiveWrite<T> = Rc<dyn Fn(T)>;

/// A reactive value bound to one live field.
pub struct Property<T: Copy> {
    channel: Channel,
    value: Signal<T>,
    live: LiveWrite<T>,
}

impl<T: Copy + 'static> Property<T> {
    /// Create the property and push the initial value to the live field.
    pub fn new(channel: Channel, value: T, live: impl Fn(T) + 'static) -> Self {
        let live: LiveWrite<T> = Rc::new(live);
        live(value);
        Self {
            channel,
            value: Signal::new(value),
            live,
        }
    }

    /// A property with no live counterpart.
    pub fn detached(channel: Channel, value: T) -> Self {
        Self {
            channel,
            value: Signal::new(value),
            live: Rc::new(|_| ()),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Write the reactive value and the live field.
    pub fn set(&self, value: T) {
        self.value.set(value);
        (self.live)(value);
    }

    /// Write the reactive value only. Used while the live target does not
    /// exist yet; call [`Property::sync`] once it does.
    pub fn set_signal_only(&self, value: T) {
        self.value.set(value);
    }

    /// Re-push the current value, e.g. after the live target was rebuilt.
    pub fn sync(&self) {
        (self.live)(self.value.get());
    }

    pub fn signal(&self) -> Signal<T> {
        self.value.clone()
    }
}

impl<T: Copy> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel,
            value: self.value.clone(),
            live: self.live.clone(),
        }
    }
}

impl<T: Copy + Debug> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("channel", &self.channel)
            .field("value", &self.value.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_writes_both_sides() {
        let live = Rc::new(Cell::new(0.0f32));
        let mirror = live.clone();
        let property = Property::new(Channel::Opacity, 0.5, move |v| mirror.set(v));
        assert_eq!(live.get(), 0.5);
        property.set(0.25);
        assert_eq!(property.get(), 0.25);
        assert_eq!(live.get(), 0.25);
    }

    #[test]
    fn clones_share_the_value() {
        let a = Property::detached(Channel::Zoom, 1.0f32);
        let b = a.clone();
        b.set(2.0);
        assert_eq!(a.get(), 2.0);
        assert_eq!(a.channel(), Channel::Zoom);
    }
}
