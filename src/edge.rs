//! Pin-change events for the [`sniffer`][crate::sniffer].
//!
//! A pin-change interrupt samples both lines through an [`EdgeCapture`] and pushes the levels
//! into an [`EdgeQueue`].  The sniffer loop pops them in order.  The queue is shared between the
//! two execution contexts, so it needs some kind of interior mutability.  `pirate-i2c` already
//! implements [`EdgeQueue`] for these types:
//!
//! | Queue | Feature Name | Notes |
//! | --- | --- | --- |
//! | [`core::cell::RefCell`]`<Deque>` | _always available_ | Producer and consumer in the same context (polling, tests). |
//! | [`std::sync::Mutex`][mutex-std]`<Deque>` | `std` | For platforms where `std` is available. |
//! | [`critical_section::Mutex`][mutex-cs]`<RefCell<Deque>>` | `critical-section` | Interrupt handler on a bare-metal target. |
//!
//! [mutex-std]: https://doc.rust-lang.org/std/sync/struct.Mutex.html
//! [mutex-cs]: https://docs.rs/critical-section/latest/critical_section/struct.Mutex.html
use crate::Lines;
use core::cell::RefCell;
use embedded_hal::digital::InputPin;
use heapless::Deque;

/// Bounded FIFO of sampled line levels.
pub trait EdgeQueue {
    /// Append an event.  A full queue hands the event back.
    fn push(&self, lines: Lines) -> Result<(), Lines>;

    /// Take the oldest event.
    fn pop(&self) -> Option<Lines>;
}

impl<Q: EdgeQueue + ?Sized> EdgeQueue for &Q {
    fn push(&self, lines: Lines) -> Result<(), Lines> {
        (**self).push(lines)
    }

    fn pop(&self) -> Option<Lines> {
        (**self).pop()
    }
}

impl<const N: usize> EdgeQueue for RefCell<Deque<Lines, N>> {
    fn push(&self, lines: Lines) -> Result<(), Lines> {
        self.borrow_mut().push_back(lines)
    }

    fn pop(&self) -> Option<Lines> {
        self.borrow_mut().pop_front()
    }
}

#[cfg(any(test, feature = "std"))]
impl<const N: usize> EdgeQueue for std::sync::Mutex<Deque<Lines, N>> {
    fn push(&self, lines: Lines) -> Result<(), Lines> {
        match self.lock() {
            Ok(mut queue) => queue.push_back(lines),
            Err(_) => Err(lines),
        }
    }

    fn pop(&self) -> Option<Lines> {
        self.lock().ok()?.pop_front()
    }
}

#[cfg(feature = "critical-section")]
impl<const N: usize> EdgeQueue for critical_section::Mutex<RefCell<Deque<Lines, N>>> {
    fn push(&self, lines: Lines) -> Result<(), Lines> {
        critical_section::with(|cs| self.borrow_ref_mut(cs).push_back(lines))
    }

    fn pop(&self) -> Option<Lines> {
        critical_section::with(|cs| self.borrow_ref_mut(cs).pop_front())
    }
}

/// Producer side: call [`on_change()`][EdgeCapture::on_change] from the pin-change interrupt.
pub struct EdgeCapture<'q, SDA, SCL, Q> {
    sda: SDA,
    scl: SCL,
    queue: &'q Q,
    dropped: u32,
}

impl<'q, SDA, SCL, Q, E> EdgeCapture<'q, SDA, SCL, Q>
where
    SDA: InputPin<Error = E>,
    SCL: InputPin<Error = E>,
    Q: EdgeQueue,
{
    pub fn new(sda: SDA, scl: SCL, queue: &'q Q) -> Self {
        Self {
            sda,
            scl,
            queue,
            dropped: 0,
        }
    }

    /// Sample both lines right away and queue the levels.
    ///
    /// If the consumer fell behind and the queue is full, the new event is discarded and
    /// counted in [`dropped()`][EdgeCapture::dropped].
    pub fn on_change(&mut self) -> Result<(), E> {
        let lines = Lines::new(self.sda.is_high()?, self.scl.is_high()?);
        if self.queue.push(lines).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
        Ok(())
    }

    /// Number of events lost to a full queue.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn free(self) -> (SDA, SCL) {
        (self.sda, self.scl)
    }
}
