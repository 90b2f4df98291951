//! Interrupt-driven event queue.
//!
//! The 1 Hz flow timer callback produces; the main loop consumes.
//! Command bodies from the HTTP and MQTT tasks do not pass through here,
//! they have several producers and travel through
//! [`crate::adapters::ingress`] instead.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ esp_timer   │────▶│  Event Queue │────▶│  Main Loop   │
//! │ (1 Hz)      │     │  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// Flow integration period elapsed.
    FlowTick = 0,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// Timer task writes (produces), main loop reads (consumes).

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: EVENT_BUFFER is only touched by push_event (single producer,
// the esp_timer task) and pop_event (single consumer, the main loop).
// A slot is written before HEAD is published with Release and read only
// after HEAD is observed with Acquire.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from timer-task or ISR context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false;
    }

    // SAFETY: single producer; the consumer never reads slot `head`
    // until HEAD moves past it below.
    unsafe {
        EVENT_BUFFER[head as usize] = event as u8;
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
pub fn pop_event() -> Option<Event> {
    loop {
        let tail = EVENT_TAIL.load(Ordering::Relaxed);
        let head = EVENT_HEAD.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        // SAFETY: slot `tail` was published by the producer's Release store.
        let raw = unsafe { EVENT_BUFFER[tail as usize] };
        EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

        if let Some(event) = event_from_u8(raw) {
            return Some(event);
        }
    }
}

/// Drain all pending events into a callback, in FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::FlowTick),
        _ => None,
    }
}
