//! Level-triggered signal lines and numeric buses.
//!
//! A [`Line`] is a single wire. Setting it to a level always runs every listener
//! registered for that level, in registration order, whether or not the wire
//! was already there. Devices use this to react to chip-select and clock pulses
//! in the same call stack as the CPU bus transaction that caused them.
//!
//! A [`Bus`] is a group of wires read and written together as a number masked
//! to the bus width.
//!
//! Both types are cheap handles over shared state (`Rc`), so the same wire can
//! be held by the CPU and by any number of devices. They are deliberately
//! `!Send`: the whole board lives on the execution thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::logging::{log, LogCategory, LogLevel};

/// Logic level of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    #[inline]
    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Callback run when a line is driven to a level.
pub type Listener = Rc<dyn Fn()>;

struct LineState {
    level: Cell<Level>,
    low: RefCell<Vec<Listener>>,
    high: RefCell<Vec<Listener>>,
}

/// A single-bit wire with level-triggered listener dispatch.
#[derive(Clone)]
pub struct Line {
    inner: Rc<LineState>,
}

impl Default for Line {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Line")
            .field("level", &self.inner.level.get())
            .field("low_listeners", &self.inner.low.borrow().len())
            .field("high_listeners", &self.inner.high.borrow().len())
            .finish()
    }
}

impl Line {
    /// Create a wire resting low with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(LineState {
                level: Cell::new(Level::Low),
                low: RefCell::new(Vec::new()),
                high: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Current level.
    #[inline]
    pub fn level(&self) -> Level {
        self.inner.level.get()
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.level().is_high()
    }

    #[inline]
    pub fn is_low(&self) -> bool {
        self.level().is_low()
    }

    /// Append a listener for `level`. There is no removal.
    pub fn register_listener<F>(&self, level: Level, callback: F)
    where
        F: Fn() + 'static,
    {
        self.listeners(level).borrow_mut().push(Rc::new(callback));
    }

    /// Drive the wire to `level` and run its listeners. Returns the previous level.
    ///
    /// The listener list is snapshotted before dispatch, so a listener may drive
    /// other lines (or this one) and may register new listeners; those only take
    /// effect from the next call.
    pub fn set_state(&self, level: Level) -> Level {
        let previous = self.inner.level.replace(level);
        let snapshot: Vec<Listener> = self.listeners(level).borrow().clone();
        for listener in &snapshot {
            listener();
        }
        previous
    }

    /// Whether two handles refer to the same wire.
    pub fn same_wire(&self, other: &Line) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn listeners(&self, level: Level) -> &RefCell<Vec<Listener>> {
        match level {
            Level::Low => &self.inner.low,
            Level::High => &self.inner.high,
        }
    }
}

struct BusState {
    width: u32,
    mask: u64,
    value: Cell<u64>,
}

/// An N-bit shared register read and written as an unsigned number.
#[derive(Clone)]
pub struct Bus {
    inner: Rc<BusState>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("width", &self.inner.width)
            .field("value", &format_args!("{:#X}", self.inner.value.get()))
            .finish()
    }
}

impl Bus {
    /// Widest bus supported.
    pub const MAX_WIDTH: u32 = 32;

    /// Create a bus of `width` bits (1..=32), initially zero.
    ///
    /// Widths outside that range are clamped.
    pub fn new(width: u32) -> Self {
        let clamped = width.clamp(1, Self::MAX_WIDTH);
        if clamped != width {
            log(LogCategory::Signals, LogLevel::Warn, || {
                format!("Bus: width {} clamped to {}", width, clamped)
            });
        }
        Self {
            inner: Rc::new(BusState {
                width: clamped,
                mask: (1u64 << clamped) - 1,
                value: Cell::new(0),
            }),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Current value, masked to the bus width.
    #[inline]
    pub fn read(&self) -> u64 {
        self.inner.value.get() & self.inner.mask
    }

    /// Drive `value`, truncated to the bus width.
    #[inline]
    pub fn write(&self, value: u64) {
        self.inner.value.set(value & self.inner.mask);
    }

    /// Whether two handles refer to the same bus.
    pub fn same_bus(&self, other: &Bus) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
