//! Host-agnostic tick scheduling.
//!
//! Render loops never own a timer. They subscribe a callback to a [`TickSource`] and keep the
//! returned [`CancelHandle`]; the host decides what drives the source (vsync, a native timer, or a
//! test harness calling [`ManualTickSource::fire`]).

mod tick;

pub use tick::{
    CancelHandle, FixedRateDriver, ManualTickSource, MissedTickPolicy, Tick, TickCallback,
    TickSource,
};
