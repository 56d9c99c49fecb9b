mod cell;
mod event_loop;
pub mod helpers;

pub use cell::{Cell, CellOptions, CellSession, CellStatus};
pub use event_loop::{EventLoop, Timer, TimerId};
pub use rhai;
