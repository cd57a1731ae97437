mod locator;
mod locker;

pub use locator::*;
pub use locker::*;
