//! Helper items to assist the working of `gridsym`.

pub(crate) mod stopwatch;
