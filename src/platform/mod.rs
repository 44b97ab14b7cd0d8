pub mod clock;
pub mod runtime;
pub mod storage;
