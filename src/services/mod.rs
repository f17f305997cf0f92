pub mod dispatch;
pub mod promotion;
pub mod queue;
pub mod renderer;
pub mod storage;
pub mod worker;
