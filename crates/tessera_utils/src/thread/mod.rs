mod latch;
mod mutator;
mod thread_pool;

pub use latch::{Latch, PanicPayload};
pub use mutator::Mutator;
pub use thread_pool::ThreadPool;
