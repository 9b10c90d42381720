pub mod dispatcher;
pub mod processor;
pub mod scheduler;
pub mod throttle;

pub use dispatcher::QueueDispatcher;
pub use processor::JobProcessor;
pub use scheduler::PublishScheduler;
pub use throttle::OpThrottle;
