pub mod named_thread;
pub mod reactor_violation;
