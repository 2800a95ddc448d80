pub mod event;
pub mod features;
pub mod habit;
pub mod note;
pub mod sync;
pub mod task;
pub mod time;
