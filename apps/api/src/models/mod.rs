pub mod content;
pub mod course;
pub mod request;
