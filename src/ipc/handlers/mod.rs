pub mod attendance;
pub mod core;
pub mod grades;
pub mod meals;
pub mod menu;
pub mod stats;
pub mod teachers;
