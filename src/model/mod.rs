pub mod attendance;
pub mod employee;
pub mod grid;
pub mod leave;
