pub mod lifecycle;
pub mod tracking;
pub mod yard;
