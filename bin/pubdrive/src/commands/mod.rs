pub mod doctor;
pub mod open;
pub mod shot;
pub mod targets;
