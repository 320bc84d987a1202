pub mod lameduck;
pub mod pulse;
