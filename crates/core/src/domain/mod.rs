pub mod associate;
pub mod customer;
pub mod quote;
pub mod settlement;
