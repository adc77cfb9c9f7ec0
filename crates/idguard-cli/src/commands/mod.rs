pub mod account;
pub mod token;
pub mod verify;
