pub mod command;
pub mod directory;
pub mod response;
