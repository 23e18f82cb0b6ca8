//! Database model module which contains all the models used in the application. We use the module to communicate with the database, fetch and format data from the database.

pub mod core;
pub mod llm;
pub mod password;
pub mod upload;
pub mod util;
pub mod vote;
