#![forbid(unsafe_code)]

pub mod password;
pub mod repository;
pub mod sqlite;
