pub mod append;
pub mod engine;
pub mod init;
pub mod maintain;
pub mod status;
pub mod tune;
