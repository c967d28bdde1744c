pub mod bot;
pub mod config;
pub mod directory;
pub mod kb;
pub mod publish;
pub mod registry;
pub mod search;
pub mod shared;
pub mod storage;
