// promptcache - Local prompt/response cache with similarity search
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod license;
pub mod server;
pub mod similarity;
pub mod storage;
pub mod utils;
