pub mod cache;
pub mod config;
pub mod pager;
pub mod pages;
pub mod storage;
