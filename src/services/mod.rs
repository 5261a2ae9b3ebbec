pub mod archive;
pub mod conversion_provider;
pub mod converter;
pub mod storage;
pub mod worker;
