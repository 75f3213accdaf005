pub mod binja;
pub mod cache;
pub mod config;
pub mod logging;
pub mod serve;

#[cfg(test)]
mod testing;
