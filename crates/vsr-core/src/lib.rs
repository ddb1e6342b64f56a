pub mod backup;
pub mod config;
pub mod error;
pub mod platform;
pub mod server;
pub mod vcdbtree;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
