pub mod ballot;
pub mod election;
#[cfg(test)]
pub mod memory;
pub mod mongodb;
pub mod notify;
pub mod platform;
pub mod results;
pub mod submission;
pub mod token;
pub mod trigger;
