mod record;
mod registry;

pub use record::Election;
pub use registry::{ElectionRegistry, MongoRegistry};

#[cfg(test)]
pub(crate) use record::examples::day;
