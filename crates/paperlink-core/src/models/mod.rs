pub mod pairing;
pub mod record;

pub use pairing::*;
pub use record::*;
