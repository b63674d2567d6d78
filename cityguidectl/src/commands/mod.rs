mod alternatives;
mod cache;
mod discover;
mod pin;

pub use alternatives::AlternativesArgs;
pub use cache::CacheCommands;
pub use discover::{DiscoverArgs, LocatorArgs};
pub use pin::{PinCommands, PinFingerprintArgs};

pub(crate) use pin::fingerprint_file;
