pub mod dispatch;
pub mod error;
pub mod macros;
pub mod message;
pub mod stream;
pub mod types;
pub mod wire;
pub mod xstring;

pub use error::CourierError;
pub use types::CourierType;
pub use wire::{WireReader, WireWriter};

pub use serde_json;
