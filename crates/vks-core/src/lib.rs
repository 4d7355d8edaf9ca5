pub mod config;
pub mod error;
pub mod types;

pub use error::{VksError, VksResult};
pub use types::{
    DerivationIndex, DerivationScheme, Envelope, OperatorAddress, ValidatorKeyRecord,
};
