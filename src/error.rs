use thiserror::Error;

/// Errors reported by the simulation core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Rejected at construction; the simulation cannot start with it.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A live parameter change outside the value's physical domain.
    #[error("parameter `{name}` = {value} is out of range (expected {expected})")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("particle type {type_id} does not exist (number of types: {num_types})")]
    UnknownType { type_id: usize, num_types: usize },
}

pub type SimResult<T> = Result<T, SimError>;
