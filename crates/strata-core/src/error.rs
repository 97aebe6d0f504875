use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("vertex {vertex} is outside the configured range (max {limit}) and auto_extend is off")]
    VertexOutOfRange { vertex: u64, limit: u64 },

    #[error("cpu topology error: {0}")]
    Topology(String),
}

pub type Result<T> = std::result::Result<T, Error>;
