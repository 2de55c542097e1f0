#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid peer address {host}:{port}")]
    InvalidPeer { host: String, port: u16 },

    #[error("could not open input file {path}: {source}")]
    InputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed datagram: {0}")]
    InvalidPacket(String),
}
