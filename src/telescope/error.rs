use thiserror::Error;

use crate::telescope::channel::ChannelError;

#[derive(Debug, Error)]
pub enum TelescopeError {
    #[error("hardware command failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("unexpected {query} output: {output:?}")]
    UnexpectedOutput {
        query: &'static str,
        output: String,
    },
}
