use drawlist_gpu::RecordingDevice;
use drawlist_protocol::{HeaderTable, HeaderTableError, Token, TokenDecodeError, TokenStreamIter};

#[derive(Debug, thiserror::Error)]
pub enum TokenDumpError {
    #[error(transparent)]
    Headers(#[from] HeaderTableError),
    #[error(transparent)]
    Decode(#[from] TokenDecodeError),
}

/// Header table of the recording device, which is what `compile --dump` streams are built with.
pub fn recording_headers() -> Result<HeaderTable, TokenDumpError> {
    Ok(HeaderTable::from_device(&RecordingDevice::new())?)
}

/// Decode every token of `stream`, stopping at the first malformed record.
pub fn decode_dump(stream: &[u8]) -> Result<Vec<(usize, Token)>, TokenDumpError> {
    let headers = recording_headers()?;
    let tokens = TokenStreamIter::new(stream, &headers).collect::<Result<Vec<_>, _>>()?;
    Ok(tokens)
}

pub fn format_token(offset: usize, token: &Token) -> String {
    format!("{offset:>8}  {token:?}")
}
