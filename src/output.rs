use crate::error::Result;
use crate::stream::TextStream;
use futures::StreamExt;
use std::io::Write;

/// What a fully consumed response produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub chunks: usize,
}

impl Completion {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Write each chunk to `out` as it arrives, flushing so the operator sees
/// the response build up. Chunks already written stay written if the stream
/// fails partway.
pub async fn write_stream<W: Write>(mut stream: TextStream, out: &mut W) -> Result<Completion> {
    let mut completion = Completion::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(chunk.as_bytes())?;
        out.flush()?;
        completion.text.push_str(&chunk);
        completion.chunks += 1;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(completion)
}
