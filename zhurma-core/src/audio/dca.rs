//! Reader and writer for the raw DCA frame container.
//!
//! The container is a flat run of records, each a little-endian `u16`
//! payload length followed by exactly that many bytes of Opus data:
//!
//! ```text
//! +--------+-----------------+--------+-----------------+----
//! | len n1 | n1 payload bytes| len n2 | n2 payload bytes| ...
//! +--------+-----------------+--------+-----------------+----
//! ```
//!
//! Running out of bytes where a length prefix would start is the normal
//! end of the stream. Running out inside a payload means the file is
//! corrupt.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use tracing::{debug, info, trace};

use crate::Error;
use zhurma_common::models::Frame;

/// Size of the little-endian length header in front of every payload.
pub const LENGTH_PREFIX_BYTES: usize = 2;

/// Open the sound asset for decoding.
pub fn open_asset<P: AsRef<Path>>(path: P) -> Result<BufReader<File>, Error> {
    let file = File::open(path.as_ref()).map_err(|source| Error::AssetOpen {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Open and fully decode the asset at `path`.
pub fn load_asset<P: AsRef<Path>>(path: P) -> Result<Vec<Frame>, Error> {
    let reader = open_asset(&path)?;
    let frames = decode_frames(reader)?;
    let bytes: usize = frames.iter().map(Frame::len).sum();
    info!(
        "Decoded {} frames ({} payload bytes) from '{}'",
        frames.len(),
        bytes,
        path.as_ref().display()
    );
    Ok(frames)
}

/// Decode every record in `reader`, in file order.
///
/// Nothing is returned on a corrupt stream; the frames read so far are
/// dropped along with the error.
pub fn decode_frames<R: Read>(mut reader: R) -> Result<Vec<Frame>, Error> {
    let mut frames = Vec::new();

    while let Some(declared) = read_length_prefix(&mut reader)? {
        let mut payload = vec![0u8; declared as usize];
        reader.read_exact(&mut payload).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::CorruptFrame {
                index: frames.len(),
                declared,
            },
            _ => Error::Io(e),
        })?;
        trace!("frame #{} => {} bytes", frames.len(), declared);
        frames.push(Frame::new(payload));
    }

    Ok(frames)
}

/// `None` when fewer than two bytes remain.
fn read_length_prefix<R: Read>(reader: &mut R) -> Result<Option<u16>, Error> {
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    let mut filled = 0;

    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    if filled < LENGTH_PREFIX_BYTES {
        if filled > 0 {
            debug!("Ignoring {filled} trailing byte(s) after the last frame");
        }
        return Ok(None);
    }
    Ok(Some(u16::from_le_bytes(prefix)))
}

/// Append one record (length header + payload) to `out`.
pub fn write_frame(out: &mut Vec<u8>, payload: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        Error::Parse(format!(
            "frame of {} bytes does not fit a u16 length header",
            payload.len()
        ))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Serialize frames back into the container layout.
pub fn encode_frames(frames: &[Frame]) -> Result<Vec<u8>, Error> {
    let total: usize = frames.iter().map(|f| f.len() + LENGTH_PREFIX_BYTES).sum();
    let mut out = Vec::with_capacity(total);
    for frame in frames {
        write_frame(&mut out, frame.as_ref())?;
    }
    Ok(out)
}
