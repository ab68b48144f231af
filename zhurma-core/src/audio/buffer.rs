//! src/audio/buffer.rs
//!
//! Write-once store for the decoded frame sequence. It is filled at startup
//! and then read by any number of playbacks at the same time; readers get a
//! shared handle to the same slice, never a copy.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::Error;
use crate::audio::dca;
use zhurma_common::models::Frame;

#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: OnceCell<Arc<[Frame]>>,
}

impl FrameBuffer {
    /// An empty, not-yet-loaded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that is loaded from the start (synthetic assets in tests).
    pub fn with_frames(frames: Vec<Frame>) -> Self {
        let buffer = Self::new();
        let _ = buffer.frames.set(frames.into());
        buffer
    }

    /// Install the sequence. Only the first call wins.
    pub fn load(&self, frames: Vec<Frame>) -> Result<(), Error> {
        self.frames
            .set(frames.into())
            .map_err(|_| Error::AlreadyLoaded)
    }

    /// Decode `reader` and install the result. A corrupt stream leaves the
    /// buffer untouched.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<usize, Error> {
        if self.is_loaded() {
            return Err(Error::AlreadyLoaded);
        }
        let frames = dca::decode_frames(reader)?;
        let count = frames.len();
        self.load(frames)?;
        Ok(count)
    }

    pub fn load_from_path<P: AsRef<Path>>(&self, path: P) -> Result<usize, Error> {
        if self.is_loaded() {
            return Err(Error::AlreadyLoaded);
        }
        let frames = dca::load_asset(&path)?;
        let count = frames.len();
        self.load(frames)?;
        info!("Frame buffer loaded with {count} frames");
        Ok(count)
    }

    pub fn is_loaded(&self) -> bool {
        self.frames.get().is_some()
    }

    /// The full sequence in playback order, or `Error::NotLoaded`.
    pub fn frames(&self) -> Result<Arc<[Frame]>, Error> {
        self.frames.get().cloned().ok_or(Error::NotLoaded)
    }

    /// Number of frames; zero while unloaded.
    pub fn len(&self) -> usize {
        self.frames.get().map_or(0, |f| f.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unloaded_buffer_reports_not_loaded() {
        let buffer = FrameBuffer::new();
        assert!(!buffer.is_loaded());
        assert!(matches!(buffer.frames(), Err(Error::NotLoaded)));
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn second_load_is_rejected() {
        let buffer = FrameBuffer::new();
        buffer.load(vec![Frame::new(vec![1])]).unwrap();
        assert!(matches!(
            buffer.load(vec![Frame::new(vec![2])]),
            Err(Error::AlreadyLoaded)
        ));
        assert_eq!(buffer.frames().unwrap()[0].as_ref(), &[1]);
    }

    #[test]
    fn readers_share_the_same_sequence() {
        let buffer = FrameBuffer::with_frames(vec![Frame::new(vec![1, 2]), Frame::new(vec![3])]);
        let a = buffer.frames().unwrap();
        let b = buffer.frames().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn concurrent_readers_see_identical_frames() {
        let buffer = Arc::new(FrameBuffer::with_frames(vec![
            Frame::new(vec![7, 7]),
            Frame::new(vec![8]),
        ]));
        let seen = tokio_test::block_on(async {
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let buffer = buffer.clone();
                    tokio::spawn(async move { buffer.frames() })
                })
                .collect();
            let mut out = Vec::new();
            for task in tasks {
                out.push(tokio_test::assert_ok!(task.await.unwrap()));
            }
            out
        });
        assert_eq!(seen.len(), 8);
        assert!(seen.iter().all(|f| f.len() == 2 && f[0].as_ref() == &[7, 7]));
    }

    #[test]
    fn corrupt_stream_leaves_buffer_unloaded() {
        // Declares 5 bytes, provides 2.
        let data = vec![5u8, 0, 0xAA, 0xBB];
        let buffer = FrameBuffer::new();
        let err = buffer.load_from_reader(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, Error::CorruptFrame { index: 0, declared: 5 }));
        assert!(!buffer.is_loaded());
    }

    #[test]
    fn loads_from_reader() {
        let data = vec![2u8, 0, 0xAA, 0xBB, 1, 0, 0xCC];
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.load_from_reader(Cursor::new(data)).unwrap(), 2);
        assert!(buffer.is_loaded());
        assert_eq!(buffer.frames().unwrap()[1].as_ref(), &[0xCC]);
    }
}
