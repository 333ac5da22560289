//! Reassembly of a raw byte stream into fixed-size frames.

use bytes::BytesMut;
use fp_core::Frame;

/// Splits arbitrarily chunked process output into [`Frame`]s of exactly
/// `frame_size` bytes, numbered from 0 in arrival order.
#[derive(Debug)]
pub struct FrameDemuxer {
    frame_size: usize,
    buffer: BytesMut,
    next_sequence: u64,
}

impl FrameDemuxer {
    /// # Panics
    ///
    /// Panics if `frame_size` is zero.
    pub fn new(frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame size must be non-zero");
        Self {
            frame_size,
            buffer: BytesMut::with_capacity(frame_size),
            next_sequence: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames produced so far.
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Append `chunk` and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::with_capacity(self.buffer.len() / self.frame_size);
        while self.buffer.len() >= self.frame_size {
            let data = self.buffer.split_to(self.frame_size).freeze();
            frames.push(Frame::new(self.next_sequence, data));
            self.next_sequence += 1;
        }
        frames
    }

    /// End of stream: discard any incomplete trailing frame and return how
    /// many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            tracing::trace!(
                "Discarding {dropped} trailing bytes (frame size {})",
                self.frame_size
            );
        }
        self.buffer.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_exact_frames() {
        let mut demux = FrameDemuxer::new(4);
        let frames = demux.push(b"abcdefgh");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data().as_ref(), b"abcd");
        assert_eq!(frames[1].data().as_ref(), b"efgh");
        assert_eq!(frames[1].sequence(), 1);
        assert_eq!(demux.pending(), 0);
    }

    #[test]
    fn frames_span_chunk_boundaries() {
        let mut demux = FrameDemuxer::new(3);
        assert!(demux.push(b"a").is_empty());
        let frames = demux.push(b"bcde");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), b"abc");
        assert_eq!(demux.pending(), 2);

        let frames = demux.push(b"f");
        assert_eq!(frames[0].data().as_ref(), b"def");
        assert_eq!(frames[0].sequence(), 1);
    }

    #[test]
    fn concatenation_is_lossless_apart_from_tail() {
        let stream: Vec<u8> = (0..=250u8).collect();
        let mut demux = FrameDemuxer::new(7);
        let mut rebuilt = Vec::new();
        for chunk in stream.chunks(11) {
            for frame in demux.push(chunk) {
                assert_eq!(frame.len(), 7);
                rebuilt.extend_from_slice(frame.data());
            }
        }
        let dropped = demux.finish();

        assert_eq!(dropped, stream.len() % 7);
        assert_eq!(rebuilt, stream[..stream.len() - dropped]);
        assert_eq!(demux.frames_emitted(), (stream.len() / 7) as u64);
    }

    #[test]
    fn finish_without_tail_drops_nothing() {
        let mut demux = FrameDemuxer::new(2);
        demux.push(b"abcd");
        assert_eq!(demux.finish(), 0);
    }

    #[test]
    #[should_panic(expected = "frame size")]
    fn zero_frame_size_panics() {
        FrameDemuxer::new(0);
    }
}
