//! Fixed-layout chunk packets
//!
//! ```text
//! [0:2)      u16, big-endian   sequence number (wraps at 65536)
//! [2:2+2N)   i16[N], big-endian samples, N = frames_per_chunk * channels,
//!                               interleaved frame-major (L,R,L,R,...)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::SEQ_HEADER_SIZE;
use crate::error::CodecError;

/// Shape of one audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGeometry {
    /// Frames per chunk (samples per channel)
    pub frames_per_chunk: usize,
    /// Interleaved channel count
    pub channels: u16,
}

impl ChunkGeometry {
    pub fn new(frames_per_chunk: usize, channels: u16) -> Self {
        Self {
            frames_per_chunk,
            channels,
        }
    }

    /// Total interleaved samples in one chunk
    pub fn samples_per_chunk(&self) -> usize {
        self.frames_per_chunk * self.channels as usize
    }

    /// Exact size of an encoded packet in bytes
    pub fn packet_len(&self) -> usize {
        SEQ_HEADER_SIZE + self.samples_per_chunk() * std::mem::size_of::<i16>()
    }

    /// Duration of one chunk in microseconds
    pub fn duration_us(&self, sample_rate: u32) -> u64 {
        (self.frames_per_chunk as u64 * 1_000_000) / sample_rate as u64
    }
}

/// Encoder/decoder for chunk packets of one geometry
#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    geometry: ChunkGeometry,
}

impl ChunkCodec {
    pub fn new(geometry: ChunkGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> ChunkGeometry {
        self.geometry
    }

    pub fn packet_len(&self) -> usize {
        self.geometry.packet_len()
    }

    /// Encode a chunk into a freshly allocated packet
    pub fn encode(&self, seq: u16, samples: &[i16]) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.packet_len());
        self.encode_into(seq, samples, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode a chunk, appending to `buf`
    ///
    /// Used on the real-time path with a cleared, pre-sized buffer so that no
    /// allocation happens per period.
    pub fn encode_into(
        &self,
        seq: u16,
        samples: &[i16],
        buf: &mut BytesMut,
    ) -> Result<(), CodecError> {
        self.check_frame(samples.len())?;

        buf.reserve(self.packet_len());
        buf.put_u16(seq);
        for &sample in samples {
            buf.put_i16(sample);
        }
        Ok(())
    }

    /// Decode a packet into its sequence number and sample block
    pub fn decode(&self, packet: &[u8]) -> Result<(u16, Vec<i16>), CodecError> {
        let mut samples = vec![0i16; self.geometry.samples_per_chunk()];
        let seq = self.decode_into(packet, &mut samples)?;
        Ok((seq, samples))
    }

    /// Decode a packet into a caller-provided sample block
    pub fn decode_into(&self, packet: &[u8], samples: &mut [i16]) -> Result<u16, CodecError> {
        if packet.len() != self.packet_len() {
            return Err(CodecError::InvalidPacketLength {
                expected: self.packet_len(),
                actual: packet.len(),
            });
        }
        self.check_frame(samples.len())?;

        let mut cursor = packet;
        let seq = cursor.get_u16();
        for sample in samples.iter_mut() {
            *sample = cursor.get_i16();
        }
        Ok(seq)
    }

    fn check_frame(&self, len: usize) -> Result<(), CodecError> {
        let expected = self.geometry.samples_per_chunk();
        if len != expected {
            return Err(CodecError::InvalidFrameSize {
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}
