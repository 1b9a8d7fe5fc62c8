//! Adapts device callbacks to whole intercom periods
//!
//! Audio backends do not promise callbacks of exactly one chunk. The pump
//! serves output sample by sample from the last played chunk and runs one
//! bridge period (one send, one play) each time that chunk is used up.

use crate::audio::buffer::SharedCaptureQueue;
use crate::bridge::CallbackBridge;
use crate::network::Transport;

pub struct ChunkPump<T: Transport> {
    bridge: CallbackBridge<T>,
    capture: SharedCaptureQueue,
    input: Vec<i16>,
    output: Vec<i16>,
    offset: usize,
}

impl<T: Transport> ChunkPump<T> {
    pub fn new(bridge: CallbackBridge<T>, capture: SharedCaptureQueue) -> Self {
        let samples_per_chunk = bridge.samples_per_chunk();
        Self {
            bridge,
            capture,
            input: vec![0; samples_per_chunk],
            output: vec![0; samples_per_chunk],
            // Start exhausted so the first sample triggers a period
            offset: samples_per_chunk,
        }
    }

    /// Fill a device output buffer, converting each sample with `convert`
    pub fn render<S>(&mut self, out: &mut [S], convert: impl Fn(i16) -> S) {
        for sample in out.iter_mut() {
            if self.offset == self.output.len() {
                self.period();
            }
            *sample = convert(self.output[self.offset]);
            self.offset += 1;
        }
    }

    fn period(&mut self) {
        self.capture.pop_chunk_into(&mut self.input);
        if let Err(e) = self.bridge.process(&self.input, &mut self.output) {
            tracing::trace!("Period skipped send: {}", e);
        }
        self.offset = 0;
    }

    pub fn bridge(&self) -> &CallbackBridge<T> {
        &self.bridge
    }
}
