//! The viewport header: a two-token stream (viewport, line width) that opens every model's and
//! the grid's batch list. It lives in its own writable resident buffer and is patched in place on
//! resize, so recorded batches keep pointing at the same address.

use drawlist_protocol::{HeaderTable, TokenWriter};
use tracing::debug;

use crate::device::BaselineDevice;
use crate::error::DrawListError;
use crate::resident::{BufferAccess, ResidentBuffer};

#[derive(Debug)]
pub struct ViewportHeader {
    writer: TokenWriter,
    viewport_at: usize,
    line_width_at: usize,
    buffer: Option<ResidentBuffer>,
}

impl ViewportHeader {
    pub fn new(headers: HeaderTable) -> Self {
        Self {
            writer: TokenWriter::new(headers),
            viewport_at: 0,
            line_width_at: 0,
            buffer: None,
        }
    }

    /// Write the header on first use, afterwards patch both tokens and re-upload.
    pub fn update<D: BaselineDevice + ?Sized>(
        &mut self,
        device: &mut D,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        line_width: f32,
    ) -> Result<(), DrawListError> {
        match self.buffer {
            None => {
                self.writer.reset();
                self.viewport_at = self.writer.viewport(x, y, width, height);
                self.line_width_at = self.writer.line_width(line_width);
                let buffer = device.create_buffer(
                    self.writer.as_bytes(),
                    BufferAccess::READ | BufferAccess::WRITE,
                )?;
                debug!(address = buffer.address, size = buffer.size, "viewport header created");
                self.buffer = Some(buffer);
            }
            Some(buffer) => {
                self.writer
                    .patch_viewport(self.viewport_at, x, y, width, height)?;
                self.writer.patch_line_width(self.line_width_at, line_width)?;
                device.update_buffer(&buffer, 0, self.writer.as_bytes())?;
            }
        }
        Ok(())
    }

    pub fn tokens(&self) -> &[u8] {
        self.writer.as_bytes()
    }

    pub fn buffer(&self) -> Option<&ResidentBuffer> {
        self.buffer.as_ref()
    }

    pub fn address(&self) -> Result<u64, DrawListError> {
        self.buffer
            .map(|b| b.address)
            .ok_or(DrawListError::MissingViewportHeader)
    }

    pub fn release<D: BaselineDevice + ?Sized>(&mut self, device: &mut D) {
        if let Some(buffer) = self.buffer.take() {
            device.delete_buffer(buffer.id);
        }
        self.writer.reset();
    }
}
