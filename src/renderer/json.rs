use std::io::Write;

use error_stack::{Report, ResultExt};

use crate::error::RenderError;
use crate::renderer::{ChartFrame, ChartRenderer};

/// Writes each frame as a single JSON line.
pub struct JsonRenderer<W> {
    writer: W,
}

impl<W: Write + Send> JsonRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ChartRenderer for JsonRenderer<W> {
    fn render(&mut self, frame: &ChartFrame<'_>) -> Result<(), Report<RenderError>> {
        serde_json::to_writer(&mut self.writer, frame).change_context(RenderError::Write)?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .change_context(RenderError::Write)?;
        Ok(())
    }
}
