//! Line-oriented report stream.

/// Destination for human-readable status lines.
///
/// One call is one line; implementations append the line terminator. Writes
/// are best-effort: a sink that cannot keep up drops lines rather than block
/// the test loop or a fault handler.
pub trait ReportSink {
    /// Emit one line.
    fn write_line(&mut self, line: &str);
}

impl<T: ReportSink + ?Sized> ReportSink for &mut T {
    fn write_line(&mut self, line: &str) {
        (**self).write_line(line);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn write_line(&mut self, _line: &str) {}
}
