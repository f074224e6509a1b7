//! Interface to the charting library.

/// How a chart repaints after its data changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedrawMode {
    /// Repaint in one step, skipping transitions.
    Immediate,
    /// Let the chart animate towards the new data.
    Animated,
}

/// A chart whose single series is driven by the batcher.
///
/// Implementations wrap whatever the UI layer uses to draw; the batcher only
/// replaces the series and asks for one redraw per frame.
pub trait ChartHandle: Send {
    /// Replace the x-axis labels and the series values.
    fn set_data(&mut self, labels: &[usize], values: &[f64]);

    fn redraw(&mut self, mode: RedrawMode);
}
