use signage_model::Image;

/// Scheduler -> viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCommand {
    Display(Image),
    /// Records exist but none is in window right now.
    ShowEmpty,
    /// The repository holds no records at all.
    ShowNoData,
    /// The no-data grace period elapsed.
    Fallback,
}
