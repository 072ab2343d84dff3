/// Aggregated view of session progress, useful for a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    /// 1-based position of the current question; equals `total` once finished.
    pub position: usize,
    pub answered: usize,
    pub score: u32,
    pub is_complete: bool,
}

impl SessionProgress {
    /// Share of questions answered, as a whole percentage.
    #[must_use]
    pub fn answered_percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let pct = self.answered.saturating_mul(100) / self.total;
        u32::try_from(pct).unwrap_or(100)
    }
}
