//! Progress reporting for the pipelines.

/// Progress callback: `(percent of the current phase, status, completed chunks, total chunks)`.
///
/// Status strings: `initiating`, `uploading`, `finalizing`, `complete`,
/// `downloading`, `decrypted`.
pub type ProgressFn = Box<dyn Fn(f64, &str, u32, u32) + Send + Sync>;

/// Percentage of `completed` out of `total`, clamped to `[0, 100]`.
pub fn percent(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (f64::from(completed) / f64::from(total) * 100.0).min(100.0)
}

pub(crate) struct Reporter<'a> {
    callback: Option<&'a ProgressFn>,
    total: u32,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(callback: Option<&'a ProgressFn>, total: u32) -> Self {
        Self { callback, total }
    }

    pub(crate) fn report(&self, status: &str, completed: u32) {
        if let Some(cb) = self.callback {
            cb(percent(completed, self.total), status, completed, self.total);
        }
    }
}
