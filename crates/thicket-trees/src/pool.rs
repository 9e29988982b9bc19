use crate::error::TreeError;

/// Run `work` on a scoped rayon pool of `n_jobs` threads, or on the global
/// pool when `n_jobs` is `None`.
pub(crate) fn with_jobs<R, F>(n_jobs: Option<usize>, work: F) -> Result<R, TreeError>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match n_jobs {
        None => Ok(work()),
        Some(0) => Err(TreeError::InvalidJobCount),
        Some(n_jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .build()
                .map_err(|source| TreeError::ThreadPool { n_jobs, source })?;
            Ok(pool.install(work))
        }
    }
}
