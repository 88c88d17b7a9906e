//! Parallel batch compilation.
//!
//! Compilation units are fully independent (own parser state, own evaluation
//! context, own importer), so a batch fans out over a rayon pool and merges
//! results by input index.  The only shared state is the cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::api::{compile_with_session, CompileResult, Options};
use crate::context::{MathMode, RewriteUrls};
use crate::error::LessError;
use crate::session::Session;

/// One unit of a batch.
pub struct BatchInput {
    pub source: String,
    pub filename: Option<String>,
}

/// Batch-level settings.  Per-unit options mirror [`Options`], minus the
/// plugin bridge, which is not shareable across workers.
#[derive(Clone, Default)]
pub struct BatchOptions {
    pub paths: Vec<String>,
    pub rootpath: String,
    pub rewrite_urls: RewriteUrls,
    pub math: MathMode,
    pub strict_units: bool,
    pub compress: bool,
    pub url_args: Option<String>,
    pub import_multiple: bool,

    /// Worker count; `None` uses the logical CPU count.
    pub workers: Option<usize>,

    /// Cancel remaining units after the first failure.
    pub stop_on_error: bool,
}

impl BatchOptions {
    fn unit_options(&self, filename: Option<String>) -> Options {
        Options {
            filename,
            paths: self.paths.clone(),
            rootpath: self.rootpath.clone(),
            rewrite_urls: self.rewrite_urls,
            math: self.math,
            strict_units: self.strict_units,
            compress: self.compress,
            url_args: self.url_args.clone(),
            import_multiple: self.import_multiple,
            plugin_bridge: None,
        }
    }
}

/// Compiles every input, in parallel; results line up with the inputs by
/// index.
pub fn compile_many(
    inputs: &[BatchInput],
    options: &BatchOptions,
) -> Vec<Result<CompileResult, LessError>> {
    let run = || {
        let failed = AtomicBool::new(false);

        inputs
            .par_iter()
            .map(|input| {
                if options.stop_on_error && failed.load(Ordering::Relaxed) {
                    return Err(LessError::runtime("compilation cancelled"));
                }

                let unit_options = options.unit_options(input.filename.clone());
                let result =
                    compile_with_session(&input.source, &unit_options, &Session::new());

                if result.is_err() {
                    failed.store(true, Ordering::Relaxed);
                }

                result
            })
            .collect()
    };

    match options.workers {
        Some(workers) => rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map(|pool| pool.install(run))
            .unwrap_or_else(|_| run()),
        None => run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(source: &str) -> BatchInput {
        BatchInput {
            source: source.to_string(),
            filename: None,
        }
    }

    #[test]
    fn results_line_up_with_inputs() {
        let inputs = vec![
            input(".a { color: red; }"),
            input(".b { color: blue; }"),
            input(".c { width: 1px + 2px; }"),
        ];

        let results = compile_many(&inputs, &BatchOptions::default());
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().css.contains(".a"));
        assert!(results[1].as_ref().unwrap().css.contains(".b"));
        assert!(results[2].as_ref().unwrap().css.contains("3px"));
    }

    #[test]
    fn errors_stay_at_their_index() {
        let inputs = vec![
            input(".a { color: red; }"),
            input(".b { color: @missing; }"),
        ];

        let results = compile_many(&inputs, &BatchOptions::default());
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
