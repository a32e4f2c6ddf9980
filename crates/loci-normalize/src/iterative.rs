//! Repeated rigid alignment until the origin settles.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use loci_core::image::Image;
use loci_core::spatial::Point3;
use loci_core::Result;

use crate::rigid::RigidAlignment;
use crate::sink::{save_debug, ArtifactSink, NullSink};

/// Loop state, replaced once per refinement pass.
#[derive(Debug, Clone)]
pub struct ConvergenceState<B: Backend> {
    pub current: Image<B, 3>,
    pub last_origin: Point3,
    pub iteration: usize,
}

impl<B: Backend> ConvergenceState<B> {
    fn new(current: Image<B, 3>) -> Self {
        Self {
            last_origin: *current.origin(),
            current,
            iteration: 0,
        }
    }

    /// Install the next volume and return its origin shift in mm.
    fn advance(&mut self, next: Image<B, 3>) -> f64 {
        let shift = next.origin().distance(&self.last_origin);
        self.last_origin = *next.origin();
        self.current = next;
        self.iteration += 1;
        shift
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// Refinement passes run after the initial alignment.
    pub iterations: usize,
    pub converged: bool,
    pub final_shift_mm: Option<f64>,
}

pub struct IterativeOutcome<B: Backend> {
    pub image: Image<B, 3>,
    pub report: IterationReport,
}

/// Runs an initial alignment on the input, then up to `max_iterations`
/// refinement passes on the template-resampled volume. Stops as soon as the
/// origin moves less than `threshold_mm` between passes.
pub struct IterativeRigidController<B: Backend, A> {
    aligner: A,
    max_iterations: usize,
    threshold_mm: f64,
    scratch: Arc<dyn ArtifactSink<B>>,
    debug: Arc<dyn ArtifactSink<B>>,
}

impl<B: Backend, A: RigidAlignment<B>> IterativeRigidController<B, A> {
    pub fn new(aligner: A, max_iterations: usize, threshold_mm: f64) -> Self {
        Self {
            aligner,
            max_iterations,
            threshold_mm,
            scratch: Arc::new(NullSink),
            debug: Arc::new(NullSink),
        }
    }

    /// Where the current volume is persisted as `rigid_iter` before each pass.
    pub fn with_scratch(mut self, scratch: Arc<dyn ArtifactSink<B>>) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn with_debug(mut self, debug: Arc<dyn ArtifactSink<B>>) -> Self {
        self.debug = debug;
        self
    }

    pub fn run(&self, image: Image<B, 3>) -> Result<IterativeOutcome<B>> {
        let initial = self.aligner.align(image, false)?;
        save_debug(self.debug.as_ref(), "rigid0", &initial);

        let mut state = ConvergenceState::new(initial);
        let mut converged = false;
        let mut final_shift = None;

        while state.iteration < self.max_iterations {
            self.scratch.save("rigid_iter", &state.current)?;

            let next = self.aligner.align(state.current.clone(), true)?;
            let shift = state.advance(next);
            save_debug(self.debug.as_ref(), &format!("rigid{}", state.iteration), &state.current);
            tracing::info!(iteration = state.iteration, shift_mm = shift, "rigid refinement");

            final_shift = Some(shift);
            if shift < self.threshold_mm {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                iterations = state.iteration,
                threshold_mm = self.threshold_mm,
                "rigid alignment did not converge"
            );
        }

        Ok(IterativeOutcome {
            report: IterationReport {
                iterations: state.iteration,
                converged,
                final_shift_mm: final_shift,
            },
            image: state.current,
        })
    }
}
