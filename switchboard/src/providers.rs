//! Provider bundle trait for simplified type parameters.
//!
//! Carrying three separate provider type parameters through every struct gets
//! noisy fast; the [`Providers`] trait bundles them into one. Production code
//! uses [`TokioProviders`]; tests can assemble bundles with seeded or mocked
//! members.

use crate::random::{RandomProvider, TokioRandomProvider};
use crate::task::{TaskProvider, TokioTaskProvider};
use crate::time::{TimeProvider, TokioTimeProvider};

/// Bundle of the provider types a node needs.
///
/// Associated types keep everything statically dispatched; accessor methods
/// hand out the individual providers.
pub trait Providers: Clone + 'static {
    /// Time provider type for delays and timeouts.
    type Time: TimeProvider + Clone + 'static;

    /// Task provider type for spawning local tasks.
    type Task: TaskProvider + Clone + 'static;

    /// Random provider type for correlation key generation.
    type Random: RandomProvider + Clone + 'static;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;

    /// Get the random provider instance.
    fn random(&self) -> &Self::Random;
}

/// Production providers using the Tokio runtime.
#[derive(Clone)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle.
    pub fn new() -> Self {
        Self {
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider,
            random: TokioRandomProvider::new(),
        }
    }
}

impl Default for TokioProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;
    type Random = TokioRandomProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}
