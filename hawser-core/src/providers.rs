//! Provider bundle: one type parameter instead of three.
//!
//! Endpoint code is generic over its runtime services — networking, time,
//! task spawning. Carrying three type parameters through every struct gets
//! noisy, so [`Providers`] bundles them behind associated types and a
//! `P: Providers` bound is all downstream code needs.
//!
//! [`TokioProviders`] is the production bundle; tests assemble their own
//! bundles with scripted networks or clocks where useful.

use crate::network::{NetworkProvider, TokioNetwork};
use crate::task::{TaskProvider, TokioTasks};
use crate::time::{TimeProvider, TokioClock};

/// Bundle of the runtime services an endpoint depends on.
pub trait Providers: Clone + 'static {
    /// Network provider for connections and listeners.
    type Network: NetworkProvider + 'static;

    /// Time provider for delays and deadlines.
    type Time: TimeProvider + 'static;

    /// Task provider for spawning background work.
    type Tasks: TaskProvider + 'static;

    /// The network provider instance.
    fn network(&self) -> &Self::Network;

    /// The time provider instance.
    fn time(&self) -> &Self::Time;

    /// The task provider instance.
    fn tasks(&self) -> &Self::Tasks;
}

/// Production bundle backed by the tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioProviders {
    network: TokioNetwork,
    time: TokioClock,
    tasks: TokioTasks,
}

impl TokioProviders {
    /// Create the production provider bundle.
    pub fn new() -> Self {
        Self {
            network: TokioNetwork::new(),
            time: TokioClock::new(),
            tasks: TokioTasks::new(),
        }
    }
}

impl Providers for TokioProviders {
    type Network = TokioNetwork;
    type Time = TokioClock;
    type Tasks = TokioTasks;

    fn network(&self) -> &Self::Network {
        &self.network
    }

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn tasks(&self) -> &Self::Tasks {
        &self.tasks
    }
}
