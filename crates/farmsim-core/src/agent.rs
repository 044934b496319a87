//! The capability shared by every autonomous participant: running against
//! the clock until shutdown.
//!
//! Farmers, buyers, and the delivery manager are independent task types;
//! none of them inherits from another. Each implements [`ClockedAgent`] and
//! is spawned as its own task through [`drive`].

use std::future::Future;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::debug;

use crate::error::Cancelled;

/// An agent that paces itself against the simulation clock.
pub trait ClockedAgent: Send + Sized + 'static {
    /// Human-readable name used in logs.
    fn label(&self) -> String;

    /// Run until the simulation shuts down.
    ///
    /// Implementations return [`Cancelled`] from whichever suspension point
    /// observed the shutdown, after releasing anything they hold.
    fn run(self) -> impl Future<Output = Result<(), Cancelled>> + Send;
}

/// Run an agent to completion, logging how it ended.
pub async fn drive<A: ClockedAgent>(agent: A) {
    let label = agent.label();
    debug!(agent = %label, "Agent started");
    match agent.run().await {
        Ok(()) => debug!(agent = %label, "Agent finished"),
        Err(Cancelled) => debug!(agent = %label, "Agent stopped for shutdown"),
    }
}

/// Which kind of agent a random stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    /// The delivery manager.
    Delivery,
    /// A farmer.
    Farmer,
    /// A buyer.
    Buyer,
}

impl AgentRole {
    const fn salt(self) -> u64 {
        match self {
            Self::Delivery => 0x0D31_1BE2_7000_0001,
            Self::Farmer => 0x0FA2_3E20_0000_0002,
            Self::Buyer => 0x0B07_E200_0000_0003,
        }
    }
}

/// Random stream for one agent, derived from the world seed.
///
/// Distinct agents get distinct streams; the same seed, role, and number
/// always give the same stream.
pub fn agent_rng(seed: u64, role: AgentRole, number: u32) -> SmallRng {
    let mixed = seed
        ^ role.salt()
        ^ u64::from(number).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    SmallRng::seed_from_u64(mixed)
}
