// ABOUTME: Command module aggregator for the templify CLI.
// ABOUTME: Re-exports publish and destroy command handlers.

mod backends;
mod destroy;
mod publish;

pub use destroy::destroy;
pub use publish::{PublishRequest, publish};
