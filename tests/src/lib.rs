//! End-to-end scenarios for the provisioning engine.
//!
//! Every scenario drives the real orchestrator against a temporary root,
//! with an in-memory fetcher standing in for the network and synthetic
//! archives whose binaries carry just enough header to be classified.

#[cfg(test)]
mod orchestrator;
#[cfg(test)]
mod utils;
