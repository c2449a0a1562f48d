//! End-to-end scenarios driving `muse_core` repositories.

mod harness;
mod scenarios;
