//! Test suites for the chaincalc server.

mod process_behaviour;
mod support;
