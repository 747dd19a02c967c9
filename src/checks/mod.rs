//! The individual analyses. Each one walks the simplified token stream
//! through the pattern matcher or the execution-path engine and reports
//! into the error logger; all of them stay silent on anomalies.

pub mod autovariables;
pub mod bufferoverrun;
pub mod classes;
pub mod memleak;
pub mod obsoletefunctions;
pub mod stl;
pub mod uninitvar;
pub mod unusedfunctions;
