//! caresight: CSV patient data in, risk predictions, chart data and
//! narrative recommendations out.
//!
//! The library holds the upload pipelines and everything they are built
//! from; the `caresight` binary and the embedded web server are thin layers
//! over [`pipeline`], [`store`] and [`analytics`].

pub mod analysis;
pub mod analytics;
pub mod cli;
pub mod config;
pub mod csv;
pub mod domain;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod prediction;
pub mod recommend;
pub mod store;
pub mod web;
