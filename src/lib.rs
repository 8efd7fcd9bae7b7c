//! Core library for the m1-assistant command line application.
//!
//! The assistant loads trial balances, asks a hosted model to propose
//! Schedule M-1 book-tax adjustments and writes them to an Excel working
//! paper. Loaders and the workbook writer live under
//! [`taxprep::m1::io`], the pass-through records in [`taxprep::m1::model`],
//! the sheet layout and catch-and-report writer in
//! [`taxprep::m1::workpaper`], the tool contract exposed to the model in
//! [`taxprep::m1::tool`], and the model client and agent loop under
//! [`taxprep::m1::provider`] and [`taxprep::m1::agent`].

pub mod taxprep;

pub use taxprep::m1::{
    AssistantError, Result, agent, config, error, io, model, provider, session, tool, workpaper,
};
