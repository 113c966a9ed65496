//! mass-composition: weighted mass and composition datasets.
//!
//! A [`MassComposition`](composition::MassComposition) holds records of wet mass,
//! dry mass, moisture and chemical analytes. Masses add; moisture and analytes
//! combine as dry-mass weighted averages. Streams can be wired into a flowsheet
//! [`MCNetwork`](network::MCNetwork) (feature `network`), reconciled with
//! [`MCBalance`](balance::MCBalance), and visualised with plotly figures and
//! HTML reports (feature `viz`).
pub mod composition;
pub mod demo_data;
pub mod error;
pub mod frame;
pub mod io;
pub mod variables;

#[cfg(feature = "network")]
pub mod balance;
#[cfg(feature = "network")]
pub mod layout;
#[cfg(feature = "network")]
pub mod network;
#[cfg(feature = "network")]
pub mod optimize;

#[cfg(feature = "viz")]
pub mod plot;
#[cfg(feature = "viz")]
pub mod report;

pub use composition::MassComposition;
pub use error::{MassCompositionError, Result};
pub use frame::Frame;
